// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use colored::Colorize;

use lockgate::config::{settings_path, state_dir, ENV_PASSWORD_HASH};
use lockgate::digest::is_sha1_hex;
use lockgate::logging::{self, Verbosity};
use lockgate::utils::{describe_millis, mask_digest};
use lockgate::{
    run_terminal_prompt, sha1_hex, AccessGate, AuditLog, ConfigError, Diagnostics, ErrorBuilder, FileStore,
    LockConfig, LockPrompt, LockService, Navigation, PromptOutcome, SessionStore, Settings, StorageError,
    SystemClock,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Usage error - invalid command line arguments
    pub const USAGE: i32 = 64;
    /// I/O error - session storage or settings could not be accessed
    pub const IO_ERR: i32 = 74;
    /// Permission denied - still locked
    pub const NO_PERM: i32 = 77;
    /// Configuration error - invalid or missing config
    pub const CONFIG: i32 = 78;
}

use exit_codes::*;

#[derive(Parser)]
#[command(name = "lockgate")]
#[command(version = VERSION)]
#[command(about = "Shared-password lock screen for local applications.")]
#[command(long_about = "lockgate - shared-password lock screen\n\n\
    Unlock:              lockgate unlock\n\
    Check a route:       lockgate enter /about\n\
    Lock again:          lockgate lock\n\
    Session details:     lockgate status\n\
    Configure:           lockgate config show\n\n\
    Casual access gating only. The password hash is not a secret.")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Unlock with the shared password
    ///
    /// Examples:
    ///   lockgate unlock
    ///   lockgate unlock --attempts 5
    ///   echo "$PASSWORD" | lockgate unlock --password-stdin
    Unlock {
        /// Wrong passwords allowed before giving up
        #[arg(long, default_value_t = 3)]
        attempts: u32,

        /// Read the password from the first line of stdin
        #[arg(long)]
        password_stdin: bool,
    },

    /// Clear the session and lock
    Lock,

    /// Show lock state and session age
    #[command(alias = "s")]
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the access gate for a route (exit 0 if granted, 77 if locked)
    ///
    /// Examples:
    ///   lockgate enter /
    ///   lockgate enter /about
    Enter {
        /// Route path
        path: String,
    },

    /// Print the SHA-1 hash of a password
    Hash {
        password: String,
    },

    /// Show the stored session record
    Inspect,

    /// Remove the stored session record
    Clear,

    /// Write a session record for a hash, stamped now
    SetAuth {
        hash: String,
    },

    /// Make the stored session look older
    ///
    /// Examples:
    ///   lockgate backdate 10000      # 10 seconds old
    Backdate {
        /// Age in milliseconds
        ms: u64,
    },

    /// Check whether the stored session would survive an expiry
    Validity {
        /// Expiry in milliseconds (defaults to the configured expiry)
        #[arg(long)]
        expiry_ms: Option<u64>,
    },

    /// Print hashes of a few common passwords
    CommonHashes,

    /// Configure settings
    ///
    /// Examples:
    ///   lockgate config show
    ///   lockgate config set-password
    ///   lockgate config set-expiry 3600000
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show resolved configuration
    Show,
    /// Set the accepted password hash
    SetHash { hash: String },
    /// Prompt for a new password and store its hash
    SetPassword,
    /// Set the session expiry in milliseconds (0 disables expiry)
    SetExpiry { ms: u64 },
}

fn main() {
    let cli = Cli::parse();
    logging::init(Verbosity::from_flags(cli.verbose, cli.quiet));

    let code = match run(cli.command) {
        Ok(code) => code,
        Err(e) => report_error(&e),
    };
    std::process::exit(code);
}

fn run(command: Commands) -> Result<i32> {
    match command {
        Commands::Unlock {
            attempts,
            password_stdin,
        } => handle_unlock(attempts, password_stdin),
        Commands::Lock => {
            open_service()?.lock();
            println!("{} Locked.", "[✓]".green());
            Ok(SUCCESS)
        }
        Commands::Status { json } => handle_status(json),
        Commands::Enter { path } => handle_enter(&path),
        Commands::Hash { password } => {
            println!("{}", Diagnostics::generate_hash(&password));
            Ok(SUCCESS)
        }
        Commands::Inspect => handle_inspect(),
        Commands::Clear => {
            open_diagnostics()?.clear_auth();
            println!("{} Session cleared.", "[✓]".green());
            Ok(SUCCESS)
        }
        Commands::SetAuth { hash } => handle_set_auth(&hash),
        Commands::Backdate { ms } => handle_backdate(ms),
        Commands::Validity { expiry_ms } => handle_validity(expiry_ms),
        Commands::CommonHashes => {
            println!();
            println!("{}", "Common password hashes:".bold());
            for (password, hash) in Diagnostics::common_hashes() {
                println!("  {:<12} {}", format!("{:?}", password), hash);
            }
            println!();
            Ok(SUCCESS)
        }
        Commands::Config { command } => handle_config(command),
    }
}

// ============================================================================
// Wiring
// ============================================================================

fn config() -> &'static LockConfig {
    LockConfig::global()
}

fn open_backend() -> Result<Arc<FileStore>> {
    let store = FileStore::in_state_dir().context("Could not locate session storage")?;
    tracing::debug!("Session storage at {:?}", store.dir());
    Ok(Arc::new(store))
}

fn open_service() -> Result<Arc<LockService>> {
    let audit_enabled = match Settings::load() {
        Ok(settings) => settings.audit_log_enabled,
        Err(e) => {
            tracing::debug!("Settings unavailable, audit log stays on: {}", e);
            true
        }
    };
    let audit = AuditLog::in_state_dir(audit_enabled).context("Could not locate audit log")?;
    let service = LockService::builder(config().clone(), open_backend()?).audit(audit).build();
    Ok(Arc::new(service))
}

/// Diagnostics read the stored record as-is, without the engine's checks
/// clearing it first.
fn open_diagnostics() -> Result<Diagnostics> {
    let store = SessionStore::new(open_backend()?, config().storage_key());
    Ok(Diagnostics::new(store, Arc::new(SystemClock)))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn format_timestamp(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{}ms", ms))
}

fn describe_signed_millis(ms: i64) -> String {
    if ms < 0 {
        format!("{} in the future", describe_millis(ms.unsigned_abs()))
    } else {
        format!("{} ago", describe_millis(ms.unsigned_abs()))
    }
}

fn report_error(e: &anyhow::Error) -> i32 {
    if let Some(config_err) = e.downcast_ref::<ConfigError>() {
        let message = ErrorBuilder::new(format!("{:#}", e))
            .cause(config_err.to_string())
            .fix("Set LOCKGATE_HOME to a writable directory")
            .fix("Check that config.json is valid JSON (lockgate config show)")
            .build();
        eprintln!("{}", message.red());
        return CONFIG;
    }
    if let Some(storage_err) = e.downcast_ref::<StorageError>() {
        let message = ErrorBuilder::new(format!("{:#}", e))
            .cause(storage_err.to_string())
            .cause("Another lockgate process may be holding the storage lock")
            .fix("Check permissions on the state directory")
            .fix("Retry once other lockgate commands have finished")
            .build();
        eprintln!("{}", message.red());
        return IO_ERR;
    }
    eprintln!("{} {:#}", "[✗]".red(), e);
    ERROR
}

// ============================================================================
// Lock screen commands
// ============================================================================

fn handle_unlock(attempts: u32, password_stdin: bool) -> Result<i32> {
    let service = open_service()?;
    let rt = runtime()?;

    if password_stdin {
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read password from stdin")?;
        let password = line.trim_end_matches(&['\r', '\n'][..]).to_string();

        let mut prompt = LockPrompt::new(service.clone());
        prompt.set_password(password);
        if rt.block_on(prompt.submit()) {
            println!("{} {}", "[✓]".green(), prompt.text().success_message);
            return Ok(SUCCESS);
        }
        let error = prompt
            .error_message()
            .unwrap_or(service.config().ui.error_message.as_str())
            .to_string();
        eprintln!("{} {}", "[✗]".red(), error);
        return Ok(NO_PERM);
    }

    if attempts == 0 {
        eprintln!(
            "{}",
            ErrorBuilder::new("--attempts must be at least 1")
                .fix("lockgate unlock --attempts 3")
                .build()
        );
        return Ok(USAGE);
    }

    match rt.block_on(run_terminal_prompt(service, attempts))? {
        PromptOutcome::Unlocked => Ok(SUCCESS),
        PromptOutcome::GaveUp => {
            eprintln!("{} Still locked after {} attempts.", "[✗]".red(), attempts);
            Ok(NO_PERM)
        }
        PromptOutcome::Cancelled => Ok(ERROR),
    }
}

fn handle_status(json: bool) -> Result<i32> {
    let service = open_service()?;
    let status = service.session_status();

    if json {
        let value = serde_json::json!({
            "state": service.state(),
            "session": status,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(SUCCESS);
    }

    println!();
    if status.authenticated {
        println!("  {} {}", "●".green(), "Unlocked".green().bold());
    } else {
        println!("  {} {}", "●".red(), "Locked".red().bold());
    }
    if let (Some(created), Some(age)) = (status.created_at_ms, status.age_ms) {
        println!("  Session:   created {} ({})", format_timestamp(created), describe_signed_millis(age));
    }
    match status.expires_in_ms {
        Some(left) => println!("  Expires:   in {}", describe_millis(left.max(0).unsigned_abs())),
        None if status.authenticated => println!("  Expires:   never"),
        None => {}
    }
    println!();
    Ok(SUCCESS)
}

fn handle_enter(path: &str) -> Result<i32> {
    let service = open_service()?;
    let gate = AccessGate::new(service.clone());

    match gate.navigate(path) {
        Navigation::Granted(route) => {
            println!("{} Entered /{} ({:?})", "[✓]".green(), route.path, route.target);
            Ok(SUCCESS)
        }
        Navigation::Denied { requested } => {
            let text = &service.config().ui;
            eprintln!("{} /{} is locked", "[✗]".red(), requested);
            eprintln!();
            eprintln!("  {}", text.title.bold());
            eprintln!("  {}", text.message);
            eprintln!("  {}", "Run 'lockgate unlock' to continue.".dimmed());
            Ok(NO_PERM)
        }
    }
}

// ============================================================================
// Diagnostics commands
// ============================================================================

fn handle_inspect() -> Result<i32> {
    let diagnostics = open_diagnostics()?;
    let Some(stored) = diagnostics.stored_auth() else {
        println!("No session stored under {:?}.", config().storage_key());
        return Ok(SUCCESS);
    };

    let current = if stored.record.digest == config().expected_digest() {
        "yes".green()
    } else {
        "no (will be cleared on next check)".yellow()
    };
    println!();
    println!("{}", "Stored session:".bold());
    println!("  passwordHash:  {}", stored.record.digest);
    println!(
        "  timestamp:     {} ({})",
        format_timestamp(stored.record.created_at_ms),
        stored.record.created_at_ms
    );
    println!("  age:           {}", describe_signed_millis(stored.age_ms));
    println!("  current hash:  {}", current);
    println!();
    Ok(SUCCESS)
}

fn handle_set_auth(hash: &str) -> Result<i32> {
    let hash = hash.trim().to_ascii_lowercase();
    if !is_sha1_hex(&hash) {
        eprintln!(
            "{} {:?} is not a 40-character SHA-1 hex digest; writing it anyway.",
            "[!]".yellow(),
            hash
        );
    }
    let record = open_diagnostics()?
        .set_auth(&hash)
        .context("Failed to write session record")?;
    println!(
        "{} Session written: {} at {}",
        "[✓]".green(),
        mask_digest(&record.digest),
        format_timestamp(record.created_at_ms)
    );
    Ok(SUCCESS)
}

fn handle_backdate(ms: u64) -> Result<i32> {
    if open_diagnostics()?.backdate(ms).context("Failed to rewrite session record")? {
        println!("{} Session now {} old.", "[✓]".green(), describe_millis(ms));
        Ok(SUCCESS)
    } else {
        eprintln!("{} No existing session to modify.", "[!]".yellow());
        Ok(ERROR)
    }
}

fn handle_validity(expiry_ms: Option<u64>) -> Result<i32> {
    let expiry_ms = expiry_ms.unwrap_or_else(|| config().expiry_millis());
    let Some(report) = open_diagnostics()?.session_validity(expiry_ms) else {
        println!("No session found.");
        return Ok(SUCCESS);
    };

    println!();
    println!("{}", "Session validity check:".bold());
    println!("  elapsed:   {}", describe_signed_millis(report.elapsed_ms));
    if report.expiry_ms == 0 {
        println!("  expiry:    no expiry");
    } else {
        println!("  expiry:    {}", describe_millis(report.expiry_ms));
    }
    println!(
        "  expired:   {}",
        if report.expired { "yes".red() } else { "no".green() }
    );
    match report.remaining_ms {
        Some(left) => println!("  remaining: {}", describe_millis(left.unsigned_abs())),
        None => println!("  remaining: never expires"),
    }
    println!();
    Ok(SUCCESS)
}

// ============================================================================
// Configuration commands
// ============================================================================

fn handle_config(command: Option<ConfigCommands>) -> Result<i32> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let config = config();
            println!();
            println!("{}", "=== lockgate Configuration ===".bright_cyan().bold());
            println!();
            println!(
                "  Password hash: {} ({})",
                mask_digest(config.expected_digest()),
                config.digest_source()
            );
            if config.expires() {
                println!(
                    "  Expiry:        {} ({}ms)",
                    describe_millis(config.expiry_millis()),
                    config.expiry_millis()
                );
            } else {
                println!("  Expiry:        {}", "none".dimmed());
            }
            println!("  Storage key:   {}", config.storage_key());
            println!();
            if let Ok(dir) = state_dir() {
                println!("State dir:     {}", dir.display());
            }
            if let Ok(path) = settings_path() {
                println!("Settings file: {}", path.display());
            }
            Ok(SUCCESS)
        }
        Some(ConfigCommands::SetHash { hash }) => {
            let hash = hash.trim().to_ascii_lowercase();
            if !is_sha1_hex(&hash) {
                eprintln!(
                    "{}",
                    ErrorBuilder::new(format!("{:?} is not a SHA-1 hash", hash))
                        .cause("Expected 40 hexadecimal characters")
                        .fix("Generate one with: lockgate hash <password>")
                        .fix("Or let lockgate hash it for you: lockgate config set-password")
                        .build()
                );
                return Ok(USAGE);
            }
            save_password_hash(hash)
        }
        Some(ConfigCommands::SetPassword) => {
            let password = inquire::Password::new("New lock screen password:")
                .with_display_mode(inquire::PasswordDisplayMode::Masked)
                .with_custom_confirmation_message("Confirm password:")
                .prompt();
            match password {
                Ok(p) if p.is_empty() => {
                    eprintln!("{} Password must not be empty.", "[✗]".red());
                    Ok(USAGE)
                }
                Ok(p) => save_password_hash(sha1_hex(&p)),
                Err(_) => {
                    println!("{}", "Cancelled.".yellow());
                    Ok(ERROR)
                }
            }
        }
        Some(ConfigCommands::SetExpiry { ms }) => {
            let mut settings = Settings::load()?;
            settings.expiry_ms = Some(ms);
            settings.save()?;
            if ms == 0 {
                println!("{} Sessions no longer expire.", "[✓]".green());
            } else {
                println!("{} Sessions now expire after {}.", "[✓]".green(), describe_millis(ms));
            }
            Ok(SUCCESS)
        }
    }
}

fn save_password_hash(hash: String) -> Result<i32> {
    let mut settings = Settings::load()?;
    settings.password_hash = Some(hash.clone());
    settings.save()?;

    println!("{} Password hash set to {}.", "[✓]".green(), mask_digest(&hash));
    println!("    Existing sessions for the old password end on their next check.");
    if std::env::var_os(ENV_PASSWORD_HASH).is_some() {
        println!(
            "{} {} is set in the environment and takes precedence over the settings file.",
            "[!]".yellow(),
            ENV_PASSWORD_HASH
        );
    }
    Ok(SUCCESS)
}
