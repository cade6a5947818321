// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lock-screen configuration.
//!
//! The accepted password digest is resolved from, in order:
//!
//! 1. `LOCKGATE_PASSWORD_HASH` in the process environment
//! 2. `password_hash` in `<state dir>/config.json`
//! 3. `LOCKGATE_PASSWORD_HASH` captured at compile time
//! 4. the built-in default (SHA-1 of `password123`)
//!
//! The first non-empty value wins. Expiry and storage key follow the same
//! env-then-settings order with fixed fallbacks. Resolution never fails.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::digest::is_sha1_hex;
use crate::error::ConfigError;
use crate::utils::mask_digest;

/// SHA-1 of `password123`.
pub const DEFAULT_PASSWORD_HASH: &str = "cbfdac6008f9cab4083784cbd1874f76618d2a97";

/// Key the session record is stored under unless overridden.
pub const DEFAULT_STORAGE_KEY: &str = "angular_lock_auth";

pub const ENV_PASSWORD_HASH: &str = "LOCKGATE_PASSWORD_HASH";
pub const ENV_EXPIRY_MS: &str = "LOCKGATE_EXPIRY_MS";
pub const ENV_STORAGE_KEY: &str = "LOCKGATE_STORAGE_KEY";
pub const ENV_HOME: &str = "LOCKGATE_HOME";

const SETTINGS_FILE_NAME: &str = "config.json";
const STATE_DIR_NAME: &str = ".lockgate";

/// Digest baked in at compile time, if the build environment provided one.
const BUILD_TIME_PASSWORD_HASH: Option<&str> = option_env!("LOCKGATE_PASSWORD_HASH");

/// Which layer supplied the expected digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestSource {
    Runtime,
    Settings,
    BuildTime,
    Default,
}

impl std::fmt::Display for DigestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DigestSource::Runtime => "environment (LOCKGATE_PASSWORD_HASH)",
            DigestSource::Settings => "settings file",
            DigestSource::BuildTime => "build-time value",
            DigestSource::Default => "built-in default",
        };
        write!(f, "{}", s)
    }
}

/// Display strings for the lock screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockText {
    pub title: String,
    pub message: String,
    pub success_message: String,
    pub error_message: String,
    pub unlock_button_text: String,
    pub password_placeholder: String,
}

impl Default for LockText {
    fn default() -> Self {
        Self {
            title: "Locked Screen".to_string(),
            message: "Please enter your password to unlock the application".to_string(),
            success_message: "Access granted!".to_string(),
            error_message: "Invalid password. Please try again.".to_string(),
            unlock_button_text: "Unlock".to_string(),
            password_placeholder: "Enter password".to_string(),
        }
    }
}

/// Resolved lock-screen configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    expected_digest: String,
    expiry: Duration,
    storage_key: String,
    pub ui: LockText,
    digest_source: DigestSource,
}

impl LockConfig {
    /// Build a config directly. The digest is normalized; an empty digest
    /// falls back to [`DEFAULT_PASSWORD_HASH`] and an empty key to
    /// [`DEFAULT_STORAGE_KEY`]. The expiry is kept as given.
    pub fn new(expected_digest: &str, expiry: Duration, storage_key: &str) -> Self {
        let (expected_digest, digest_source) = match non_empty(Some(expected_digest)) {
            Some(digest) => (digest.to_ascii_lowercase(), DigestSource::Runtime),
            None => (DEFAULT_PASSWORD_HASH.to_string(), DigestSource::Default),
        };
        warn_on_digest_shape(&expected_digest, digest_source);

        Self {
            expected_digest,
            expiry,
            storage_key: non_empty(Some(storage_key)).unwrap_or(DEFAULT_STORAGE_KEY).to_string(),
            ui: LockText::default(),
            digest_source,
        }
    }

    /// Resolve from explicit inputs. Pure; never fails.
    pub fn resolve(sources: &ConfigSources) -> Self {
        let settings = sources.settings.clone().unwrap_or_default();

        let layers = [
            (sources.runtime_digest.as_deref(), DigestSource::Runtime),
            (settings.password_hash.as_deref(), DigestSource::Settings),
            (sources.build_time_digest.as_deref(), DigestSource::BuildTime),
        ];
        let (expected_digest, digest_source) = layers
            .iter()
            .find_map(|(value, source)| non_empty(*value).map(|v| (v.to_ascii_lowercase(), *source)))
            .unwrap_or_else(|| (DEFAULT_PASSWORD_HASH.to_string(), DigestSource::Default));

        warn_on_digest_shape(&expected_digest, digest_source);

        let expiry_ms = non_empty(sources.runtime_expiry_ms.as_deref())
            .and_then(|raw| match raw.parse::<u64>() {
                Ok(ms) => Some(ms),
                Err(_) => {
                    tracing::warn!("Ignoring {}={:?}: not a whole number of milliseconds", ENV_EXPIRY_MS, raw);
                    None
                }
            })
            .or(settings.expiry_ms)
            .unwrap_or(0);

        let storage_key = non_empty(sources.runtime_storage_key.as_deref())
            .or_else(|| non_empty(settings.storage_key.as_deref()))
            .unwrap_or(DEFAULT_STORAGE_KEY)
            .to_string();

        Self {
            expected_digest,
            expiry: Duration::from_millis(expiry_ms),
            storage_key,
            ui: settings.ui.unwrap_or_default(),
            digest_source,
        }
    }

    /// Process-wide configuration, resolved from the environment on first use.
    pub fn global() -> &'static LockConfig {
        static GLOBAL: OnceLock<LockConfig> = OnceLock::new();
        GLOBAL.get_or_init(|| LockConfig::resolve(&ConfigSources::from_env()))
    }

    pub fn expected_digest(&self) -> &str {
        &self.expected_digest
    }

    /// Maximum session age. Zero disables expiry.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Expiry in whole milliseconds, rounded up so a sub-millisecond expiry
    /// still expires. Saturates at `u64::MAX`.
    pub fn expiry_millis(&self) -> u64 {
        let partial = u128::from(self.expiry.subsec_nanos() % 1_000_000 != 0);
        u64::try_from(self.expiry.as_millis() + partial).unwrap_or(u64::MAX)
    }

    pub fn expiry_secs(&self) -> u64 {
        self.expiry.as_secs()
    }

    pub fn expires(&self) -> bool {
        !self.expiry.is_zero()
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn digest_source(&self) -> DigestSource {
        self.digest_source
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::resolve(&ConfigSources::default())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn warn_on_digest_shape(digest: &str, source: DigestSource) {
    if !is_sha1_hex(digest) {
        tracing::warn!(
            event = "CONFIG_DIGEST_SHAPE",
            source = %source,
            digest = %mask_digest(digest),
            "Configured password hash is not a 40-character hex SHA-1; no password will match unless it does"
        );
    }
}

/// Raw inputs to [`LockConfig::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub runtime_digest: Option<String>,
    pub runtime_expiry_ms: Option<String>,
    pub runtime_storage_key: Option<String>,
    pub settings: Option<Settings>,
    pub build_time_digest: Option<String>,
}

impl ConfigSources {
    /// Gather inputs from the process environment, the settings file and the
    /// compile-time environment.
    pub fn from_env() -> Self {
        let settings = match state_dir() {
            Ok(dir) => Some(Settings::load_from(&dir.join(SETTINGS_FILE_NAME))),
            Err(e) => {
                tracing::warn!("No settings file used: {}", e);
                None
            }
        };

        Self {
            runtime_digest: std::env::var(ENV_PASSWORD_HASH).ok(),
            runtime_expiry_ms: std::env::var(ENV_EXPIRY_MS).ok(),
            runtime_storage_key: std::env::var(ENV_STORAGE_KEY).ok(),
            settings,
            build_time_digest: BUILD_TIME_PASSWORD_HASH.map(str::to_string),
        }
    }
}

/// Directory holding settings, stored sessions and the audit log.
///
/// `LOCKGATE_HOME` if set, otherwise `~/.lockgate`.
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = std::env::var_os(ENV_HOME).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|h| h.join(STATE_DIR_NAME))
        .ok_or(ConfigError::NoStateDir)
}

/// Path of the settings file inside [`state_dir`].
pub fn settings_path() -> Result<PathBuf, ConfigError> {
    state_dir().map(|d| d.join(SETTINGS_FILE_NAME))
}

fn default_audit_log_enabled() -> bool {
    true
}

/// Persisted settings (`config.json`). Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,

    /// Append lock events to `<state dir>/audit.log`
    #[serde(default = "default_audit_log_enabled")]
    pub audit_log_enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<LockText>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            password_hash: None,
            expiry_ms: None,
            storage_key: None,
            audit_log_enabled: default_audit_log_enabled(),
            ui: None,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults if the file is missing or bad.
    pub fn load_from(path: &Path) -> Self {
        match Self::try_load_from(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Using default settings: {}", e);
                Self::default()
            }
        }
    }

    /// Load settings, reporting parse and I/O failures. A missing file is
    /// not an error.
    pub fn try_load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::try_load_from(&settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&settings_path()?)
    }
}
