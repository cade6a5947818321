// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lock screen presentation.
//!
//! [`LockPrompt`] is the UI-agnostic presenter: it holds what the lock screen
//! shows (input, error line, loading and visibility flags) and forwards
//! attempts to the engine. It only ever sees display text from the config,
//! never the expected digest.
//!
//! [`run_terminal_prompt`] drives a presenter from an interactive terminal.

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use inquire::{InquireError, Password, PasswordDisplayMode};

use crate::config::LockText;
use crate::engine::LockService;

/// Shown when submitting an empty password.
pub const PASSWORD_REQUIRED: &str = "Password is required";

#[derive(Debug)]
pub struct LockPrompt {
    service: Arc<LockService>,
    password: String,
    error_message: Option<String>,
    loading: bool,
    show_password: bool,
}

impl LockPrompt {
    pub fn new(service: Arc<LockService>) -> Self {
        Self {
            service,
            password: String::new(),
            error_message: None,
            loading: false,
            show_password: false,
        }
    }

    /// Display strings for the lock screen.
    pub fn text(&self) -> &LockText {
        &self.service.config().ui
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Update the input. Any displayed error is dismissed.
    pub fn set_password(&mut self, value: impl Into<String>) {
        self.password = value.into();
        self.error_message = None;
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_password_visible(&self) -> bool {
        self.show_password
    }

    pub fn toggle_password_visibility(&mut self) {
        self.show_password = !self.show_password;
    }

    /// Submit the current input. Returns true if the service unlocked.
    ///
    /// An empty input is rejected here without reaching the engine. A wrong
    /// password shows the configured error and clears the input.
    pub async fn submit(&mut self) -> bool {
        if self.password.is_empty() {
            self.error_message = Some(PASSWORD_REQUIRED.to_string());
            return false;
        }

        self.loading = true;
        self.error_message = None;
        let valid = self.service.validate_password_async(&self.password).await;
        self.loading = false;

        if !valid {
            self.error_message = Some(self.service.config().ui.error_message.clone());
            self.password.clear();
        }
        valid
    }
}

/// How an interactive unlock ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    Unlocked,
    /// Every allowed attempt was wrong
    GaveUp,
    /// The user pressed Esc or Ctrl+C
    Cancelled,
}

/// Terminal password field. Input starts masked; Ctrl+R toggles it inside
/// inquire.
fn password_field<'a>(message: &'a str, help: &'a str) -> Password<'a> {
    Password::new(message)
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_display_toggle_enabled()
        .without_confirmation()
        .with_help_message(help)
}

/// Prompt on the terminal until the service unlocks, `max_attempts` wrong
/// passwords have been entered, or the user cancels.
///
/// Ctrl+R inside the prompt toggles password visibility.
pub async fn run_terminal_prompt(service: Arc<LockService>, max_attempts: u32) -> Result<PromptOutcome> {
    if service.check_authentication() {
        service.hide_lock();
        return Ok(PromptOutcome::Unlocked);
    }
    service.show_lock();

    let mut prompt = LockPrompt::new(service);
    let text = prompt.text().clone();

    println!();
    println!("  {}", text.title.bold());
    println!("  {}", text.message.dimmed());
    println!();

    let mut attempts = 0;
    while attempts < max_attempts {
        let message = format!("{}:", text.password_placeholder);
        let help = format!("Enter to {}, Esc to cancel, Ctrl+R to show/hide", text.unlock_button_text.to_lowercase());

        let input = tokio::task::spawn_blocking(move || password_field(&message, &help).prompt())
        .await
        .context("Password prompt task failed")?;

        let value = match input {
            Ok(value) => value,
            Err(InquireError::OperationCanceled) | Err(InquireError::OperationInterrupted) => {
                println!("{}", "  Unlock cancelled.".yellow());
                return Ok(PromptOutcome::Cancelled);
            }
            Err(e) => return Err(e).context("Could not read password from terminal"),
        };

        prompt.set_password(value);
        if prompt.submit().await {
            println!("  {} {}", "✓".green(), text.success_message.green());
            return Ok(PromptOutcome::Unlocked);
        }

        // Empty input does not count against the limit
        if prompt.error_message() != Some(PASSWORD_REQUIRED) {
            attempts += 1;
        }
        if let Some(error) = prompt.error_message() {
            println!("  {} {}", "✗".red(), error.red());
        }
    }

    Ok(PromptOutcome::GaveUp)
}
