// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types and user-facing error formatting for lockgate.
//!
//! Library code returns the typed errors below. The CLI turns failures into
//! actionable messages with [`format_error`] / [`ErrorBuilder`], listing
//! possible causes and fixes.

use std::fmt;
use std::path::PathBuf;

/// Hint appended to every formatted CLI error.
pub const HELP_HINT: &str = "Run 'lockgate --help' for usage, or 'lockgate config show' to inspect settings.";

/// Failure reading, parsing or writing the session storage key.
///
/// The engine never surfaces these to the person at the lock screen; a
/// storage failure always degrades to the locked state.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize session record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("timed out after {waited_ms}ms waiting for lock on {path:?}")]
    LockTimeout { path: PathBuf, waited_ms: u128 },

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure loading or saving the settings file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine a state directory (set LOCKGATE_HOME)")]
    NoStateDir,

    #[error("settings I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file {path:?} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Formats an error message with title, causes, fixes, and a usage hint.
///
/// # Example
///
/// ```
/// use lockgate::error::format_error;
///
/// let error = format_error(
///     "Failed to open session storage",
///     &["State directory is not writable"],
///     &["Point LOCKGATE_HOME at a writable directory"],
/// );
/// assert!(error.contains("Possible causes:"));
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = String::new();

    output.push_str(&format!("[✗] {}\n\n", title));

    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    output.push_str(HELP_HINT);

    output
}

/// Builder for constructing formatted error messages.
///
/// ```
/// use lockgate::error::ErrorBuilder;
///
/// let error = ErrorBuilder::new("Session could not be saved")
///     .cause("Disk is full")
///     .fix("Free some space and unlock again")
///     .build();
/// assert!(error.contains("Disk is full"));
/// ```
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    /// Add a possible cause.
    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Add a suggested fix.
    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    pub fn build(self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(|s| s.as_str()).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(|s| s.as_str()).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clone().build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_lists_causes_and_numbered_fixes() {
        let error = format_error(
            "Unlock failed",
            &["Settings file is corrupt", "Storage is read-only"],
            &["Fix config.json", "Check permissions"],
        );

        assert!(error.contains("[✗] Unlock failed"));
        assert!(error.contains("  - Settings file is corrupt"));
        assert!(error.contains("  - Storage is read-only"));
        assert!(error.contains("  1. Fix config.json"));
        assert!(error.contains("  2. Check permissions"));
        assert!(error.ends_with(HELP_HINT));
    }

    #[test]
    fn test_empty_causes_and_fixes_are_omitted() {
        let error = format_error("Bare", &[], &[]);
        assert!(!error.contains("Possible causes:"));
        assert!(!error.contains("Try these fixes:"));
    }

    #[test]
    fn test_error_builder_display_matches_build() {
        let builder = ErrorBuilder::new("Display test").cause("Cause").fix("Fix");
        assert_eq!(format!("{}", builder), builder.clone().build());
    }

    #[test]
    fn test_storage_error_messages_name_the_path() {
        let err = StorageError::LockTimeout {
            path: PathBuf::from("/tmp/state.lock"),
            waited_ms: 5000,
        };
        let msg = err.to_string();
        assert!(msg.contains("5000ms"));
        assert!(msg.contains("state.lock"));
    }
}
