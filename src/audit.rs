// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lock-screen audit trail.
//!
//! Every engine transition produces a [`LockEvent`]. Events always go to
//! `tracing`; when an [`AuditLog`] is attached they are also appended to
//! `<state dir>/audit.log`, one line per event:
//!
//! `2025-01-15 10:23:45 UTC | UNLOCKED | digest=cbfdac60... | user=jesse | host=workstation`

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::state_dir;
use crate::error::{ConfigError, StorageError};
use crate::utils::mask_digest;

const AUDIT_FILE_NAME: &str = "audit.log";

/// A state transition worth recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    /// Correct password accepted and session persisted
    Unlocked { digest: String },
    /// Wrong password submitted
    UnlockRejected,
    /// Explicit lock; session cleared
    Locked,
    /// Stored session was for a different password hash and was cleared
    SessionRotated { stored_digest: String },
    /// Stored session outlived the expiry and was cleared
    SessionExpired { age_ms: i64, expiry_ms: u64 },
    /// Correct password, but the session could not be stored
    SessionPersistFailed { reason: String },
}

impl LockEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LockEvent::Unlocked { .. } => "UNLOCKED",
            LockEvent::UnlockRejected => "UNLOCK_REJECTED",
            LockEvent::Locked => "LOCKED",
            LockEvent::SessionRotated { .. } => "SESSION_ROTATED",
            LockEvent::SessionExpired { .. } => "SESSION_EXPIRED",
            LockEvent::SessionPersistFailed { .. } => "SESSION_PERSIST_FAILED",
        }
    }

    /// Format for the audit log. Digests are masked.
    pub fn to_audit_string(&self) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        match self {
            LockEvent::Unlocked { digest } => {
                format!("{} | {} | digest={}", timestamp, self.name(), mask_digest(digest))
            }
            LockEvent::SessionRotated { stored_digest } => {
                format!("{} | {} | stored={}", timestamp, self.name(), mask_digest(stored_digest))
            }
            LockEvent::SessionExpired { age_ms, expiry_ms } => {
                format!("{} | {} | age={}ms expiry={}ms", timestamp, self.name(), age_ms, expiry_ms)
            }
            LockEvent::SessionPersistFailed { reason } => {
                format!("{} | {} | reason={}", timestamp, self.name(), reason)
            }
            LockEvent::UnlockRejected | LockEvent::Locked => format!("{} | {}", timestamp, self.name()),
        }
    }

    /// Emit through `tracing` at a level matching the event's severity.
    pub fn trace(&self) {
        let line = self.to_audit_string();
        match self {
            LockEvent::SessionPersistFailed { .. } => {
                tracing::error!(event = self.name(), "{}", line)
            }
            LockEvent::UnlockRejected => tracing::warn!(event = self.name(), "{}", line),
            _ => tracing::info!(event = self.name(), "{}", line),
        }
    }
}

/// Append-only audit file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    enabled: bool,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
        }
    }

    /// Audit log at `<state dir>/audit.log`.
    pub fn in_state_dir(enabled: bool) -> Result<Self, ConfigError> {
        Ok(Self::new(state_dir()?.join(AUDIT_FILE_NAME), enabled))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append one event, tagged with the local user and host.
    pub fn record(&self, event: &LockEvent) -> Result<(), StorageError> {
        if !self.enabled {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let line = format!(
            "{} | user={} | host={}",
            event.to_audit_string(),
            get_username().unwrap_or_else(|| "unknown".to_string()),
            get_hostname().unwrap_or_else(|| "unknown".to_string())
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        writeln!(file, "{}", line).map_err(|e| StorageError::io(&self.path, e))?;
        Ok(())
    }

    /// All lines currently in the file.
    pub fn read_all_entries(&self) -> Result<Vec<String>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        Ok(content.lines().map(String::from).collect())
    }
}

fn get_username() -> Option<String> {
    std::env::var("USER").or_else(|_| std::env::var("USERNAME")).ok()
}

fn get_hostname() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_audit_string_masks_digests() {
        let digest = "cbfdac6008f9cab4083784cbd1874f76618d2a97";
        let line = LockEvent::Unlocked {
            digest: digest.to_string(),
        }
        .to_audit_string();
        assert!(line.contains("| UNLOCKED | digest=cbfdac60..."));
        assert!(!line.contains(digest));
    }

    #[test]
    fn test_expired_line_carries_ages() {
        let line = LockEvent::SessionExpired {
            age_ms: 3_600_001,
            expiry_ms: 3_600_000,
        }
        .to_audit_string();
        assert!(line.ends_with("| SESSION_EXPIRED | age=3600001ms expiry=3600000ms"));
    }

    #[test]
    fn test_record_appends_lines() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("nested").join("audit.log"), true);

        log.record(&LockEvent::UnlockRejected).unwrap();
        log.record(&LockEvent::Locked).unwrap();

        let entries = log.read_all_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].contains("| UNLOCK_REJECTED | user="));
        assert!(entries[1].contains("| LOCKED | user="));
        assert!(entries[1].contains("| host="));
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.log"), false);
        log.record(&LockEvent::Locked).unwrap();
        assert!(!log.path().exists());
        assert!(log.read_all_entries().unwrap().is_empty());
    }
}
