// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Developer tools for poking at the stored session.
//!
//! Everything here goes through [`SessionStore`], so it reads and writes
//! exactly what the engine does. None of it is used by the engine itself.

use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::digest::sha1_hex;
use crate::error::StorageError;
use crate::store::{SessionRecord, SessionStore};

/// Passwords whose digests are handy when configuring a test deployment.
pub const COMMON_PASSWORDS: [&str; 5] = ["password", "password123", "admin", "test", "12345"];

/// A stored record plus how old it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredAuth {
    pub record: SessionRecord,
    pub age_ms: i64,
}

/// Whether the stored session would survive a given expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidityReport {
    pub elapsed_ms: i64,
    /// 0 means no expiry
    pub expiry_ms: u64,
    pub expired: bool,
    /// Time left, floored at zero; `None` if the session never expires
    pub remaining_ms: Option<i64>,
}

pub struct Diagnostics {
    store: SessionStore,
    clock: Arc<dyn Clock>,
}

impl Diagnostics {
    pub fn new(store: SessionStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn generate_hash(password: &str) -> String {
        sha1_hex(password)
    }

    /// `(password, digest)` for each of [`COMMON_PASSWORDS`].
    pub fn common_hashes() -> Vec<(&'static str, String)> {
        COMMON_PASSWORDS.iter().map(|p| (*p, sha1_hex(p))).collect()
    }

    pub fn clear_auth(&self) {
        self.store.clear();
        tracing::info!(event = "DIAG_CLEAR", key = %self.store.key(), "Session cleared by diagnostics");
    }

    pub fn stored_auth(&self) -> Option<StoredAuth> {
        let record = self.store.read()?;
        let age_ms = record.age_ms(self.clock.now_millis());
        Some(StoredAuth { record, age_ms })
    }

    /// Write a session for `digest`, stamped now. The digest is stored as
    /// given, which makes it possible to forge a record for a stale hash.
    pub fn set_auth(&self, digest: &str) -> Result<SessionRecord, StorageError> {
        let record = SessionRecord::new(digest, self.clock.now_millis());
        self.store.write(&record)?;
        tracing::info!(event = "DIAG_SET_AUTH", key = %self.store.key(), "Session written by diagnostics");
        Ok(record)
    }

    /// Make the current session look `age_ms` old. Returns `Ok(false)` if
    /// there is no session to modify.
    pub fn backdate(&self, age_ms: u64) -> Result<bool, StorageError> {
        let Some(current) = self.store.read() else {
            return Ok(false);
        };
        let age = i64::try_from(age_ms).unwrap_or(i64::MAX);
        let record = SessionRecord::new(current.digest, self.clock.now_millis().saturating_sub(age));
        self.store.write(&record)?;
        tracing::info!(event = "DIAG_BACKDATE", age_ms, "Session backdated by diagnostics");
        Ok(true)
    }

    /// Evaluate the stored session against `expiry_ms` (0 = no expiry)
    /// without modifying it.
    pub fn session_validity(&self, expiry_ms: u64) -> Option<ValidityReport> {
        let stored = self.stored_auth()?;
        let elapsed_ms = stored.age_ms;
        let expiry = i64::try_from(expiry_ms).unwrap_or(i64::MAX);

        let (expired, remaining_ms) = if expiry_ms == 0 {
            (false, None)
        } else {
            (elapsed_ms > expiry, Some(expiry.saturating_sub(elapsed_ms).max(0)))
        };

        Some(ValidityReport {
            elapsed_ms,
            expiry_ms,
            expired,
            remaining_ms,
        })
    }
}
