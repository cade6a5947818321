// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::KeyValueStore;
use crate::error::StorageError;

/// The persisted proof of a successful unlock.
///
/// Stored as `{"passwordHash":"<hex>","timestamp":<epoch ms>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Digest that was valid when the session was created
    #[serde(rename = "passwordHash")]
    pub digest: String,

    /// Creation time, milliseconds since the Unix epoch
    #[serde(rename = "timestamp")]
    pub created_at_ms: i64,
}

impl SessionRecord {
    pub fn new(digest: impl Into<String>, created_at_ms: i64) -> Self {
        Self {
            digest: digest.into(),
            created_at_ms,
        }
    }

    /// Milliseconds between creation and `now_ms`. Negative if the record
    /// claims to be from the future.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.created_at_ms)
    }
}

/// Reads, writes and clears the single session record under one key.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").field("key", &self.key).finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The stored record, or `None` if it is missing, unparseable, or the
    /// backend failed. Never errors.
    pub fn read(&self) -> Option<SessionRecord> {
        let raw = match self.backend.get_item(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(event = "SESSION_READ_FAILED", key = %self.key, "Could not read session: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    event = "SESSION_CORRUPT",
                    key = %self.key,
                    "Stored session is not a valid record, treating as absent: {}",
                    e
                );
                None
            }
        }
    }

    /// Replace the stored record.
    pub fn write(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let json = serde_json::to_string(record)?;
        self.backend.set_item(&self.key, &json)
    }

    /// Remove the stored record. Idempotent; backend failures are logged.
    pub fn clear(&self) {
        if let Err(e) = self.backend.remove_item(&self.key) {
            tracing::warn!(event = "SESSION_CLEAR_FAILED", key = %self.key, "Could not clear session: {}", e);
        }
    }

    /// The stored value exactly as persisted.
    pub fn read_raw(&self) -> Result<Option<String>, StorageError> {
        self.backend.get_item(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store() -> (Arc<MemoryStore>, SessionStore) {
        let backend = Arc::new(MemoryStore::new());
        let session = SessionStore::new(backend.clone(), "angular_lock_auth");
        (backend, session)
    }

    #[test]
    fn test_persisted_shape() {
        let (backend, session) = store();
        session
            .write(&SessionRecord::new("cbfdac6008f9cab4083784cbd1874f76618d2a97", 1_700_000_000_000))
            .unwrap();

        let raw = backend.get_item("angular_lock_auth").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["passwordHash"], "cbfdac6008f9cab4083784cbd1874f76618d2a97");
        assert_eq!(value["timestamp"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_reads_record_written_elsewhere() {
        let (backend, session) = store();
        backend
            .set_item("angular_lock_auth", r#"{"passwordHash":"abc","timestamp":42}"#)
            .unwrap();
        assert_eq!(session.read(), Some(SessionRecord::new("abc", 42)));
    }

    #[test]
    fn test_corrupt_value_reads_as_absent_and_is_kept() {
        let (backend, session) = store();
        backend.set_item("angular_lock_auth", "{not json").unwrap();
        assert_eq!(session.read(), None);
        assert_eq!(session.read_raw().unwrap().as_deref(), Some("{not json"));

        backend.set_item("angular_lock_auth", r#"{"timestamp":1}"#).unwrap();
        assert_eq!(session.read(), None);
    }

    #[test]
    fn test_clear_touches_only_its_key() {
        let (backend, session) = store();
        backend.set_item("other", "keep").unwrap();
        session.write(&SessionRecord::new("abc", 1)).unwrap();

        session.clear();
        session.clear();
        assert_eq!(session.read(), None);
        assert_eq!(backend.get_item("other").unwrap().as_deref(), Some("keep"));
    }

    #[test]
    fn test_age_can_be_negative() {
        let record = SessionRecord::new("abc", 1_000);
        assert_eq!(record.age_ms(1_500), 500);
        assert_eq!(record.age_ms(400), -600);
    }
}
