// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The lock-screen state machine.
//!
//! [`LockService`] decides whether the application is unlocked. It owns two
//! observable flags:
//!
//! - `authenticated`: a valid, unexpired session for the current password
//!   hash exists in storage
//! - `lock_visible`: the lock screen should be displayed
//!
//! Authentication is never cached. Every [`LockService::check_authentication`]
//! re-reads storage, so a session removed or rewritten by another process is
//! noticed on the next check.
//!
//! # Check order
//!
//! 1. No readable record: locked.
//! 2. Record digest is not byte-for-byte the configured digest (the password
//!    was changed, or the record was written by hand): clear it, locked.
//! 3. Expiry configured and the record is older than it: clear, locked.
//! 4. Otherwise unlocked.
//!
//! Any storage failure lands in case 1, so the engine fails closed.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::audit::{AuditLog, LockEvent};
use crate::clock::{Clock, SystemClock};
use crate::config::LockConfig;
use crate::digest::{digests_equal, digests_match, sha1_hex, sha1_hex_async};
use crate::signal::StateSignal;
use crate::store::{KeyValueStore, SessionRecord, SessionStore};
use crate::utils::mask_digest;

/// Snapshot of the observable flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub is_lock_visible: bool,
}

/// Result of [`LockService::session_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    /// Creation time of the active session
    pub created_at_ms: Option<i64>,
    /// Age of the active session
    pub age_ms: Option<i64>,
    /// Time left before the active session expires; `None` if it never does
    pub expires_in_ms: Option<i64>,
    /// Configured expiry, 0 for none
    pub expiry_ms: u64,
}

pub struct LockService {
    config: LockConfig,
    store: SessionStore,
    clock: Arc<dyn Clock>,
    audit: Option<AuditLog>,
    authenticated: StateSignal,
    lock_visible: StateSignal,
}

impl std::fmt::Debug for LockService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockService")
            .field("storage_key", &self.store.key())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Assembles a [`LockService`]. The first storage check runs in
/// [`LockServiceBuilder::build`], after the clock and audit log are in place,
/// so a session cleared at startup is audited like any other.
pub struct LockServiceBuilder {
    config: LockConfig,
    backend: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    audit: Option<AuditLog>,
}

impl LockServiceBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Also append lock events to `audit`.
    pub fn audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Create the service and derive the initial state from storage.
    pub fn build(self) -> LockService {
        let store = SessionStore::new(self.backend, self.config.storage_key());
        let service = LockService {
            config: self.config,
            store,
            clock: self.clock,
            audit: self.audit,
            authenticated: StateSignal::new(false),
            lock_visible: StateSignal::new(false),
        };
        service.check_authentication();
        service
    }
}

impl LockService {
    /// Create a service on the system clock and derive the initial state
    /// from storage.
    pub fn new(config: LockConfig, backend: Arc<dyn KeyValueStore>) -> Self {
        Self::builder(config, backend).build()
    }

    /// Same as [`LockService::new`] with an explicit clock.
    pub fn with_clock(config: LockConfig, backend: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self::builder(config, backend).clock(clock).build()
    }

    pub fn builder(config: LockConfig, backend: Arc<dyn KeyValueStore>) -> LockServiceBuilder {
        LockServiceBuilder {
            config,
            backend,
            clock: Arc::new(SystemClock),
            audit: None,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// The session store this service reads and writes.
    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Check a password and unlock on a match.
    pub fn validate_password(&self, plaintext: &str) -> bool {
        self.validate_digest(&sha1_hex(plaintext))
    }

    /// Check a password, computing the digest off the calling task.
    ///
    /// Nothing is read or written until the digest is ready, so dropping the
    /// future early leaves storage and state untouched.
    pub async fn validate_password_async(&self, plaintext: &str) -> bool {
        match sha1_hex_async(plaintext.to_string()).await {
            Some(digest) => self.validate_digest(&digest),
            None => false,
        }
    }

    /// Check an already-computed digest and unlock on a match.
    ///
    /// On a match the session is persisted first; if that fails the service
    /// stays locked and returns false. A mismatch writes nothing.
    pub fn validate_digest(&self, digest: &str) -> bool {
        let expected = self.config.expected_digest();
        if !digests_match(digest, expected) {
            tracing::debug!(submitted = %mask_digest(digest), "Digest mismatch");
            self.emit(LockEvent::UnlockRejected);
            return false;
        }

        let record = SessionRecord::new(expected, self.clock.now_millis());
        if let Err(e) = self.store.write(&record) {
            self.emit(LockEvent::SessionPersistFailed { reason: e.to_string() });
            return false;
        }

        self.authenticated.set(true);
        self.lock_visible.set(false);
        self.emit(LockEvent::Unlocked {
            digest: expected.to_string(),
        });
        true
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Re-derive authentication from storage. See the module docs for the
    /// order of checks.
    pub fn check_authentication(&self) -> bool {
        let Some(record) = self.store.read() else {
            self.authenticated.set(false);
            return false;
        };

        if !digests_equal(&record.digest, self.config.expected_digest()) {
            self.store.clear();
            self.authenticated.set(false);
            self.emit(LockEvent::SessionRotated {
                stored_digest: record.digest,
            });
            return false;
        }

        if self.config.expires() {
            let age_ms = record.age_ms(self.clock.now_millis());
            let expiry_ms = self.config.expiry_millis();
            if age_ms > i64::try_from(expiry_ms).unwrap_or(i64::MAX) {
                self.store.clear();
                self.authenticated.set(false);
                self.emit(LockEvent::SessionExpired { age_ms, expiry_ms });
                return false;
            }
        }

        self.authenticated.set(true);
        true
    }

    /// Clear the session and show the lock screen.
    pub fn lock(&self) {
        self.store.clear();
        self.authenticated.set(false);
        self.lock_visible.set(true);
        self.emit(LockEvent::Locked);
    }

    pub fn show_lock(&self) {
        self.lock_visible.set(true);
    }

    pub fn hide_lock(&self) {
        self.lock_visible.set(false);
    }

    /// Run a check and describe the resulting session.
    pub fn session_status(&self) -> SessionStatus {
        let authenticated = self.check_authentication();
        let expiry_ms = self.config.expiry_millis();
        let record = if authenticated { self.store.read() } else { None };

        let now = self.clock.now_millis();
        let age_ms = record.as_ref().map(|r| r.age_ms(now));
        let expires_in_ms = match age_ms {
            Some(age) if self.config.expires() => {
                Some(i64::try_from(expiry_ms).unwrap_or(i64::MAX).saturating_sub(age))
            }
            _ => None,
        };

        SessionStatus {
            authenticated,
            created_at_ms: record.map(|r| r.created_at_ms),
            age_ms,
            expires_in_ms,
            expiry_ms,
        }
    }

    // ------------------------------------------------------------------
    // Observable state
    // ------------------------------------------------------------------

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.get()
    }

    pub fn is_lock_visible(&self) -> bool {
        self.lock_visible.get()
    }

    pub fn state(&self) -> AuthState {
        AuthState {
            is_authenticated: self.is_authenticated(),
            is_lock_visible: self.is_lock_visible(),
        }
    }

    pub fn subscribe_authenticated(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    pub fn subscribe_lock_visible(&self) -> watch::Receiver<bool> {
        self.lock_visible.subscribe()
    }

    fn emit(&self, event: LockEvent) {
        event.trace();
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(&event) {
                tracing::warn!(event = "AUDIT_WRITE_FAILED", "Could not append to audit log: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::DEFAULT_PASSWORD_HASH;
    use crate::error::StorageError;
    use crate::store::MemoryStore;
    use std::time::Duration;

    const KEY: &str = "angular_lock_auth";
    const NOW: i64 = 1_700_000_000_000;

    struct Fixture {
        backend: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        service: LockService,
    }

    fn fixture(expiry: Duration) -> Fixture {
        let backend = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let service = LockService::with_clock(
            LockConfig::new(DEFAULT_PASSWORD_HASH, expiry, KEY),
            backend.clone(),
            clock.clone(),
        );
        Fixture {
            backend,
            clock,
            service,
        }
    }

    fn seed(backend: &MemoryStore, digest: &str, timestamp: i64) {
        let json = serde_json::to_string(&SessionRecord::new(digest, timestamp)).unwrap();
        backend.set_item(KEY, &json).unwrap();
    }

    fn stored(backend: &MemoryStore) -> Option<SessionRecord> {
        backend
            .get_item(KEY)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    /// Backend whose reads and/or writes always fail.
    struct BrokenStore {
        reads_fail: bool,
        inner: MemoryStore,
    }

    impl KeyValueStore for BrokenStore {
        fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.reads_fail {
                return Err(StorageError::Unavailable("read refused".into()));
            }
            self.inner.get_item(key)
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".into()))
        }

        fn remove_item(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove_item(key)
        }
    }

    #[test]
    fn test_starts_locked_with_empty_storage() {
        let f = fixture(Duration::ZERO);
        assert_eq!(
            f.service.state(),
            AuthState {
                is_authenticated: false,
                is_lock_visible: false
            }
        );
        assert!(!f.service.check_authentication());
    }

    #[test]
    fn test_correct_password_persists_session() {
        let f = fixture(Duration::ZERO);
        f.service.show_lock();

        assert!(f.service.validate_password("password123"));
        assert!(f.service.is_authenticated());
        assert!(!f.service.is_lock_visible());
        assert_eq!(stored(&f.backend), Some(SessionRecord::new(DEFAULT_PASSWORD_HASH, NOW)));
    }

    #[test]
    fn test_wrong_password_writes_nothing() {
        let f = fixture(Duration::ZERO);
        assert!(!f.service.validate_password("wrong"));
        assert!(!f.service.is_authenticated());
        assert!(f.backend.is_empty());

        // An existing session survives a failed attempt
        seed(&f.backend, DEFAULT_PASSWORD_HASH, NOW - 5);
        assert!(!f.service.validate_password(""));
        assert_eq!(stored(&f.backend), Some(SessionRecord::new(DEFAULT_PASSWORD_HASH, NOW - 5)));
    }

    #[test]
    fn test_validate_digest_accepts_uppercase() {
        let f = fixture(Duration::ZERO);
        assert!(f.service.validate_digest(&DEFAULT_PASSWORD_HASH.to_uppercase()));
        assert_eq!(stored(&f.backend).unwrap().digest, DEFAULT_PASSWORD_HASH);
    }

    #[test]
    fn test_constructor_picks_up_existing_session() {
        let backend = Arc::new(MemoryStore::new());
        seed(&backend, DEFAULT_PASSWORD_HASH, 1);
        let service = LockService::new(LockConfig::new(DEFAULT_PASSWORD_HASH, Duration::ZERO, KEY), backend);
        assert!(service.is_authenticated());
    }

    #[test]
    fn test_hash_rotation_clears_session() {
        let f = fixture(Duration::ZERO);
        seed(&f.backend, &sha1_hex("old password"), NOW);

        assert!(!f.service.check_authentication());
        assert!(f.backend.is_empty());
    }

    #[test]
    fn test_no_expiry_keeps_ancient_sessions() {
        let f = fixture(Duration::ZERO);
        seed(&f.backend, DEFAULT_PASSWORD_HASH, 0);
        assert!(f.service.check_authentication());
    }

    #[test]
    fn test_expiry_boundary() {
        let expiry_ms: i64 = 3_600_000;
        let f = fixture(Duration::from_millis(expiry_ms as u64));

        seed(&f.backend, DEFAULT_PASSWORD_HASH, NOW - expiry_ms + 1);
        assert!(f.service.check_authentication());

        // Exactly at the limit is still valid
        seed(&f.backend, DEFAULT_PASSWORD_HASH, NOW - expiry_ms);
        assert!(f.service.check_authentication());

        seed(&f.backend, DEFAULT_PASSWORD_HASH, NOW - expiry_ms - 1);
        assert!(!f.service.check_authentication());
        assert!(f.backend.is_empty());
    }

    #[test]
    fn test_session_expires_as_clock_advances() {
        let f = fixture(Duration::from_secs(60));
        assert!(f.service.validate_password("password123"));

        f.clock.advance(60_000);
        assert!(f.service.check_authentication());
        f.clock.advance(1);
        assert!(!f.service.check_authentication());
        assert!(!f.service.is_authenticated());
    }

    #[test]
    fn test_sub_millisecond_expiry_still_expires() {
        let f = fixture(Duration::from_micros(500));
        assert!(f.service.validate_password("password123"));
        f.clock.advance(1);
        assert!(f.service.check_authentication());
        f.clock.advance(1);
        assert!(!f.service.check_authentication());
    }

    #[test]
    fn test_future_timestamp_is_not_expired() {
        let f = fixture(Duration::from_secs(1));
        seed(&f.backend, DEFAULT_PASSWORD_HASH, NOW + 86_400_000);
        assert!(f.service.check_authentication());
    }

    #[test]
    fn test_non_canonical_stored_digest_is_rotated() {
        let f = fixture(Duration::ZERO);

        seed(&f.backend, &DEFAULT_PASSWORD_HASH.to_uppercase(), NOW);
        assert!(!f.service.check_authentication());
        assert!(f.backend.is_empty());

        seed(&f.backend, &format!(" {} ", DEFAULT_PASSWORD_HASH), 1);
        assert!(!f.service.check_authentication());
        assert!(!f.service.is_authenticated());
        assert!(f.backend.is_empty());
    }

    fn audited_service(dir: &tempfile::TempDir, backend: Arc<MemoryStore>, expiry: Duration) -> (LockService, AuditLog) {
        let audit = AuditLog::new(dir.path().join("audit.log"), true);
        let service = LockService::builder(LockConfig::new(DEFAULT_PASSWORD_HASH, expiry, KEY), backend)
            .clock(Arc::new(ManualClock::new(NOW)))
            .audit(audit.clone())
            .build();
        (service, audit)
    }

    #[test]
    fn test_rotation_checked_before_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryStore::new());
        seed(&backend, &sha1_hex("old"), 0);

        let (service, audit) = audited_service(&dir, backend.clone(), Duration::from_secs(1));
        assert!(!service.is_authenticated());
        assert!(backend.is_empty());

        let entries = audit.read_all_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].contains("SESSION_ROTATED"));
    }

    #[test]
    fn test_startup_expiry_is_audited() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryStore::new());
        seed(&backend, DEFAULT_PASSWORD_HASH, NOW - 2_000);

        let (service, audit) = audited_service(&dir, backend.clone(), Duration::from_secs(1));
        assert!(!service.is_authenticated());
        assert!(backend.is_empty());

        let entries = audit.read_all_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].contains("SESSION_EXPIRED"));
    }

    #[test]
    fn test_lock_clears_and_shows() {
        let f = fixture(Duration::ZERO);
        assert!(f.service.validate_password("password123"));

        f.service.lock();
        assert!(f.service.is_lock_visible());
        assert!(!f.service.is_authenticated());
        assert!(!f.service.check_authentication());
        assert!(f.backend.is_empty());

        // Locking again is harmless
        f.service.lock();
        assert!(f.service.is_lock_visible());
    }

    #[test]
    fn test_show_and_hide_do_not_touch_authentication() {
        let f = fixture(Duration::ZERO);
        assert!(f.service.validate_password("password123"));
        f.service.show_lock();
        assert!(f.service.is_authenticated());
        f.service.hide_lock();
        assert!(!f.service.is_lock_visible());
    }

    #[test]
    fn test_corrupt_storage_fails_closed() {
        let f = fixture(Duration::ZERO);
        f.backend.set_item(KEY, "definitely not json").unwrap();
        assert!(!f.service.check_authentication());
    }

    #[test]
    fn test_failing_reads_fail_closed() {
        let backend = Arc::new(BrokenStore {
            reads_fail: true,
            inner: MemoryStore::new(),
        });
        backend.inner.set_item(KEY, r#"{"passwordHash":"x","timestamp":1}"#).unwrap();
        let service = LockService::new(LockConfig::new(DEFAULT_PASSWORD_HASH, Duration::ZERO, KEY), backend);
        assert!(!service.check_authentication());
    }

    #[test]
    fn test_failing_writes_fail_closed() {
        let backend = Arc::new(BrokenStore {
            reads_fail: false,
            inner: MemoryStore::new(),
        });
        let service = LockService::new(LockConfig::new(DEFAULT_PASSWORD_HASH, Duration::ZERO, KEY), backend);
        service.show_lock();

        assert!(!service.validate_password("password123"));
        assert!(!service.is_authenticated());
        assert!(service.is_lock_visible());
    }

    #[test]
    fn test_session_status_reports_remaining_time() {
        let f = fixture(Duration::from_secs(3600));
        let status = f.service.session_status();
        assert!(!status.authenticated);
        assert_eq!(status.age_ms, None);

        assert!(f.service.validate_password("password123"));
        f.clock.advance(600_000);
        let status = f.service.session_status();
        assert!(status.authenticated);
        assert_eq!(status.created_at_ms, Some(NOW));
        assert_eq!(status.age_ms, Some(600_000));
        assert_eq!(status.expires_in_ms, Some(3_000_000));
        assert_eq!(status.expiry_ms, 3_600_000);
    }

    #[test]
    fn test_session_status_without_expiry() {
        let f = fixture(Duration::ZERO);
        assert!(f.service.validate_password("password123"));
        let status = f.service.session_status();
        assert!(status.authenticated);
        assert_eq!(status.expires_in_ms, None);
    }

    #[tokio::test]
    async fn test_async_validation() {
        let f = fixture(Duration::ZERO);
        assert!(!f.service.validate_password_async("wrong").await);
        assert!(f.backend.is_empty());
        assert!(f.service.validate_password_async("password123").await);
        assert!(stored(&f.backend).is_some());
    }

    #[tokio::test]
    async fn test_dropped_validation_has_no_effect() {
        let f = fixture(Duration::ZERO);

        // Never polled
        drop(f.service.validate_password_async("password123"));
        assert!(f.backend.is_empty());

        // Cancelled mid-flight
        let outcome = tokio::time::timeout(Duration::ZERO, f.service.validate_password_async("password123")).await;
        if outcome.is_err() {
            assert!(f.backend.is_empty());
            assert!(!f.service.is_authenticated());
        }
    }

    #[tokio::test]
    async fn test_subscribers_observe_unlock_and_lock() {
        let f = fixture(Duration::ZERO);
        let mut auth_rx = f.service.subscribe_authenticated();
        let mut lock_rx = f.service.subscribe_lock_visible();

        f.service.show_lock();
        lock_rx.changed().await.unwrap();
        assert!(*lock_rx.borrow_and_update());

        assert!(f.service.validate_password_async("password123").await);
        auth_rx.changed().await.unwrap();
        assert!(*auth_rx.borrow_and_update());
        lock_rx.changed().await.unwrap();
        assert!(!*lock_rx.borrow_and_update());

        f.service.lock();
        auth_rx.changed().await.unwrap();
        assert!(!*auth_rx.borrow_and_update());
    }
}
