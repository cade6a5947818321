// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! lockgate - shared-password lock screen
//!
//! Keeps an application behind a single shared password. The password's
//! SHA-1 digest is configured ahead of time; entering the matching password
//! stores a session record that later checks re-validate, with optional
//! expiry and automatic invalidation when the configured digest changes.
//!
//! This is casual access gating. The digest is not secret and there are no
//! user accounts.
//!
//! # Core Modules
//!
//! - [`engine`] - The lock state machine ([`LockService`])
//! - [`store`] - Session persistence over a key-value backend
//! - [`config`] - Digest, expiry and storage key resolution
//! - [`gate`] - Route access gating
//! - [`prompt`] - Lock screen presenter and terminal prompt
//! - [`diagnostics`] - Developer tools over the stored session
//! - [`audit`] - Lock event audit trail
//! - [`error`] - Error types and user-facing error formatting
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use lockgate::{LockConfig, LockService, MemoryStore};
//!
//! let config = LockConfig::new(
//!     "cbfdac6008f9cab4083784cbd1874f76618d2a97",
//!     Duration::from_secs(3600),
//!     "angular_lock_auth",
//! );
//! let service = LockService::new(config, Arc::new(MemoryStore::new()));
//!
//! assert!(!service.check_authentication());
//! assert!(service.validate_password("password123"));
//! assert!(service.check_authentication());
//! ```

pub mod audit;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod digest;
pub mod engine;
pub mod error;
pub mod gate;
pub mod locks;
pub mod logging;
pub mod prompt;
pub mod signal;
pub mod store;
pub mod utils;

pub use audit::{AuditLog, LockEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigSources, DigestSource, LockConfig, LockText, Settings};
pub use diagnostics::{Diagnostics, StoredAuth, ValidityReport};
pub use digest::{digests_equal, digests_match, sha1_hex, sha1_hex_async};
pub use engine::{AuthState, LockService, LockServiceBuilder, SessionStatus};
pub use error::{format_error, ConfigError, ErrorBuilder, StorageError};
pub use gate::{AccessGate, Navigation, Route, RouteTable, RouteTarget};
pub use prompt::{run_terminal_prompt, LockPrompt, PromptOutcome};
pub use store::{FileStore, KeyValueStore, MemoryStore, SessionRecord, SessionStore};
