// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session persistence.
//!
//! [`KeyValueStore`] is the durable string store the lock screen keeps its
//! single session record in. [`SessionStore`] owns the record's persisted
//! shape and is the only code that reads or writes it.
//!
//! Backends:
//! - [`FileStore`]: one file per key, locked and atomically replaced
//! - [`MemoryStore`]: process-local map, for tests and embedding

mod file;
mod memory;
mod session;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use session::{SessionRecord, SessionStore};

use crate::error::StorageError;

/// A string key-value store that outlives the process.
///
/// Implementations must be safe to share across threads. Removing a key
/// that does not exist succeeds.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}
