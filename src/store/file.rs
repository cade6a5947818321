// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! File-backed key-value store.
//!
//! Each key lives in `<dir>/<name>.json`. Access is coordinated through a
//! sibling `<name>.lock` file: readers take a shared lock, writers an
//! exclusive one held across the temp-file write and the atomic rename, so a
//! reader never sees a half-written value.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use super::KeyValueStore;
use crate::config::state_dir;
use crate::error::{ConfigError, StorageError};

/// Default timeout for acquiring file locks (5 seconds)
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry interval when waiting for lock acquisition
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Prefix for file names derived from keys that are not filename-safe.
const ENCODED_PREFIX: &str = "hex-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    lock_timeout: Duration,
}

impl FileStore {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    /// Store under `<state dir>/storage`.
    pub fn in_state_dir() -> Result<Self, ConfigError> {
        Ok(Self::new(state_dir()?.join("storage")))
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the value file for `key`.
    pub fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", file_stem(key)))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.tmp", file_stem(key)))
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::io(&self.dir, e))
    }

    /// Open the lock file for `key` and lock it, retrying until the timeout.
    ///
    /// The lock is released when the returned handle is dropped.
    fn acquire_lock(&self, key: &str, mode: LockMode) -> Result<File, StorageError> {
        let path = self.lock_path(key);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;

        let start = Instant::now();
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&lock_file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&lock_file),
            };
            match attempt {
                Ok(()) => return Ok(lock_file),
                Err(e) if is_contended(&e) => {
                    if start.elapsed() >= self.lock_timeout {
                        tracing::warn!(
                            event = "STORAGE_LOCK_TIMEOUT",
                            path = ?path,
                            "Timed out waiting for {:?} lock; another process may be writing",
                            mode
                        );
                        return Err(StorageError::LockTimeout {
                            path,
                            waited_ms: start.elapsed().as_millis(),
                        });
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.item_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let _guard = self.acquire_lock(key, LockMode::Shared)?;

        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            // Removed between the existence check and the lock
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.ensure_dir()?;
        let _guard = self.acquire_lock(key, LockMode::Exclusive)?;

        let path = self.item_path(key);
        let temp_path = self.temp_path(key);
        {
            let mut temp_file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| StorageError::io(&temp_path, e))?;
            temp_file
                .write_all(value.as_bytes())
                .map_err(|e| StorageError::io(&temp_path, e))?;
            temp_file.sync_all().map_err(|e| StorageError::io(&temp_path, e))?;
        }

        fs::rename(&temp_path, &path).map_err(|e| StorageError::io(&path, e))?;
        tracing::trace!("Stored {} bytes at {:?}", value.len(), path);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let path = self.item_path(key);
        if !path.exists() {
            return Ok(());
        }

        let _guard = self.acquire_lock(key, LockMode::Exclusive)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Map a key to a file stem. Filename-safe keys are used as-is; anything
/// else is hex-encoded so distinct keys never collide.
fn file_stem(key: &str) -> String {
    let safe = !key.is_empty()
        && !key.starts_with(ENCODED_PREFIX)
        && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        && key != "."
        && key != "..";
    if safe {
        key.to_string()
    } else {
        format!("{}{}", ENCODED_PREFIX, hex::encode(key.as_bytes()))
    }
}
