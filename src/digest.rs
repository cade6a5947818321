// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Password digests.
//!
//! The lock screen compares a hex-encoded SHA-1 of the submitted password
//! against the configured digest. SHA-1 is a fixed, publicly known choice for
//! casual access gating only; nothing here is meant to resist an attacker who
//! can read the configuration.

use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

/// Length of a hex-encoded SHA-1 digest.
pub const SHA1_HEX_LEN: usize = 40;

/// Lowercase hex SHA-1 of `plaintext`.
///
/// ```
/// use lockgate::digest::sha1_hex;
///
/// assert_eq!(sha1_hex("password123"), "cbfdac6008f9cab4083784cbd1874f76618d2a97");
/// ```
pub fn sha1_hex(plaintext: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

/// Same digest as [`sha1_hex`], computed on tokio's blocking pool.
///
/// Returns `None` only if the blocking task was cancelled or panicked.
pub async fn sha1_hex_async(plaintext: String) -> Option<String> {
    match tokio::task::spawn_blocking(move || sha1_hex(&plaintext)).await {
        Ok(digest) => Some(digest),
        Err(e) => {
            tracing::error!(event = "DIGEST_TASK_FAILED", "Digest computation did not complete: {}", e);
            None
        }
    }
}

/// Compare two hex digests in constant time, ignoring ASCII case and
/// surrounding whitespace. For user-supplied input.
pub fn digests_match(a: &str, b: &str) -> bool {
    digests_equal(&a.trim().to_ascii_lowercase(), &b.trim().to_ascii_lowercase())
}

/// Byte-exact constant-time comparison. A stored record must carry exactly
/// the configured digest.
pub fn digests_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// True if `s` looks like a hex-encoded SHA-1 digest.
pub fn is_sha1_hex(s: &str) -> bool {
    s.len() == SHA1_HEX_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
}
