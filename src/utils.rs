// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Small helpers shared by the engine, diagnostics and CLI.

/// Number of hex characters of a digest that may appear in logs.
pub const DIGEST_LOG_PREFIX: usize = 8;

/// Mask a digest for logging.
///
/// Shows only the first [`DIGEST_LOG_PREFIX`] characters followed by "...".
/// Digests are never logged in full.
///
/// ```
/// use lockgate::utils::mask_digest;
///
/// assert_eq!(mask_digest("cbfdac6008f9cab4083784cbd1874f76618d2a97"), "cbfdac60...");
/// ```
pub fn mask_digest(digest: &str) -> String {
    let prefix: String = digest.chars().take(DIGEST_LOG_PREFIX).collect();
    format!("{}...", prefix)
}

/// Render a millisecond span as a short human string ("3 minutes", "2 hours").
pub fn describe_millis(ms: u64) -> String {
    let secs = ms / 1000;
    if secs < 60 {
        return plural(secs, "second");
    }
    let mins = secs / 60;
    if mins < 60 {
        return plural(mins, "minute");
    }
    let hours = mins / 60;
    if hours < 48 {
        return plural(hours, "hour");
    }
    plural(hours / 24, "day")
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}
