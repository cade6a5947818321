// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Diagnostic logging setup.
//!
//! Logs go to stderr so they never mix with command output. `LOCKGATE_LOG`
//! takes any `EnvFilter` directive (`debug`, `lockgate=trace`, ...) and wins
//! over the command-line verbosity.

use tracing_subscriber::EnvFilter;

pub const ENV_LOG: &str = "LOCKGATE_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only (`-q`)
    Quiet,
    #[default]
    Normal,
    /// Debug output (`-v`)
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (true, _) => Verbosity::Verbose,
            (false, true) => Verbosity::Quiet,
            _ => Verbosity::Normal,
        }
    }

    pub fn directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "debug",
        }
    }
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
