// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Structured logging shared by every refpond crate
//!
//! Usage:
//! - Set REFPOND_LOG=off (default) - no logs
//! - Set REFPOND_LOG=info - pipeline and commit progress
//! - Set REFPOND_LOG=debug - per-file resolution and store operations

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable consulted by [`init_diagnostics`]
pub const LOG_ENV: &str = "REFPOND_LOG";

static INIT: Once = Once::new();

/// Parse a `REFPOND_LOG` value into a minimum emit level.
///
/// `None` means logging is disabled. Unknown values map to `Info` and
/// set the second tuple element so the caller can warn about it.
pub fn parse_level(value: &str) -> (Option<emit::Level>, bool) {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "off" | "none" => (None, false),
        "debug" => (Some(emit::Level::Debug), false),
        "info" => (Some(emit::Level::Info), false),
        "warn" => (Some(emit::Level::Warn), false),
        "error" => (Some(emit::Level::Error), false),
        _ => (Some(emit::Level::Info), true),
    }
}

/// Initialize diagnostics based on the REFPOND_LOG environment variable
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let raw = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());
        let (level, unknown) = parse_level(&raw);

        let Some(level) = level else {
            return;
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        if unknown {
            emit::warn!("unknown {var} value {raw}, using info", var: LOG_ENV, raw: raw.as_str());
        }

        // The runtime lives for the rest of the process.
        std::mem::forget(rt);
    });
}

/// Log pipeline progress: variables built, commits, cache resets
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log per-file and per-object detail
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log recoverable conditions (stale branch heads, retries, dropped sessions)
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures that end a run or a commit
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

pub use init_diagnostics as init;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_safe_to_call_multiple_times() {
        init_diagnostics();
        init_diagnostics();
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("off"), (None, false));
        assert_eq!(parse_level("DEBUG"), (Some(emit::Level::Debug), false));
        assert_eq!(parse_level(" warn "), (Some(emit::Level::Warn), false));
        assert_eq!(parse_level("chatty"), (Some(emit::Level::Info), true));
    }

    #[test]
    fn test_macros_compile() {
        info!("Test message");
        debug!("Debug message with {value}", value: 42);
        warn!("Warning message");
        error!("Error message");
    }
}
