//! Tracing subscriber setup for programs embedding this crate.
//!
//! The library only emits `tracing` events; nothing is printed until the
//! host program installs a subscriber, either its own or this one.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `config.level` when the variable is unset or invalid.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes. Safe to call more than once.
///
/// Example: `RUST_LOG=lodestar=debug` shows lifecycle events,
/// `RUST_LOG=lodestar=trace` adds every message on the wire.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_LEVEL));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
