//! Logging setup for the `webusb-host` binary
//!
//! The session and protocol crates only emit `tracing` events; the binary
//! installs the subscriber once at startup, with the level taken from
//! `--log-level` or the `[host] log_level` config key.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global fmt subscriber
///
/// `RUST_LOG` takes precedence over `default_level` when set, so discovery
/// can be traced with `RUST_LOG=session=debug` without touching the config.
/// Fails with [`Error::Config`](crate::Error::Config) on an unparsable
/// filter or when a subscriber is already installed.
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| crate::Error::Config(format!("Logging already initialized: {}", e)))?;

    Ok(())
}

