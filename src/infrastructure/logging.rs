//! Logging initialization.
//!
//! Thin wrapper over `tracing-subscriber`: env-filter controlled levels with
//! formatted console output. Hosts embedding the engine can install their
//! own subscriber instead; `init_logging` is safe to call more than once.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,activity_bulk_edit=debug";

/// Initializes the global tracing subscriber.
///
/// Respects `RUST_LOG` when present. Calling this after a subscriber is
/// already installed is a no-op rather than an error.
pub fn init_logging() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();

    if installed {
        info!("logging initialized");
    }
    Ok(())
}
