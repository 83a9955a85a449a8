//! Tracing/logging initialization.
//!
//! JSON lines on stdout with timestamps, filtered through `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Initialize tracing/logging for the process.
pub fn init() {
    try_init_with(DEFAULT_FILTER);
}

/// Install the global JSON subscriber, falling back to `default_filter`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn try_init_with(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok()
}
