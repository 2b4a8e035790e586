//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

use crate::LogSettings;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(settings: &LogSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    // JSON logs + timestamps, configurable via RUST_LOG.
    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.pretty().try_init()
    };
}
