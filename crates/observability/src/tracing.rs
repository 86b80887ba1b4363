//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, falling back to `default_level`.
pub fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing/logging for the process.
///
/// `RUST_LOG` wins over `default_level`. With `json`, events are emitted as
/// JSON lines with timestamps; otherwise in the human-readable format.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_with(default_level: &str, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
