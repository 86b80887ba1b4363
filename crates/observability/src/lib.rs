//! Tracing and logging setup shared by the service binaries.

/// Initialize process-wide logging with defaults (`info`, JSON lines).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init_with("info", true);
}

/// Initialize logging with a default level and output format.
pub fn init_with(level: &str, json: bool) {
    tracing::init_with(level, json);
}

/// Tracing configuration (filters, formatters).
pub mod tracing;
