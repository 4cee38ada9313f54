//! Structured logging with `tracing`.
//!
//! The discovery engine only emits events; installing a subscriber is the
//! embedding application's job. [`init_subscriber`] covers the common case of
//! human-readable stderr output filtered by level, and [`capture_logs`] lets
//! tests assert on what the engine reported while degrading.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with compact stderr output.
///
/// Call once at host startup; later calls are no-ops. `RUST_LOG` takes
/// priority over `level` when set.
///
/// # Arguments
///
/// * `level` - Minimum log level to display, e.g. `"warn"`.
pub fn init_subscriber(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Same as [`init_subscriber`] but emits one JSON object per line, for hosts
/// that ship discovery diagnostics to a collector.
pub fn init_json_subscriber(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .try_init();
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_noop() {
        init_subscriber("warn");
        init_subscriber("debug");
    }

    #[test]
    fn init_json_after_plain_is_noop() {
        init_subscriber("info");
        init_json_subscriber("info");
    }
}
