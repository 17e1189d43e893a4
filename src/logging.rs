//! Logging configuration for db-gate.
//!
//! Logs always go to stderr so stdout carries only tool output, which keeps
//! the binary usable in pipelines.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Initializes logging to stderr.
///
/// `RUST_LOG` takes precedence over `default_filter`. Safe to call more
/// than once; later calls are ignored.
pub fn init_stderr_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(default_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
