//! Tracing subscriber setup for hosts.
//!
//! Library code only emits events; hosts call [`init`] once at startup to
//! see them. Honors `RUST_LOG`-style filter directives.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber with the given default filter
/// (overridable via `RUST_LOG`). Safe to call more than once; later calls
/// are no-ops.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
