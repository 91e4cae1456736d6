//! Tracing subscriber initialisation.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` controls the filter; defaults
/// to `info`. Calling twice is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
