//! Tracing setup for node binaries
//!
//! Library code only emits events; installing a subscriber is the
//! process entry point's job, through this one call.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber, filtered by `RUST_LOG`
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
