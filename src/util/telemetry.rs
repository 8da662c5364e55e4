//! Structured logging setup.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `info`.
/// Does nothing when a subscriber is already set.
pub fn init_tracing() {
    init_tracing_with("info");
}

/// Like [`init_tracing`] with an explicit fallback filter used when
/// `RUST_LOG` is unset or invalid. Returns whether a subscriber was installed.
pub fn init_tracing_with(default_directive: &str) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
