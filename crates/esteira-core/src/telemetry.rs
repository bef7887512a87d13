use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber for structured logging.
///
/// Debug builds get pretty-printed output; release builds emit JSON for log
/// aggregation. The level is controlled by `RUST_LOG`, defaulting to `info`.
///
/// Calling this when a subscriber is already installed is a no-op: a host
/// application embedding the adapters may have set up its own pipeline.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init();
    }
}
