use tracing_subscriber::{fmt, EnvFilter};

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_directive`
/// (e.g. "info" or "sessionguard=debug"). Safe to call more than once; later calls are no-ops.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if fmt().with_env_filter(filter).try_init().is_ok() {
        let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
        tracing::debug!(target: "sessionguard", "logging initialised: RUST_LOG='{}', default='{}'", rust_log, default_directive);
    }
}
