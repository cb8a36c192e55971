use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber; `RUST_LOG` controls the filter, defaulting
/// to info for the server's own crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ironfhir=debug"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
