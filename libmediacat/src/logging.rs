use tracing_subscriber::{fmt, EnvFilter};

/// Initialise global tracing subscriber.
///
/// Reads `RUST_LOG` for filtering, falls back to `info`. Safe to call more
/// than once; only the first call installs a subscriber.
pub fn init() {
    init_with(None);
}

/// Like [`init`], but `level` (e.g. `"debug"`) wins over `RUST_LOG`.
pub fn init_with(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    // Output goes to stderr so stdout stays clean for `info` listings.
    let _ = fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
