use tracing_subscriber::EnvFilter;

/// Initialize tracing to stderr. Interactive output goes to stdout; keeping
/// diagnostics on stderr leaves the shell transcript clean. Honors
/// `RUST_LOG`, defaulting to `info` (or `debug` when debug logging is on).
pub fn init(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
