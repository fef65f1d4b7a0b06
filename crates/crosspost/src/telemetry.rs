use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Filter comes from `RUST_LOG` (default `info`);
/// `CROSSPOST_LOG_FORMAT=json` switches to JSON lines.
///
/// Repeated calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("CROSSPOST_LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
