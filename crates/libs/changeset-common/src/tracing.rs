use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// Callers pass `json_format`; the HTTP binary enables it and the stdio and
/// CLI binaries leave it off, because stdio's line-framed protocol shares
/// stdout with responses — logs always go to stderr, but the stdio transport
/// additionally wants a human-readable form that won't be mistaken for
/// JSON-RPC traffic if it ever leaks onto the same stream.
pub fn setup_tracing(json_format: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,tower_http=debug,axum=debug,changeset=debug")
    });

    if json_format {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}
