//! Structured logging setup for the stream relay

use relay_config::{LogFormat, RelayConfig};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// `RUST_LOG` wins; otherwise the configured default level applies
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize logging as described by the relay configuration
pub fn init_from_config(service_name: &str, config: &RelayConfig) {
    match config.log_format {
        LogFormat::Json => init_logging(service_name, config.log_level()),
        LogFormat::Console => init_console_logging(service_name, config.log_level()),
    }
}

/// Initialize structured JSON logging
///
/// This sets up:
/// - JSON formatted logs (for production)
/// - Environment-based log level filtering
/// - Service name tagging
pub fn init_logging(service_name: &str, default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    tracing::info!(
        service = service_name,
        "Logging initialized"
    );
}

/// Initialize human-readable console logging (for development)
pub fn init_console_logging(service_name: &str, default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        service = service_name,
        "Console logging initialized"
    );
}
