use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::models::LoggingConfig;

/// Initialize tracing from the `[logging]` section.
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    init_tracing_with_config(&logging.level, logging.json)
}

/// Initialize tracing with an explicit level directive and output format.
pub fn init_tracing_with_config(level: &str, json_format: bool) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(level)?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(false)
                    .with_span_list(true),
            )
            .try_init()
            .wrap_err("Failed to install JSON tracing subscriber")?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
            .wrap_err("Failed to install console tracing subscriber")?;
    }

    tracing::debug!(log_level = level, json = json_format, "Relay logging initialized");
    Ok(())
}

fn level_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))
}

/// Create a request-scoped tracing span
pub fn create_request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
        http.status_code = tracing::field::Empty,
    )
}

/// Create the span wrapping the outbound call
pub fn create_backend_span(upstream: &str, method: &str, path: &str) -> tracing::Span {
    tracing::info_span!(
        "backend_request",
        backend.url = upstream,
        http.method = method,
        http.path = path,
        http.status_code = tracing::field::Empty,
    )
}
