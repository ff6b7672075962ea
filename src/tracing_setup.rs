use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::models::{LogConfig, LogFormat};

/// Initialize structured logging for the gateway.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies. JSON
/// output carries the span list, so every line logged while handling a
/// request includes its `request.id`.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for_level(&config.level)?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(false)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Pretty => Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init(),
    }
    .wrap_err("Failed to install tracing subscriber")?;

    tracing::info!(level = %config.level, format = ?config.format, "Structured logging initialized");
    Ok(())
}

fn filter_for_level(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))
}
