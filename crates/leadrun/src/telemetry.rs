//! Process-wide logging setup.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to bridge log records: {0}")]
    LogBridge(#[from] log::SetLoggerError),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the global subscriber. `LEADRUN_LOG` wins over `RUST_LOG`,
/// which wins over the configured level.
///
/// Fields to keep on run events: `job_id` always, `stage` inside a stage.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    tracing_log::LogTracer::init()?;

    let json = config.json.then(|| fmt::layer().json().with_target(true));
    let plain = (!config.json).then(|| fmt::layer().with_target(true));
    let subscriber = tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(json)
        .with(plain);

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env("LEADRUN_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}
