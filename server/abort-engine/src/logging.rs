//! Structured logging setup (`tracing` + `tracing-subscriber`).
//!
//! `RUST_LOG` overrides the configured level when set.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  /// Human-readable lines.
  #[default]
  Pretty,
  /// One JSON object per line.
  Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// trace, debug, info, warn or error
  pub level: String,
  pub format: LogFormat,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      format: LogFormat::Pretty,
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
  #[error("invalid log level: {0}")]
  InvalidLevel(String),

  #[error("failed to set global subscriber: {0}")]
  SetSubscriber(String),
}

fn filter_for(config: &LogConfig) -> Result<EnvFilter, LogError> {
  if let Ok(filter) = EnvFilter::try_from_default_env() {
    return Ok(filter);
  }
  EnvFilter::try_new(&config.level).map_err(|_| LogError::InvalidLevel(config.level.clone()))
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
  let filter = filter_for(config)?;
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false);

  let result = match config.format {
    LogFormat::Pretty => builder.try_init(),
    LogFormat::Json => builder.json().try_init(),
  };
  result.map_err(|e| LogError::SetSubscriber(e.to_string()))
}
