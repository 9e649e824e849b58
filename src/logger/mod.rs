//! Structured logging initialization for hosts embedding the engine.
//!
//! The engine itself only emits `tracing` events; a host that has no
//! subscriber of its own can install this one.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Filter directive, e.g. `"info"` or `"batchline=debug,info"`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Invalid log filter directive: {directive}")]
    InvalidFilter { directive: String },

    #[error("Failed to install logger: {message}")]
    Init { message: String },
}

/// Install a global subscriber. Fails if one is already set.
pub fn init_logger(config: &LoggerConfig) -> Result<(), LoggerError> {
    let filter =
        EnvFilter::try_new(&config.level).map_err(|_| LoggerError::InvalidFilter {
            directive: config.level.clone(),
        })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| LoggerError::Init {
        message: e.to_string(),
    })
}
