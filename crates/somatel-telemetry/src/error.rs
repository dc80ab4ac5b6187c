//! Error types for Somatel Telemetry

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid telemetry config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Trace pipeline error: {0}")]
    Trace(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
