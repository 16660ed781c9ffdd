//! Error types for the prediction service

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Market data error for {instrument}: {message}")]
    DataFetch { instrument: String, message: String },

    #[error("Request for {instrument} timed out after {timeout:?}")]
    Timeout { instrument: String, timeout: Duration },

    #[error("No market data available: {0}")]
    NoData(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for OracleError {
    fn from(e: config::ConfigError) -> Self {
        OracleError::Config(e.to_string())
    }
}

impl OracleError {
    /// Per-instrument failures that only skip one instrument for a cycle
    pub fn is_instrument_scoped(&self) -> bool {
        matches!(
            self,
            OracleError::DataFetch { .. } | OracleError::Timeout { .. } | OracleError::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, OracleError>;
