//! Error types for the Sendlimit service.

use thiserror::Error;

/// Main error type for Sendlimit operations.
#[derive(Error, Debug)]
pub enum SendlimitError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed policy delegation traffic
    #[error("Policy protocol error: {0}")]
    Protocol(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for SendlimitError {
    fn from(err: config::ConfigError) -> Self {
        SendlimitError::Config(err.to_string())
    }
}

/// Result type alias for Sendlimit operations.
pub type Result<T> = std::result::Result<T, SendlimitError>;
