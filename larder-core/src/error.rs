//! Error types for Larder operations

use thiserror::Error;

/// Key-value store errors.
///
/// Every variant describes an infrastructure failure. Whether the pipeline
/// degrades or fails closed on one of these is decided by the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection failed: {reason}")]
    Connection { reason: String },

    #[error("Store command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Operation against a key holding the wrong kind of value: {key}")]
    WrongType { key: String },

    #[error("Value at {key} is not an integer")]
    NotAnInteger { key: String },

    #[error("Store unavailable")]
    Unavailable,
}

impl StoreError {
    /// Build a `Command` error from any displayable failure.
    pub fn command(command: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        StoreError::Command {
            command: command.into(),
            reason: reason.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Larder errors.
#[derive(Debug, Clone, Error)]
pub enum LarderError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for LarderError {
    fn from(err: serde_json::Error) -> Self {
        LarderError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for Larder operations.
pub type LarderResult<T> = Result<T, LarderError>;

// =============================================================================
// TESTS
// =============================================================================
