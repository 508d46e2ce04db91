//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("unsupported scheme: {0} (only http and https are allowed)")]
    UnsupportedScheme(String),

    #[error("invalid {kind} pair: {reason}")]
    InvalidKeyValue { kind: &'static str, reason: String },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
