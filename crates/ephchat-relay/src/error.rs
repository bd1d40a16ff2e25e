//! Relay error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Message store failed; fatal to the operation
    #[error("Store error: {0}")]
    Store(#[from] ephchat_store::StoreError),

    /// Missing, invalid or expired credential
    #[error("Unauthorized")]
    Unauthorized,

    /// Blob too large
    #[error("Blob too large: {size} bytes exceeds maximum {max}")]
    BlobTooLarge { size: usize, max: usize },

    /// Malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Core type error (bad identity and the like)
    #[error(transparent)]
    Core(#[from] ephchat_core::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
