//! Error types for cryptographic operations

use thiserror::Error;

/// Result type alias for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Peer public key could not be decoded or is not usable for X25519
    #[error("Invalid peer key: {0}")]
    InvalidPeerKey(String),

    /// Encrypt/decrypt called before a key exchange completed
    #[error("No session established, exchange keys first")]
    NoSessionEstablished,

    /// Tag mismatch, malformed blob or non UTF-8 plaintext.
    ///
    /// The only correct reaction is to drop the message.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Key derivation failed
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Message too large
    #[error("Message too large: {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },
}

impl CryptoError {
    /// Whether the caller should silently discard the message instead of
    /// surfacing the failure.
    pub fn is_discardable(&self) -> bool {
        matches!(self, CryptoError::DecryptionFailed)
    }
}

impl From<chacha20poly1305::Error> for CryptoError {
    fn from(_: chacha20poly1305::Error) -> Self {
        CryptoError::DecryptionFailed
    }
}
