//! Key derivation for pairwise sessions
//!
//! The raw X25519 output is never used as a cipher key directly. It is run
//! through HKDF-SHA256 with no salt and a fixed domain-separation context so
//! both peers land on the same uniform 256-bit key.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};
use crate::keys::SharedSecret;

/// HKDF using SHA-256
pub type HkdfSha256 = Hkdf<Sha256>;

/// Session key size (256 bits)
pub const SESSION_KEY_SIZE: usize = 32;

/// Domain separation strings
pub mod domain {
    /// Pairwise session key
    pub const SESSION_KEY: &[u8] = b"ephchat-e2ee-v1";
    /// Session key fingerprint
    pub const KEY_FINGERPRINT: &[u8] = b"ephchat-fingerprint-v1";
}

/// A derived symmetric key with automatic zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }

    /// Short, non-secret digest of the key.
    ///
    /// Two peers holding the same key print the same fingerprint, which is
    /// how they can compare sessions out of band.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(domain::KEY_FINGERPRINT);
        hasher.update(self.0);
        hex::encode(&hasher.finalize()[..8])
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for SessionKey {}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionKey({})", self.fingerprint())
    }
}

/// Derive the pairwise session key from an X25519 shared secret
pub fn derive_session_key(shared: &SharedSecret) -> Result<SessionKey> {
    let hkdf = HkdfSha256::new(None, shared.as_bytes());
    let mut okm = [0u8; SESSION_KEY_SIZE];
    hkdf.expand(domain::SESSION_KEY, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expansion failed".to_string()))?;
    Ok(SessionKey(okm))
}

/// Constant-time comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
