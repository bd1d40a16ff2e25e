//! X25519 key material for the session key exchange
//!
//! Key pairs are ephemeral: generated fresh per process, held only in
//! memory and never serialized. Public keys travel between peers as 32 raw
//! bytes wrapped in standard base64.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};

/// Size of X25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// An ephemeral X25519 key pair.
///
/// The secret half never leaves this struct. A single pair may be used for
/// several exchanges (one per re-derivation) within its owner's lifetime.
pub struct KeyPair {
    secret: X25519StaticSecret,
    public: X25519PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair from the OS RNG
    pub fn generate() -> Self {
        let secret = X25519StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Our public key
    pub fn public_key(&self) -> PeerPublicKey {
        PeerPublicKey(*self.public.as_bytes())
    }

    /// Perform the X25519 exchange against a peer key.
    ///
    /// Rejects low-order peer points, which would produce an all-zero
    /// (non-contributory) secret known to anyone.
    pub fn diffie_hellman(&self, peer: &PeerPublicKey) -> Result<SharedSecret> {
        let their_key = X25519PublicKey::from(peer.0);
        let shared = self.secret.diffie_hellman(&their_key);
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPeerKey(
                "low-order point produces a non-contributory secret".to_string(),
            ));
        }
        Ok(SharedSecret(*shared.as_bytes()))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Raw X25519 public key as transported between peers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerPublicKey([u8; PUBLIC_KEY_SIZE]);

impl PeerPublicKey {
    /// Wrap raw bytes
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Decode from a byte slice of exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPeerKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }

    /// Decode from the base64 wire form
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidPeerKey(format!("invalid base64: {}", e)))?;
        Self::from_slice(&bytes)
    }

    /// Encode to the base64 wire form
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

/// Raw X25519 output, zeroized on drop. Only ever fed into the KDF.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Secret bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}
