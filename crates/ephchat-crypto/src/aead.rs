//! Authenticated encryption for session messages
//!
//! ChaCha20-Poly1305 with a 256-bit key, 96-bit random nonce and 128-bit
//! tag. The sealed blob layout is `nonce || ciphertext || tag`, with no
//! associated data.

use chacha20poly1305::{
    aead::{Aead as AeadTrait, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;

use crate::error::{CryptoError, Result};
use crate::kdf::SessionKey;
use crate::MAX_MESSAGE_SIZE;

/// Nonce size for ChaCha20-Poly1305 (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits)
pub const TAG_SIZE: usize = 16;

/// Smallest blob that can possibly authenticate (empty plaintext)
pub const MIN_BLOB_SIZE: usize = NONCE_SIZE + TAG_SIZE;

/// Cipher bound to one session key
pub struct SessionCipher {
    cipher: ChaCha20Poly1305,
}

impl SessionCipher {
    /// Bind a cipher to the given key
    pub fn new(key: &SessionKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
        }
    }

    /// Encrypt under a fresh random nonce.
    ///
    /// Nonces come from the thread RNG on every call. With 96-bit nonces the
    /// collision probability is negligible for realistic session volumes.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.len() > MAX_MESSAGE_SIZE {
            return Err(CryptoError::MessageTooLarge {
                size: plaintext.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed("ChaCha20-Poly1305 failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Authenticate and decrypt a sealed blob
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < MIN_BLOB_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}
