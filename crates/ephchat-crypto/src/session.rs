//! Session crypto engine for one peer relationship
//!
//! Flow:
//! 1. Both sides create a [`SessionCrypto`] (fresh key pair each).
//! 2. They swap [`SessionCrypto::export_public_key`] output over any side
//!    channel.
//! 3. Each calls [`SessionCrypto::derive_shared_session`] with the other's
//!    key and ends up holding the same [`SessionKey`].
//! 4. Messages are sealed with [`SessionCrypto::encrypt`] and opened with
//!    [`SessionCrypto::decrypt`].
//!
//! Re-deriving with a new peer key replaces the current session outright.
//! Blobs sealed under the previous key no longer open.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::aead::SessionCipher;
use crate::error::{CryptoError, Result};
use crate::kdf::{derive_session_key, SessionKey};
use crate::keys::{KeyPair, PeerPublicKey};

/// Derived key plus the cipher bound to it
pub struct SharedSession {
    peer: PeerPublicKey,
    key: SessionKey,
    cipher: SessionCipher,
}

impl SharedSession {
    /// Public key of the peer this session was derived against
    pub fn peer_public_key(&self) -> &PeerPublicKey {
        &self.peer
    }

    /// The derived symmetric key.
    ///
    /// # Security Warning
    /// Exposes key material. Intended for session comparison in tests and
    /// tooling; prefer [`SharedSession::fingerprint`].
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Non-secret digest of the session key
    pub fn fingerprint(&self) -> String {
        self.key.fingerprint()
    }
}

/// Crypto state for one peer relationship
pub struct SessionCrypto {
    keypair: KeyPair,
    session: Option<SharedSession>,
}

impl SessionCrypto {
    /// Create an engine with a freshly generated key pair
    pub fn new() -> Self {
        Self::with_keypair(KeyPair::generate())
    }

    /// Create an engine around an existing key pair
    pub fn with_keypair(keypair: KeyPair) -> Self {
        Self {
            keypair,
            session: None,
        }
    }

    /// Our public key in raw form
    pub fn public_key(&self) -> PeerPublicKey {
        self.keypair.public_key()
    }

    /// Our public key in base64 wire form
    pub fn export_public_key(&self) -> String {
        self.keypair.public_key().to_base64()
    }

    /// Derive (or replace) the shared session from a base64 peer key
    pub fn derive_shared_session(&mut self, peer_public_key: &str) -> Result<&SharedSession> {
        let peer = PeerPublicKey::from_base64(peer_public_key)?;
        self.derive_with(peer)
    }

    /// Derive (or replace) the shared session from a decoded peer key
    pub fn derive_with(&mut self, peer: PeerPublicKey) -> Result<&SharedSession> {
        let shared = self.keypair.diffie_hellman(&peer)?;
        let key = derive_session_key(&shared)?;
        let cipher = SessionCipher::new(&key);

        Ok(self.session.insert(SharedSession { peer, key, cipher }))
    }

    /// Whether a key exchange has completed
    pub fn is_established(&self) -> bool {
        self.session.is_some()
    }

    /// The current shared session, if any
    pub fn shared_session(&self) -> Option<&SharedSession> {
        self.session.as_ref()
    }

    /// Encrypt a UTF-8 message; returns `nonce || ciphertext || tag`
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        self.established()?.cipher.seal(plaintext.as_bytes())
    }

    /// Decrypt a sealed blob back to text.
    ///
    /// Tag mismatch, truncated input and invalid UTF-8 all collapse into
    /// [`CryptoError::DecryptionFailed`].
    pub fn decrypt(&self, blob: &[u8]) -> Result<String> {
        let plaintext = self.established()?.cipher.open(blob)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }

    /// [`SessionCrypto::encrypt`] with base64 output for transport
    pub fn encrypt_base64(&self, plaintext: &str) -> Result<String> {
        Ok(STANDARD.encode(self.encrypt(plaintext)?))
    }

    /// [`SessionCrypto::decrypt`] from base64 transport form
    pub fn decrypt_base64(&self, encoded: &str) -> Result<String> {
        let session = self.established()?;
        let blob = STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let plaintext = session.cipher.open(&blob)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }

    fn established(&self) -> Result<&SharedSession> {
        self.session.as_ref().ok_or(CryptoError::NoSessionEstablished)
    }
}

impl Default for SessionCrypto {
    fn default() -> Self {
        Self::new()
    }
}
