//! Client-side table of per-peer crypto sessions
//!
//! Each peer gets its own [`SessionCrypto`] with its own key pair. Engines
//! live only in memory, so restarting a client means re-exchanging keys with
//! every peer.

use std::collections::HashMap;
use tracing::debug;

use ephchat_crypto::{CryptoError, SessionCrypto};

use crate::error::Result;
use crate::types::Identity;

/// Per-peer session engines owned by one local identity
pub struct SessionTable {
    local: Identity,
    peers: HashMap<Identity, SessionCrypto>,
}

impl SessionTable {
    /// Create an empty table for `local`
    pub fn new(local: Identity) -> Self {
        Self {
            local,
            peers: HashMap::new(),
        }
    }

    /// The identity owning this table
    pub fn local(&self) -> &Identity {
        &self.local
    }

    /// Our public key for `peer`, creating the engine on first use
    pub fn public_key_for(&mut self, peer: &Identity) -> String {
        self.engine_mut(peer).export_public_key()
    }

    /// Install the peer's public key and return ours for them.
    ///
    /// Calling this again with a new key replaces the session.
    pub fn exchange_keys(&mut self, peer: &Identity, peer_public_key: &str) -> Result<String> {
        let engine = self.engine_mut(peer);
        let fingerprint = engine.derive_shared_session(peer_public_key)?.fingerprint();
        debug!(local = %self.local, %peer, %fingerprint, "Session established");

        Ok(self.peers[peer].export_public_key())
    }

    /// Whether a session with `peer` is ready for use
    pub fn is_established(&self, peer: &Identity) -> bool {
        self.peers.get(peer).map_or(false, SessionCrypto::is_established)
    }

    /// Encrypt for `peer`; output is base64 ready for the relay
    pub fn encrypt_for(&self, peer: &Identity, plaintext: &str) -> Result<String> {
        Ok(self.engine(peer)?.encrypt_base64(plaintext)?)
    }

    /// Decrypt a base64 blob received from `peer`
    pub fn decrypt_from(&self, peer: &Identity, encrypted_content: &str) -> Result<String> {
        Ok(self.engine(peer)?.decrypt_base64(encrypted_content)?)
    }

    /// Drop the session with `peer`
    pub fn forget(&mut self, peer: &Identity) -> bool {
        self.peers.remove(peer).is_some()
    }

    /// Number of peers with an engine
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no engines exist
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn engine(&self, peer: &Identity) -> Result<&SessionCrypto> {
        Ok(self
            .peers
            .get(peer)
            .ok_or(CryptoError::NoSessionEstablished)?)
    }

    fn engine_mut(&mut self, peer: &Identity) -> &mut SessionCrypto {
        self.peers.entry(peer.clone()).or_default()
    }
}
