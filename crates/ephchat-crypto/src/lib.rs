//! # ephchat Cryptographic Library
//!
//! Session crypto engine for the ephchat blind relay. Every peer pair runs
//! its own X25519 exchange; the relay only ever sees sealed blobs.
//!
//! ## Construction
//!
//! - X25519 key agreement over ephemeral, in-memory key pairs
//! - HKDF-SHA256 with a fixed domain-separation context
//! - ChaCha20-Poly1305 with 96-bit random nonces, no associated data
//!
//! ## Core Components
//!
//! - [`keys`]: key pairs and the public key wire format
//! - [`kdf`]: session key derivation
//! - [`aead`]: sealing and opening of message blobs
//! - [`session`]: the per-peer engine tying it together

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod session;

pub use error::{CryptoError, Result};
pub use kdf::SessionKey;
pub use keys::{KeyPair, PeerPublicKey};
pub use session::{SessionCrypto, SharedSession};

/// Maximum plaintext size in bytes (64 KB)
pub const MAX_MESSAGE_SIZE: usize = 65536;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aead::{SessionCipher, NONCE_SIZE, TAG_SIZE};
    pub use crate::error::{CryptoError, Result};
    pub use crate::kdf::SessionKey;
    pub use crate::keys::{KeyPair, PeerPublicKey};
    pub use crate::session::{SessionCrypto, SharedSession};
}
