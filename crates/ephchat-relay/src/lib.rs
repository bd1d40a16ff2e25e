//! # ephchat Relay
//!
//! Blind relay pipeline for ephchat. The relay stores and forwards opaque
//! ciphertext; key exchange and decryption happen only on clients.
//!
//! ## Features
//!
//! - **Send Flow**: persist, invalidate both parties' caches, then push
//! - **Read-Through Cache**: per-user message snapshots and verified tokens,
//!   degrading to a miss whenever the backend is unavailable
//! - **Live Delivery**: at most one channel per identity with drop-on-failure
//!   pushes and ping/pong keepalive
//! - **Token Auth**: pluggable verifier with an HMAC-SHA256 implementation

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod auth;
pub mod cache;
pub mod channel;
pub mod config;
pub mod error;
pub mod registry;
pub mod service;

pub use auth::{CredentialVerifier, HmacTokenVerifier, VerifiedCredential};
pub use cache::{CacheBackend, CacheSweeper, MemoryCacheBackend, ReadThroughCache};
pub use channel::{parse_client_frame, run_channel, ChannelError, LiveChannel, MpscChannel};
pub use config::{CacheConfig, RelayConfig};
pub use error::{RelayError, Result};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use service::{RelayService, RelayStats};

use ephchat_crypto::{aead::MIN_BLOB_SIZE, MAX_MESSAGE_SIZE};

/// Largest base64 `encrypted_content` the relay accepts: the encoding of a
/// sealed maximum-size plaintext
pub const MAX_BLOB_SIZE: usize = 4 * ((MAX_MESSAGE_SIZE + MIN_BLOB_SIZE + 2) / 3);
