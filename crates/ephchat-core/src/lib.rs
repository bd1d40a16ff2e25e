//! # ephchat Core
//!
//! Shared types for the ephchat relay and its clients.
//!
//! This crate provides:
//! - Normalized user identities
//! - Stored message and live event types
//! - A clock abstraction for expiry logic
//! - The client-side per-peer session table

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod clock;
pub mod error;
pub mod message;
pub mod session;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{Error, Result};
pub use message::{ClientEvent, LiveEvent, Message, MessageId};
pub use session::SessionTable;
pub use types::Identity;

/// Messages older than this are never served (24 hours)
pub const RETENTION_SECS: u64 = 24 * 60 * 60;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, SharedClock, SystemClock};
    pub use crate::error::{Error, Result};
    pub use crate::message::{ClientEvent, LiveEvent, Message, MessageId};
    pub use crate::session::SessionTable;
    pub use crate::types::Identity;
}
