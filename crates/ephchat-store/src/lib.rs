//! # ephchat Store
//!
//! Ephemeral message store for the ephchat relay.
//!
//! ## Features
//!
//! - **Append-Only**: messages are immutable once stored
//! - **Time-Based Expiry**: nothing older than the retention window is
//!   served, and a background sweep removes it physically
//! - **Contact Sets**: every append links sender and recipient
//! - **Backends**: in-memory and sled

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod memory;
pub mod sled_store;
pub mod store;
pub mod sweeper;

use std::sync::Arc;

use ephchat_core::{SharedClock, SystemClock};

pub use config::{StoreBackend, StoreConfig};
pub use error::{Result, StoreError};
pub use memory::MemoryMessageStore;
pub use sled_store::SledMessageStore;
pub use store::{MessageStore, StoreStats};
pub use sweeper::ExpirySweeper;

/// Default retention window in seconds (24 hours)
pub const DEFAULT_RETENTION_SECS: u64 = ephchat_core::RETENTION_SECS;

/// Open the backend selected by `config`
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn MessageStore>> {
    open_store_with_clock(config, Arc::new(SystemClock))
}

/// Open the backend selected by `config`, reading time from `clock`
pub fn open_store_with_clock(
    config: &StoreConfig,
    clock: SharedClock,
) -> Result<Arc<dyn MessageStore>> {
    config.validate().map_err(StoreError::InvalidConfig)?;

    Ok(match config.backend {
        StoreBackend::Memory => Arc::new(MemoryMessageStore::with_clock(config.retention(), clock)),
        StoreBackend::Sled => Arc::new(SledMessageStore::open_with_clock(
            &config.path,
            config.retention(),
            clock,
        )?),
    })
}
