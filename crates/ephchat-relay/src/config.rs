//! Relay configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use ephchat_store::StoreConfig;

/// Read-through cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Run with a cache backend at all
    pub enabled: bool,
    /// Lifetime of a per-user message snapshot
    pub message_ttl_secs: u64,
    /// Upper bound on how long a verified token stays cached
    pub auth_ttl_cap_secs: u64,
    /// How often expired entries are evicted from the in-process backend
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message_ttl_secs: 300,
            auth_ttl_cap_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    /// Get message snapshot TTL as Duration
    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_secs)
    }

    /// Get auth cache cap as Duration
    pub fn auth_ttl_cap(&self) -> Duration {
        Duration::from_secs(self.auth_ttl_cap_secs)
    }

    /// Get eviction interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be > 0".to_string());
        }
        if self.enabled && self.message_ttl_secs == 0 {
            return Err("message_ttl_secs must be > 0".to_string());
        }
        if self.enabled && self.auth_ttl_cap_secs == 0 {
            return Err("auth_ttl_cap_secs must be > 0".to_string());
        }
        Ok(())
    }
}

/// Relay configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Message store settings
    pub store: StoreConfig,
    /// Cache settings
    pub cache: CacheConfig,
    /// Largest accepted `encrypted_content`, in transport-encoded bytes
    pub max_blob_size: usize,
    /// Outbound event buffer per live channel
    pub channel_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            max_blob_size: crate::MAX_BLOB_SIZE,
            channel_buffer: 32,
        }
    }
}

impl RelayConfig {
    /// Defaults with an in-memory store
    pub fn memory() -> Self {
        Self {
            store: StoreConfig::memory(),
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        self.cache.validate()?;
        if self.max_blob_size == 0 {
            return Err("max_blob_size must be > 0".to_string());
        }
        if self.channel_buffer == 0 {
            return Err("channel_buffer must be > 0".to_string());
        }
        Ok(())
    }
}
