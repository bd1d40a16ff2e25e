//! Store configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which message store backend to run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory, lost on restart
    Memory,
    /// Sled database on disk
    Sled,
}

/// Message store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Retention window in seconds
    pub retention_secs: u64,
    /// Expiry sweep interval in seconds
    pub sweep_interval_secs: u64,
    /// Backend selection
    pub backend: StoreBackend,
    /// Database path for the sled backend
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_secs: crate::DEFAULT_RETENTION_SECS,
            sweep_interval_secs: 60,
            backend: StoreBackend::Sled,
            path: "./data/messages".to_string(),
        }
    }
}

impl StoreConfig {
    /// In-memory configuration with default timings
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            ..Default::default()
        }
    }

    /// Get retention window as Duration
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.retention_secs == 0 {
            return Err("retention_secs must be > 0".to_string());
        }
        if self.retention_secs > crate::DEFAULT_RETENTION_SECS {
            return Err("retention_secs must not exceed 24 hours".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be > 0".to_string());
        }
        if self.backend == StoreBackend::Sled && self.path.is_empty() {
            return Err("path is required for the sled backend".to_string());
        }
        Ok(())
    }
}
