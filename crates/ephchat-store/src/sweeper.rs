//! Periodic expiry sweep

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::store::MessageStore;

/// Background task that physically removes expired messages.
///
/// Queries already hide expired messages, so the sweep interval only bounds
/// how long dead records occupy storage.
pub struct ExpirySweeper {
    store: Arc<dyn MessageStore>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Create a sweeper over `store`
    pub fn new(store: Arc<dyn MessageStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run a single sweep
    pub async fn sweep_once(&self) -> Result<usize> {
        self.store.purge_expired().await
    }

    /// Start sweeping on a fixed interval until the handle is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        info!("Starting expiry sweeper every {:?}", self.interval);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);

            loop {
                interval.tick().await;

                match self.sweep_once().await {
                    Ok(count) if count > 0 => {
                        debug!("Sweep removed {} messages", count);
                    }
                    Err(e) => {
                        error!("Expiry sweep failed: {}", e);
                    }
                    _ => {}
                }
            }
        })
    }
}
