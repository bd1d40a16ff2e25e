//! Message store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use ephchat_core::{Identity, Message};

use crate::error::Result;

/// Storage for relayed messages and contact sets.
///
/// Messages are append-only. A message older than the retention window is
/// never returned, whether or not the sweeper has removed it yet.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message stamped with the server clock and link both
    /// parties as contacts
    async fn append(
        &self,
        sender: &Identity,
        recipient: &Identity,
        encrypted_content: &str,
    ) -> Result<Message>;

    /// Messages exchanged between `a` and `b` within `window`, oldest first.
    ///
    /// `None` means the full retention window; longer windows are clamped.
    async fn query_between(
        &self,
        a: &Identity,
        b: &Identity,
        window: Option<Duration>,
    ) -> Result<Vec<Message>>;

    /// Every message sent or received by `user` within `window`, oldest first
    async fn query_for_user(&self, user: &Identity, window: Option<Duration>)
        -> Result<Vec<Message>>;

    /// Peers `user` has ever exchanged messages with
    async fn list_contacts(&self, user: &Identity) -> Result<BTreeSet<Identity>>;

    /// Physically remove messages past retention; returns how many
    async fn purge_expired(&self) -> Result<usize>;

    /// Get store stats
    async fn stats(&self) -> Result<StoreStats>;
}

/// Store statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Messages currently held, including expired ones not yet swept
    pub message_count: usize,
    /// Identities with a non-empty contact set
    pub contact_sets: usize,
}

/// Oldest timestamp visible for a query.
///
/// The effective window is `window` clamped to `retention`.
pub(crate) fn visibility_cutoff(
    now: DateTime<Utc>,
    window: Option<Duration>,
    retention: Duration,
) -> DateTime<Utc> {
    let window = window.map_or(retention, |w| w.min(retention));
    now - chrono::Duration::milliseconds(window.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff_is_clamped_to_retention() {
        let now = Utc::now();
        let retention = Duration::from_secs(86400);

        assert_eq!(
            visibility_cutoff(now, None, retention),
            now - chrono::Duration::hours(24)
        );
        assert_eq!(
            visibility_cutoff(now, Some(Duration::from_secs(3600)), retention),
            now - chrono::Duration::hours(1)
        );
        assert_eq!(
            visibility_cutoff(now, Some(Duration::from_secs(7 * 86400)), retention),
            now - chrono::Duration::hours(24)
        );
    }
}
