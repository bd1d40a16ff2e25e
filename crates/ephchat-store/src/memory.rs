//! In-memory message store

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use ephchat_core::{Identity, Message, SharedClock, SystemClock};

use crate::error::Result;
use crate::store::{visibility_cutoff, MessageStore, StoreStats};

#[derive(Default)]
struct Inner {
    /// Insertion order; queries stable-sort by timestamp
    messages: Vec<Message>,
    contacts: HashMap<Identity, BTreeSet<Identity>>,
}

/// In-memory message store (for testing and single-process deployments)
pub struct MemoryMessageStore {
    inner: RwLock<Inner>,
    clock: SharedClock,
    retention: Duration,
}

impl MemoryMessageStore {
    /// Create a store using the system clock
    pub fn new(retention: Duration) -> Self {
        Self::with_clock(retention, Arc::new(SystemClock))
    }

    /// Create a store reading time from `clock`
    pub fn with_clock(retention: Duration, clock: SharedClock) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
            retention,
        }
    }

    fn select<F>(&self, window: Option<Duration>, filter: F) -> Vec<Message>
    where
        F: Fn(&Message) -> bool,
    {
        let cutoff = visibility_cutoff(self.clock.now(), window, self.retention);
        let mut found: Vec<Message> = self
            .inner
            .read()
            .messages
            .iter()
            .filter(|m| m.timestamp >= cutoff && filter(*m))
            .cloned()
            .collect();
        found.sort_by_key(|m| m.timestamp);
        found
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(
        &self,
        sender: &Identity,
        recipient: &Identity,
        encrypted_content: &str,
    ) -> Result<Message> {
        let message = Message::new(
            sender.clone(),
            recipient.clone(),
            encrypted_content,
            self.clock.now(),
        );

        let mut inner = self.inner.write();
        inner.messages.push(message.clone());
        inner
            .contacts
            .entry(sender.clone())
            .or_default()
            .insert(recipient.clone());
        inner
            .contacts
            .entry(recipient.clone())
            .or_default()
            .insert(sender.clone());

        debug!("Stored message {} from {} to {}", message.id, sender, recipient);
        Ok(message)
    }

    async fn query_between(
        &self,
        a: &Identity,
        b: &Identity,
        window: Option<Duration>,
    ) -> Result<Vec<Message>> {
        Ok(self.select(window, |m| m.is_between(a, b)))
    }

    async fn query_for_user(
        &self,
        user: &Identity,
        window: Option<Duration>,
    ) -> Result<Vec<Message>> {
        Ok(self.select(window, |m| m.involves(user)))
    }

    async fn list_contacts(&self, user: &Identity) -> Result<BTreeSet<Identity>> {
        Ok(self
            .inner
            .read()
            .contacts
            .get(user)
            .cloned()
            .unwrap_or_default())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let cutoff = visibility_cutoff(self.clock.now(), None, self.retention);
        let mut inner = self.inner.write();
        let before = inner.messages.len();
        inner.messages.retain(|m| m.timestamp >= cutoff);
        let removed = before - inner.messages.len();

        if removed > 0 {
            info!("Purged {} expired messages", removed);
        }

        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read();
        Ok(StoreStats {
            message_count: inner.messages.len(),
            contact_sets: inner.contacts.len(),
        })
    }
}
