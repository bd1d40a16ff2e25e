//! Sled-backed persistent message store
//!
//! Layout (one tree each):
//! - `messages`: `time_key` -> bincode [`Message`]. Time-ordered, so the
//!   sweeper scans a prefix range instead of the whole store.
//! - `pairs`: `lo \0 hi \0 time_key` -> `time_key`, with the two identities
//!   sorted so both directions share one index range.
//! - `users`: `user \0 time_key` -> `time_key`, one entry per party.
//! - `contacts`: `user \0 peer` -> empty.
//!
//! `time_key` is the big-endian timestamp in microseconds (sign bit flipped)
//! followed by a big-endian sequence number from [`sled::Db::generate_id`],
//! which orders same-instant appends by insertion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use sled::transaction::{TransactionError, TransactionResult};
use sled::Transactional;

use ephchat_core::{Identity, Message, SharedClock, SystemClock};

use crate::error::{Result, StoreError};
use crate::store::{visibility_cutoff, MessageStore, StoreStats};

const TIME_KEY_LEN: usize = 16;
const SEP: u8 = 0;

/// Sled-based persistent message store
pub struct SledMessageStore {
    db: sled::Db,
    messages: sled::Tree,
    pairs: sled::Tree,
    users: sled::Tree,
    contacts: sled::Tree,
    clock: SharedClock,
    retention: Duration,
}

impl SledMessageStore {
    /// Open or create a store at path
    pub fn open(path: impl AsRef<Path>, retention: Duration) -> Result<Self> {
        Self::open_with_clock(path, retention, Arc::new(SystemClock))
    }

    /// Open or create a store reading time from `clock`
    pub fn open_with_clock(
        path: impl AsRef<Path>,
        retention: Duration,
        clock: SharedClock,
    ) -> Result<Self> {
        let db = sled::open(path)?;

        Ok(Self {
            messages: db.open_tree("messages")?,
            pairs: db.open_tree("pairs")?,
            users: db.open_tree("users")?,
            contacts: db.open_tree("contacts")?,
            db,
            clock,
            retention,
        })
    }

    fn time_prefix(ts: DateTime<Utc>) -> [u8; 8] {
        ((ts.timestamp_micros() as u64) ^ (1 << 63)).to_be_bytes()
    }

    fn time_key(ts: DateTime<Utc>, seq: u64) -> [u8; TIME_KEY_LEN] {
        let mut key = [0u8; TIME_KEY_LEN];
        key[..8].copy_from_slice(&Self::time_prefix(ts));
        key[8..].copy_from_slice(&seq.to_be_bytes());
        key
    }

    fn pair_prefix(a: &Identity, b: &Identity) -> Vec<u8> {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut prefix = Vec::with_capacity(lo.as_str().len() + hi.as_str().len() + 2);
        prefix.extend_from_slice(lo.as_str().as_bytes());
        prefix.push(SEP);
        prefix.extend_from_slice(hi.as_str().as_bytes());
        prefix.push(SEP);
        prefix
    }

    fn user_prefix(user: &Identity) -> Vec<u8> {
        let mut prefix = user.as_str().as_bytes().to_vec();
        prefix.push(SEP);
        prefix
    }

    fn join(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(prefix.len() + suffix.len());
        key.extend_from_slice(prefix);
        key.extend_from_slice(suffix);
        key
    }

    /// Walk an index range starting at `cutoff` and load the messages it
    /// points to, in index order
    fn scan_index(
        &self,
        index: &sled::Tree,
        prefix: &[u8],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        let start = Self::join(prefix, &Self::time_prefix(cutoff));
        let mut found = Vec::new();

        for entry in index.range(start..) {
            let (key, time_key) = entry?;
            if !key.starts_with(prefix) {
                break;
            }
            match self.messages.get(&time_key)? {
                Some(bytes) => {
                    let message: Message = bincode::deserialize(&bytes)?;
                    if message.timestamp >= cutoff {
                        found.push(message);
                    }
                }
                // Swept between the index read and the message read
                None => continue,
            }
        }

        Ok(found)
    }
}

#[async_trait]
impl MessageStore for SledMessageStore {
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
        let time_key = Self::time_key(message.timestamp, self.db.generate_id()?);
        let bytes = bincode::serialize(&message)?;

        let pair_key = Self::join(&Self::pair_prefix(sender, recipient), &time_key);
        let sender_key = Self::join(&Self::user_prefix(sender), &time_key);
        let recipient_key = Self::join(&Self::user_prefix(recipient), &time_key);
        let sender_contact =
            Self::join(&Self::user_prefix(sender), recipient.as_str().as_bytes());
        let recipient_contact =
            Self::join(&Self::user_prefix(recipient), sender.as_str().as_bytes());

        // The record and all of its index entries land together or not at all
        let trees = (&self.messages, &self.pairs, &self.users, &self.contacts);
        let committed: TransactionResult<()> =
            trees.transaction(|(messages, pairs, users, contacts)| {
                messages.insert(&time_key[..], &bytes[..])?;
                pairs.insert(&pair_key[..], &time_key[..])?;
                users.insert(&sender_key[..], &time_key[..])?;
                users.insert(&recipient_key[..], &time_key[..])?;
                contacts.insert(&sender_contact[..], &b""[..])?;
                contacts.insert(&recipient_contact[..], &b""[..])?;
                Ok(())
            });
        committed.map_err(|e| match e {
            TransactionError::Storage(e) => StoreError::from(e),
            TransactionError::Abort(()) => {
                StoreError::Backend("append transaction aborted".to_string())
            }
        })?;
        self.db.flush_async().await?;

        debug!("Stored message {} from {} to {}", message.id, sender, recipient);
        Ok(message)
    }

    async fn query_between(
        &self,
        a: &Identity,
        b: &Identity,
        window: Option<Duration>,
    ) -> Result<Vec<Message>> {
        let cutoff = visibility_cutoff(self.clock.now(), window, self.retention);
        self.scan_index(&self.pairs, &Self::pair_prefix(a, b), cutoff)
    }

    async fn query_for_user(
        &self,
        user: &Identity,
        window: Option<Duration>,
    ) -> Result<Vec<Message>> {
        let cutoff = visibility_cutoff(self.clock.now(), window, self.retention);
        self.scan_index(&self.users, &Self::user_prefix(user), cutoff)
    }

    async fn list_contacts(&self, user: &Identity) -> Result<BTreeSet<Identity>> {
        let prefix = Self::user_prefix(user);
        let mut contacts = BTreeSet::new();

        for entry in self.contacts.scan_prefix(&prefix) {
            let (key, _) = entry?;
            let peer = std::str::from_utf8(&key[prefix.len()..])
                .map_err(|e| StoreError::Corrupted(e.to_string()))?;
            match Identity::parse(peer) {
                Ok(peer) => {
                    contacts.insert(peer);
                }
                Err(e) => warn!("Skipping unreadable contact of {}: {}", user, e),
            }
        }

        Ok(contacts)
    }

    async fn purge_expired(&self) -> Result<usize> {
        let cutoff = visibility_cutoff(self.clock.now(), None, self.retention);
        let end = Self::time_prefix(cutoff);
        let mut removed = 0;

        for entry in self.messages.range(..&end[..]) {
            let (time_key, bytes) = entry?;
            let message: Message = bincode::deserialize(&bytes)?;

            self.pairs.remove(Self::join(
                &Self::pair_prefix(&message.sender, &message.recipient),
                &time_key,
            ))?;
            self.users
                .remove(Self::join(&Self::user_prefix(&message.sender), &time_key))?;
            self.users
                .remove(Self::join(&Self::user_prefix(&message.recipient), &time_key))?;
            self.messages.remove(&time_key)?;
            removed += 1;
        }

        if removed > 0 {
            self.db.flush_async().await?;
            info!("Purged {} expired messages", removed);
        }

        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let mut owners = HashSet::new();
        for entry in self.contacts.iter() {
            let (key, _) = entry?;
            if let Some(end) = key.iter().position(|&b| b == SEP) {
                owners.insert(key[..end].to_vec());
            }
        }

        Ok(StoreStats {
            message_count: self.messages.len(),
            contact_sets: owners.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephchat_core::ManualClock;

    const DAY: Duration = Duration::from_secs(86400);

    fn id(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    fn open(dir: &tempfile::TempDir) -> (SledMessageStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = SledMessageStore::open_with_clock(dir.path(), DAY, clock.clone()).unwrap();
        (store, clock)
    }

    #[tokio::test]
    async fn test_sled_query_between_is_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let (store, clock) = open(&dir);
        let (alice, bob, carol) = (id("alice"), id("bob"), id("carol"));

        store.append(&alice, &bob, "m1").await.unwrap();
        store.append(&bob, &alice, "m2").await.unwrap();
        clock.advance(chrono::Duration::seconds(5));
        store.append(&alice, &bob, "m3").await.unwrap();
        store.append(&alice, &carol, "other").await.unwrap();

        let convo = store.query_between(&bob, &alice, None).await.unwrap();
        let bodies: Vec<_> = convo.iter().map(|m| m.encrypted_content.as_str()).collect();
        assert_eq!(bodies, vec!["m1", "m2", "m3"]);

        let mine = store.query_for_user(&alice, None).await.unwrap();
        assert_eq!(mine.len(), 4);
        assert_eq!(store.query_for_user(&carol, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sled_append_writes_every_tree() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _clock) = open(&dir);
        let (alice, bob) = (id("alice"), id("bob"));

        store.append(&alice, &bob, "x").await.unwrap();
        assert_eq!(store.messages.len(), 1);
        assert_eq!(store.pairs.len(), 1);
        assert_eq!(store.users.len(), 2);
        assert_eq!(store.contacts.len(), 2);

        // Self-addressed: one user index entry, one contact entry
        store.append(&alice, &alice, "note").await.unwrap();
        assert_eq!(store.messages.len(), 2);
        assert_eq!(store.users.len(), 3);
        assert_eq!(store.contacts.len(), 3);
        assert_eq!(store.query_between(&alice, &alice, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sled_contacts() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _clock) = open(&dir);
        let (alice, bob, carol) = (id("alice"), id("bob"), id("carol"));

        store.append(&alice, &bob, "x").await.unwrap();
        store.append(&carol, &alice, "y").await.unwrap();

        let contacts = store.list_contacts(&alice).await.unwrap();
        assert_eq!(contacts.into_iter().collect::<Vec<_>>(), vec![bob.clone(), carol]);
        assert!(store.list_contacts(&bob).await.unwrap().contains(&alice));
        assert!(store.list_contacts(&id("nobody")).await.unwrap().is_empty());

        // "ali" must not pick up alice's contacts through the prefix scan
        assert!(store.list_contacts(&id("ali")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sled_expiry_and_purge() {
        let dir = tempfile::tempdir().unwrap();
        let (store, clock) = open(&dir);
        let (alice, bob) = (id("alice"), id("bob"));

        store.append(&alice, &bob, "stale").await.unwrap();
        clock.advance(chrono::Duration::hours(23));
        store.append(&alice, &bob, "fresh").await.unwrap();
        clock.advance(chrono::Duration::hours(2));

        let convo = store.query_between(&alice, &bob, None).await.unwrap();
        assert_eq!(convo.len(), 1);
        assert_eq!(convo[0].encrypted_content, "fresh");

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.contact_sets, 2);
        assert_eq!(store.query_for_user(&bob, None).await.unwrap().len(), 1);
    }
}
