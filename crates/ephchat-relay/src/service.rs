//! Send, fetch and authentication flows tying the store, cache and registry
//! together

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use ephchat_core::{Identity, LiveEvent, Message, SharedClock, SystemClock};
use ephchat_store::{MessageStore, StoreStats};

use crate::auth::{token_fingerprint, CredentialVerifier};
use crate::cache::ReadThroughCache;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::registry::ConnectionRegistry;

/// Relay health snapshot
#[derive(Clone, Debug, Serialize)]
pub struct RelayStats {
    /// Store counters
    pub store: StoreStats,
    /// Identities with a live channel
    pub online: usize,
    /// Whether a cache backend is configured
    pub cache_enabled: bool,
}

/// The relay: stores opaque blobs, keeps caches coherent and pushes to
/// online recipients
pub struct RelayService {
    config: RelayConfig,
    store: Arc<dyn MessageStore>,
    cache: ReadThroughCache,
    registry: Arc<ConnectionRegistry>,
    verifier: Arc<dyn CredentialVerifier>,
    clock: SharedClock,
}

impl RelayService {
    /// Create a relay using the system clock
    pub fn new(
        config: RelayConfig,
        store: Arc<dyn MessageStore>,
        cache: ReadThroughCache,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self::with_clock(config, store, cache, verifier, Arc::new(SystemClock))
    }

    /// Create a relay reading time from `clock`
    pub fn with_clock(
        config: RelayConfig,
        store: Arc<dyn MessageStore>,
        cache: ReadThroughCache,
        verifier: Arc<dyn CredentialVerifier>,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            registry: Arc::new(ConnectionRegistry::new()),
            verifier,
            clock,
        }
    }

    /// Open the configured store and cache backends
    pub fn open(config: RelayConfig, verifier: Arc<dyn CredentialVerifier>) -> Result<Self> {
        config.validate().map_err(RelayError::InvalidConfig)?;

        let clock: SharedClock = Arc::new(SystemClock);
        let store = ephchat_store::open_store_with_clock(&config.store, Arc::clone(&clock))?;
        let cache = ReadThroughCache::from_config(&config.cache, Arc::clone(&clock));
        info!(
            backend = ?config.store.backend,
            cache = cache.is_enabled(),
            "Relay opened"
        );

        Ok(Self::with_clock(config, store, cache, verifier, clock))
    }

    /// Relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Underlying message store
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Read-through cache
    pub fn cache(&self) -> &ReadThroughCache {
        &self.cache
    }

    /// Live connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Store a message and notify the recipient if online.
    ///
    /// Persistence completes, then both parties' snapshots are invalidated,
    /// then the push is attempted. A failed push never fails the send.
    #[instrument(skip_all, fields(%sender, %recipient))]
    pub async fn send(
        &self,
        sender: &Identity,
        recipient: &Identity,
        encrypted_content: &str,
    ) -> Result<Message> {
        if encrypted_content.is_empty() {
            return Err(RelayError::InvalidRequest(
                "encrypted_content is empty".to_string(),
            ));
        }
        if encrypted_content.len() > self.config.max_blob_size {
            return Err(RelayError::BlobTooLarge {
                size: encrypted_content.len(),
                max: self.config.max_blob_size,
            });
        }

        let message = self.store.append(sender, recipient, encrypted_content).await?;

        self.cache.invalidate_messages(sender).await;
        self.cache.invalidate_messages(recipient).await;

        let delivered = self
            .registry
            .push(recipient, &LiveEvent::new_message(&message))
            .await;
        debug!(message = %message.id, delivered, "Message relayed");

        Ok(message)
    }

    /// Conversation between `user` and `peer` within the retention window,
    /// oldest first.
    ///
    /// Served from `user`'s cached snapshot when present; otherwise the
    /// store is queried and the snapshot repopulated if non-empty and no
    /// send touched `user` while the query ran.
    #[instrument(skip_all, fields(%user, %peer))]
    pub async fn fetch_conversation(&self, user: &Identity, peer: &Identity) -> Result<Vec<Message>> {
        let cutoff = self.clock.now()
            - chrono::Duration::seconds(self.config.store.retention_secs as i64);

        let snapshot = match self.cache.get_cached_messages(user).await {
            Some(snapshot) => snapshot,
            None => {
                let generation = self.cache.messages_generation(user);
                let recent = self.store.query_for_user(user, None).await?;
                if !recent.is_empty() {
                    self.cache
                        .cache_messages_if_current(user, generation, &recent)
                        .await;
                }
                recent
            }
        };

        Ok(snapshot
            .into_iter()
            .filter(|m| m.timestamp >= cutoff && m.is_between(user, peer))
            .collect())
    }

    /// Peers `user` has exchanged messages with
    pub async fn contacts(&self, user: &Identity) -> Result<BTreeSet<Identity>> {
        Ok(self.store.list_contacts(user).await?)
    }

    /// Resolve a bearer token to its identity.
    ///
    /// Verified tokens are cached for the shorter of their remaining
    /// lifetime and the configured cap.
    pub async fn authenticate(&self, token: &str) -> Result<Identity> {
        if let Some(identity) = self.cache.get_cached_auth(token).await {
            return Ok(identity);
        }

        let credential = match self.verifier.verify(token).await {
            Some(credential) => credential,
            None => {
                debug!(token = %token_fingerprint(token), "Rejected credential");
                return Err(RelayError::Unauthorized);
            }
        };

        let remaining = (credential.expires_at - self.clock.now())
            .to_std()
            .map_err(|_| RelayError::Unauthorized)?;
        if remaining.is_zero() {
            return Err(RelayError::Unauthorized);
        }

        let ttl = remaining.min(self.config.cache.auth_ttl_cap());
        self.cache
            .cache_auth(token, &credential.identity, round_down_to_secs(ttl))
            .await;

        Ok(credential.identity)
    }

    /// Forget the cached verification of `token`
    pub async fn logout(&self, token: &str) {
        self.cache.invalidate_auth(token).await;
        info!(token = %token_fingerprint(token), "Logged out");
    }

    /// Health counters
    pub async fn stats(&self) -> Result<RelayStats> {
        let store = self.store.stats().await.map_err(|e| {
            warn!("Could not read store stats: {}", e);
            e
        })?;

        Ok(RelayStats {
            store,
            online: self.registry.len(),
            cache_enabled: self.cache.is_enabled(),
        })
    }
}

/// Cache TTLs have second granularity; never round up past the credential
fn round_down_to_secs(ttl: Duration) -> Duration {
    Duration::from_secs(ttl.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::HmacTokenVerifier;
    use crate::cache::MemoryCacheBackend;
    use crate::channel::MpscChannel;
    use async_trait::async_trait;
    use chrono::Utc;
    use ephchat_core::ManualClock;
    use ephchat_store::MemoryMessageStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    struct Fixture {
        relay: Arc<RelayService>,
        clock: Arc<ManualClock>,
        verifier: Arc<HmacTokenVerifier>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryMessageStore::with_clock(
            RelayConfig::memory().store.retention(),
            clock.clone(),
        ));
        fixture_with_store(store, clock)
    }

    fn fixture_with_store(store: Arc<dyn MessageStore>, clock: Arc<ManualClock>) -> Fixture {
        let config = RelayConfig::memory();
        let cache = ReadThroughCache::new(
            Some(Arc::new(MemoryCacheBackend::with_clock(clock.clone()))),
            config.cache.message_ttl(),
        );
        let verifier = Arc::new(HmacTokenVerifier::with_clock("secret", clock.clone()));
        let relay = RelayService::with_clock(config, store, cache, verifier.clone(), clock.clone());

        Fixture {
            relay: Arc::new(relay),
            clock,
            verifier,
        }
    }

    /// Memory store whose next `query_for_user` parks after reading until
    /// released
    struct GatedStore {
        inner: MemoryMessageStore,
        armed: AtomicBool,
        reached: Notify,
        release: Notify,
    }

    #[async_trait]
    impl MessageStore for GatedStore {
        async fn append(
            &self,
            sender: &Identity,
            recipient: &Identity,
            encrypted_content: &str,
        ) -> ephchat_store::Result<Message> {
            self.inner.append(sender, recipient, encrypted_content).await
        }

        async fn query_between(
            &self,
            a: &Identity,
            b: &Identity,
            window: Option<Duration>,
        ) -> ephchat_store::Result<Vec<Message>> {
            self.inner.query_between(a, b, window).await
        }

        async fn query_for_user(
            &self,
            user: &Identity,
            window: Option<Duration>,
        ) -> ephchat_store::Result<Vec<Message>> {
            let found = self.inner.query_for_user(user, window).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            Ok(found)
        }

        async fn list_contacts(&self, user: &Identity) -> ephchat_store::Result<BTreeSet<Identity>> {
            self.inner.list_contacts(user).await
        }

        async fn purge_expired(&self) -> ephchat_store::Result<usize> {
            self.inner.purge_expired().await
        }

        async fn stats(&self) -> ephchat_store::Result<StoreStats> {
            self.inner.stats().await
        }
    }

    fn id(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_send_invalidates_both_snapshots() {
        let f = fixture();
        let (alice, bob) = (id("alice"), id("bob"));

        f.relay.send(&alice, &bob, "first").await.unwrap();
        // Populate both snapshots
        f.relay.fetch_conversation(&alice, &bob).await.unwrap();
        f.relay.fetch_conversation(&bob, &alice).await.unwrap();
        assert!(f.relay.cache.get_cached_messages(&alice).await.is_some());
        assert!(f.relay.cache.get_cached_messages(&bob).await.is_some());

        f.relay.send(&alice, &bob, "second").await.unwrap();
        assert!(f.relay.cache.get_cached_messages(&alice).await.is_none());
        assert!(f.relay.cache.get_cached_messages(&bob).await.is_none());

        let convo = f.relay.fetch_conversation(&bob, &alice).await.unwrap();
        let bodies: Vec<_> = convo.iter().map(|m| m.encrypted_content.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_fetch_racing_send_keeps_no_stale_snapshot() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(GatedStore {
            inner: MemoryMessageStore::with_clock(Duration::from_secs(86400), clock.clone()),
            armed: AtomicBool::new(false),
            reached: Notify::new(),
            release: Notify::new(),
        });
        let f = fixture_with_store(store.clone(), clock);
        let (alice, bob) = (id("alice"), id("bob"));

        f.relay.send(&alice, &bob, "first").await.unwrap();

        store.armed.store(true, Ordering::SeqCst);
        let in_flight = tokio::spawn({
            let relay = Arc::clone(&f.relay);
            let (bob, alice) = (bob.clone(), alice.clone());
            async move { relay.fetch_conversation(&bob, &alice).await }
        });

        // The fetch has read the store but not yet written its snapshot
        store.reached.notified().await;
        f.relay.send(&alice, &bob, "second").await.unwrap();
        store.release.notify_one();

        assert_eq!(in_flight.await.unwrap().unwrap().len(), 1);
        assert!(f.relay.cache.get_cached_messages(&bob).await.is_none());

        let convo = f.relay.fetch_conversation(&bob, &alice).await.unwrap();
        let bodies: Vec<_> = convo.iter().map(|m| m.encrypted_content.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_fetch_filters_snapshot_by_peer() {
        let f = fixture();
        let (alice, bob, carol) = (id("alice"), id("bob"), id("carol"));

        f.relay.send(&alice, &bob, "to bob").await.unwrap();
        f.relay.send(&carol, &alice, "from carol").await.unwrap();

        let with_bob = f.relay.fetch_conversation(&alice, &bob).await.unwrap();
        assert_eq!(with_bob.len(), 1);
        // Served from the snapshot this time
        let with_carol = f.relay.fetch_conversation(&alice, &carol).await.unwrap();
        assert_eq!(with_carol.len(), 1);
        assert_eq!(with_carol[0].encrypted_content, "from carol");
    }

    #[tokio::test]
    async fn test_empty_result_is_not_cached() {
        let f = fixture();
        let (alice, bob) = (id("alice"), id("bob"));

        assert!(f.relay.fetch_conversation(&alice, &bob).await.unwrap().is_empty());
        assert!(f.relay.cache.get_cached_messages(&alice).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_snapshot_never_returns_expired() {
        let f = fixture();
        let (alice, bob) = (id("alice"), id("bob"));

        f.relay.send(&alice, &bob, "old").await.unwrap();
        f.clock.advance(chrono::Duration::hours(24) - chrono::Duration::seconds(10));
        f.relay.fetch_conversation(&alice, &bob).await.unwrap();
        f.clock.advance(chrono::Duration::seconds(20));

        assert!(f.relay.cache.get_cached_messages(&alice).await.is_some());
        assert!(f.relay.fetch_conversation(&alice, &bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_pushes_to_online_recipient() {
        let f = fixture();
        let (alice, bob) = (id("alice"), id("bob"));
        let (channel, mut events) = MpscChannel::new(4);
        f.relay.registry().register(bob.clone(), Arc::new(channel));

        let stored = f.relay.send(&alice, &bob, "blob").await.unwrap();
        assert_eq!(events.recv().await, Some(LiveEvent::new_message(&stored)));
    }

    #[tokio::test]
    async fn test_failed_push_does_not_fail_send() {
        let f = fixture();
        let (alice, bob) = (id("alice"), id("bob"));
        let (channel, events) = MpscChannel::new(4);
        f.relay.registry().register(bob.clone(), Arc::new(channel));
        drop(events);

        assert!(f.relay.send(&alice, &bob, "blob").await.is_ok());
        assert!(!f.relay.registry().is_online(&bob));
        assert_eq!(f.relay.fetch_conversation(&bob, &alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stalled_recipient_does_not_block_send() {
        let f = fixture();
        let (alice, bob) = (id("alice"), id("bob"));
        let (channel, _events) = MpscChannel::new(1);
        f.relay.registry().register(bob.clone(), Arc::new(channel));

        f.relay.send(&alice, &bob, "first").await.unwrap();
        let second = tokio::time::timeout(
            Duration::from_secs(2),
            f.relay.send(&alice, &bob, "second"),
        )
        .await
        .expect("send must not wait on a stalled channel");

        assert!(second.is_ok());
        assert!(!f.relay.registry().is_online(&bob));
        assert_eq!(f.relay.fetch_conversation(&bob, &alice).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_send_rejects_bad_blobs() {
        let f = fixture();
        let (alice, bob) = (id("alice"), id("bob"));

        assert!(matches!(
            f.relay.send(&alice, &bob, "").await,
            Err(RelayError::InvalidRequest(_))
        ));
        let huge = "A".repeat(f.relay.config().max_blob_size + 1);
        assert!(matches!(
            f.relay.send(&alice, &bob, &huge).await,
            Err(RelayError::BlobTooLarge { .. })
        ));
        assert_eq!(f.relay.stats().await.unwrap().store.message_count, 0);
    }

    #[tokio::test]
    async fn test_contacts_after_send() {
        let f = fixture();
        let (alice, bob) = (id("alice"), id("bob"));
        f.relay.send(&alice, &bob, "hi").await.unwrap();

        assert!(f.relay.contacts(&alice).await.unwrap().contains(&bob));
        assert!(f.relay.contacts(&bob).await.unwrap().contains(&alice));
    }

    #[tokio::test]
    async fn test_authenticate_caches_within_remaining_lifetime() {
        let f = fixture();
        let alice = id("alice");
        let token = f.verifier.issue(&alice, Duration::from_secs(120));

        assert_eq!(f.relay.authenticate(&token).await.unwrap(), alice);
        assert_eq!(f.relay.cache.get_cached_auth(&token).await, Some(alice.clone()));

        // Cached entry must not outlive the token itself
        f.clock.advance(chrono::Duration::seconds(121));
        assert!(f.relay.cache.get_cached_auth(&token).await.is_none());
        assert!(matches!(
            f.relay.authenticate(&token).await,
            Err(RelayError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_garbage_and_logout_clears_cache() {
        let f = fixture();
        assert!(matches!(
            f.relay.authenticate("nope").await,
            Err(RelayError::Unauthorized)
        ));

        let token = f.verifier.issue(&id("alice"), Duration::from_secs(3600));
        f.relay.authenticate(&token).await.unwrap();
        f.relay.logout(&token).await;
        assert!(f.relay.cache.get_cached_auth(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_open_from_config() {
        let verifier = Arc::new(HmacTokenVerifier::new("secret"));
        let relay = RelayService::open(RelayConfig::memory(), verifier).unwrap();
        assert!(relay.stats().await.unwrap().cache_enabled);

        let mut config = RelayConfig::memory();
        config.max_blob_size = 0;
        let verifier = Arc::new(HmacTokenVerifier::new("secret"));
        assert!(matches!(
            RelayService::open(config, verifier),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_stats() {
        let f = fixture();
        f.relay.send(&id("alice"), &id("bob"), "x").await.unwrap();

        let stats = f.relay.stats().await.unwrap();
        assert_eq!(stats.store.message_count, 1);
        assert_eq!(stats.online, 0);
        assert!(stats.cache_enabled);
    }
}
