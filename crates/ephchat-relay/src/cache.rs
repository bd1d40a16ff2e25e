//! Read-through cache in front of the message store and credential checks
//!
//! Two kinds of entries live in the backend:
//! - `messages:{user}`: JSON snapshot of a user's recent messages (all
//!   peers). Deleted, never updated, when a message touching the user is
//!   stored.
//! - `auth:{sha256(token)}`: the identity a verified token belongs to.
//!
//! A fetch that misses reads the store and writes the snapshot back. To keep
//! a write that lands in between from being masked, every invalidation bumps
//! a per-user generation, and a snapshot read under an older generation is
//! never kept.
//!
//! The cache is strictly best-effort. With no backend configured, or when
//! the backend errors, every read is a miss and every write is dropped after
//! a warning.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ephchat_core::{Identity, Message, SharedClock, SystemClock};

use crate::auth::token_fingerprint;
use crate::config::CacheConfig;

/// Cache backend failure
#[derive(Debug, Error)]
#[error("Cache backend unavailable: {0}")]
pub struct CacheError(pub String);

/// Key-value store with per-entry expiry
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a live entry
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write an entry that expires after `ttl`
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove an entry if present
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Evict every expired entry; returns how many were removed.
    ///
    /// Backends that expire entries on their own keep the default.
    async fn purge_expired(&self) -> Result<usize, CacheError> {
        Ok(0)
    }
}

/// In-process cache backend
pub struct MemoryCacheBackend {
    entries: DashMap<String, (Vec<u8>, DateTime<Utc>)>,
    clock: SharedClock,
}

impl MemoryCacheBackend {
    /// Create a backend using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a backend reading time from `clock`
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the backend holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = self.clock.now();
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.0.clone(), entry.1));

        match hit {
            Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
            Some(_) => {
                self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::milliseconds(ttl.as_millis() as i64);
        self.entries
            .insert(key.to_string(), (value, self.clock.now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, (_, expires_at)| {
            let live = *expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        Ok(removed)
    }
}

/// Best-effort cache for message snapshots and verified credentials
#[derive(Clone)]
pub struct ReadThroughCache {
    backend: Option<Arc<dyn CacheBackend>>,
    message_ttl: Duration,
    generations: Arc<DashMap<Identity, u64>>,
}

impl ReadThroughCache {
    /// Wrap an optional backend
    pub fn new(backend: Option<Arc<dyn CacheBackend>>, message_ttl: Duration) -> Self {
        Self {
            backend,
            message_ttl,
            generations: Arc::new(DashMap::new()),
        }
    }

    /// Cache that always misses
    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    /// Build from configuration with an in-process backend when enabled
    pub fn from_config(config: &CacheConfig, clock: SharedClock) -> Self {
        let backend: Option<Arc<dyn CacheBackend>> = if config.enabled {
            Some(Arc::new(MemoryCacheBackend::with_clock(clock)))
        } else {
            None
        };
        Self::new(backend, config.message_ttl())
    }

    /// Whether a backend is configured
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Snapshot of `user`'s recent messages, if cached
    pub async fn get_cached_messages(&self, user: &Identity) -> Option<Vec<Message>> {
        let bytes = self.get(&Self::messages_key(user)).await?;
        match serde_json::from_slice(&bytes) {
            Ok(messages) => {
                debug!("Cache hit for messages of {}", user);
                Some(messages)
            }
            Err(e) => {
                warn!("Discarding unreadable message snapshot for {}: {}", user, e);
                None
            }
        }
    }

    /// Store a snapshot of `user`'s recent messages; `None` uses the
    /// configured TTL
    pub async fn cache_messages(&self, user: &Identity, messages: &[Message], ttl: Option<Duration>) {
        let bytes = match serde_json::to_vec(messages) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not encode message snapshot for {}: {}", user, e);
                return;
            }
        };
        self.set(&Self::messages_key(user), bytes, ttl.unwrap_or(self.message_ttl))
            .await;
    }

    /// Snapshot generation of `user`; read it before querying the store and
    /// hand it to [`ReadThroughCache::cache_messages_if_current`]
    pub fn messages_generation(&self, user: &Identity) -> u64 {
        self.generations.get(user).map_or(0, |generation| *generation)
    }

    /// Store a snapshot read at `generation` unless `user` has been
    /// invalidated since. Returns whether the snapshot was kept.
    pub async fn cache_messages_if_current(
        &self,
        user: &Identity,
        generation: u64,
        messages: &[Message],
    ) -> bool {
        if self.backend.is_none() {
            return false;
        }
        if self.messages_generation(user) != generation {
            debug!("Skipping outdated snapshot for {}", user);
            return false;
        }

        self.cache_messages(user, messages, None).await;

        // An invalidation that raced the write above must win
        if self.messages_generation(user) != generation {
            debug!("Snapshot for {} invalidated while caching", user);
            self.delete(&Self::messages_key(user)).await;
            return false;
        }
        true
    }

    /// Drop `user`'s snapshot
    pub async fn invalidate_messages(&self, user: &Identity) {
        if self.backend.is_none() {
            return;
        }
        *self.generations.entry(user.clone()).or_insert(0) += 1;
        self.delete(&Self::messages_key(user)).await;
    }

    /// Identity a previously verified token belongs to
    pub async fn get_cached_auth(&self, token: &str) -> Option<Identity> {
        let bytes = self.get(&Self::auth_key(token)).await?;
        let identity = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|raw| Identity::parse(raw).ok());

        if identity.is_none() {
            warn!("Discarding unreadable auth entry {}", token_fingerprint(token));
        }
        identity
    }

    /// Remember a verified token for at most `ttl`
    pub async fn cache_auth(&self, token: &str, identity: &Identity, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.set(&Self::auth_key(token), identity.as_str().as_bytes().to_vec(), ttl)
            .await;
    }

    /// Forget a token
    pub async fn invalidate_auth(&self, token: &str) {
        self.delete(&Self::auth_key(token)).await;
    }

    fn messages_key(user: &Identity) -> String {
        format!("messages:{}", user)
    }

    fn auth_key(token: &str) -> String {
        format!("auth:{}", hex::encode(Sha256::digest(token.as_bytes())))
    }

    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let backend = self.backend.as_ref()?;
        match backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache read failed, treating as miss: {}", e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if let Err(e) = backend.set_ex(key, value, ttl).await {
            warn!("Cache write failed: {}", e);
        }
    }

    async fn delete(&self, key: &str) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if let Err(e) = backend.delete(key).await {
            warn!("Cache invalidation failed: {}", e);
        }
    }

    /// Evict expired entries from the backend; failures count as nothing
    /// removed
    pub async fn purge_expired(&self) -> usize {
        let Some(backend) = self.backend.as_ref() else {
            return 0;
        };
        match backend.purge_expired().await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Cache eviction failed: {}", e);
                0
            }
        }
    }
}

/// Background task evicting expired cache entries.
///
/// Reads already ignore expired entries; the sweep only bounds how long
/// they occupy memory.
pub struct CacheSweeper {
    cache: ReadThroughCache,
    interval: Duration,
}

impl CacheSweeper {
    /// Create a sweeper over `cache`
    pub fn new(cache: ReadThroughCache, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Run a single sweep
    pub async fn sweep_once(&self) -> usize {
        self.cache.purge_expired().await
    }

    /// Start sweeping on a fixed interval until the handle is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        info!("Starting cache sweeper every {:?}", self.interval);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);

            loop {
                interval.tick().await;

                let removed = self.sweep_once().await;
                if removed > 0 {
                    debug!("Cache sweep evicted {} entries", removed);
                }
            }
        })
    }
}
