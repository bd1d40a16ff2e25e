//! Live connection registry
//!
//! At most one channel is bound per identity. Each binding carries a
//! [`ConnectionId`] so a connection that is shutting down (or failed a push)
//! only ever removes itself, never the connection that replaced it.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use ephchat_core::{Identity, LiveEvent};

use crate::channel::LiveChannel;

/// Identifier of one registered connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Binding {
    id: ConnectionId,
    channel: Arc<dyn LiveChannel>,
}

/// Identity -> live channel table shared by request handlers and channel
/// loops
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Identity, Binding>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `channel` to `identity`, superseding any previous binding.
    ///
    /// The superseded channel is not closed; its loop keeps running until
    /// the transport ends it.
    pub fn register(&self, identity: Identity, channel: Arc<dyn LiveChannel>) -> ConnectionId {
        let id = ConnectionId::new();
        if let Some(previous) = self.connections.insert(identity.clone(), Binding { id, channel }) {
            debug!(%identity, replaced = %previous.id, "Superseded live connection");
        }
        id
    }

    /// Remove whatever is bound to `identity`
    pub fn unregister(&self, identity: &Identity) -> bool {
        self.connections.remove(identity).is_some()
    }

    /// Remove the binding for `identity` only if it is still `connection`
    pub fn unregister_connection(&self, identity: &Identity, connection: ConnectionId) -> bool {
        self.connections
            .remove_if(identity, |_, binding| binding.id == connection)
            .is_some()
    }

    /// Deliver `event` to `identity` if online.
    ///
    /// Returns whether delivery succeeded. A failed send drops the binding;
    /// there is no retry and no queue.
    pub async fn push(&self, identity: &Identity, event: &LiveEvent) -> bool {
        let target = self
            .connections
            .get(identity)
            .map(|binding| (binding.id, Arc::clone(&binding.channel)));
        let Some((connection, channel)) = target else {
            return false;
        };

        match channel.send(event).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%identity, %connection, "Live push failed, dropping connection: {}", e);
                self.unregister_connection(identity, connection);
                false
            }
        }
    }

    /// Whether `identity` has a live channel
    pub fn is_online(&self, identity: &Identity) -> bool {
        self.connections.contains_key(identity)
    }

    /// Number of live channels
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no channel is registered
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MpscChannel;

    fn id(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_push_reaches_only_latest_channel() {
        let registry = ConnectionRegistry::new();
        let (c1, mut rx1) = MpscChannel::new(4);
        let (c2, mut rx2) = MpscChannel::new(4);

        registry.register(id("bob"), Arc::new(c1));
        registry.register(id("bob"), Arc::new(c2));
        assert_eq!(registry.len(), 1);

        assert!(registry.push(&id("bob"), &LiveEvent::Pong).await);
        assert_eq!(rx2.recv().await, Some(LiveEvent::Pong));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_push_to_unregistered_is_noop() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.push(&id("nobody"), &LiveEvent::Pong).await);
        assert!(!registry.unregister(&id("nobody")));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failed_push_unregisters() {
        let registry = ConnectionRegistry::new();
        let (channel, rx) = MpscChannel::new(4);
        registry.register(id("bob"), Arc::new(channel));
        drop(rx);

        assert!(!registry.push(&id("bob"), &LiveEvent::Pong).await);
        assert!(!registry.is_online(&id("bob")));
    }

    #[tokio::test]
    async fn test_stalled_reader_loses_binding() {
        let registry = ConnectionRegistry::new();
        let (channel, _rx) = MpscChannel::new(1);
        registry.register(id("bob"), Arc::new(channel));

        assert!(registry.push(&id("bob"), &LiveEvent::Pong).await);
        assert!(!registry.push(&id("bob"), &LiveEvent::Pong).await);
        assert!(!registry.is_online(&id("bob")));
    }

    #[test]
    fn test_stale_connection_cannot_remove_replacement() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = MpscChannel::new(4);
        let (c2, _rx2) = MpscChannel::new(4);

        let old = registry.register(id("bob"), Arc::new(c1));
        let new = registry.register(id("bob"), Arc::new(c2));

        assert!(!registry.unregister_connection(&id("bob"), old));
        assert!(registry.is_online(&id("bob")));
        assert!(registry.unregister_connection(&id("bob"), new));
        assert!(!registry.is_online(&id("bob")));
    }
}
