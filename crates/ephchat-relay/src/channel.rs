//! Live channel abstraction and the per-connection session loop

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

use ephchat_core::{ClientEvent, Identity, LiveEvent};

use crate::registry::ConnectionRegistry;

/// Live channel failures
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Remote side is gone
    #[error("Channel closed")]
    Closed,

    /// Transport failure
    #[error("Channel I/O error: {0}")]
    Io(String),

    /// Outbound buffer is full; the remote side stopped reading
    #[error("Channel buffer full")]
    Full,

    /// Inbound frame was not a valid event
    #[error("Malformed frame: {0}")]
    Malformed(String),
}

/// Outbound half of a persistent bidirectional connection
#[async_trait]
pub trait LiveChannel: Send + Sync {
    /// Deliver one event; an error means the connection is unusable
    async fn send(&self, event: &LiveEvent) -> Result<(), ChannelError>;
}

/// Channel backed by a bounded tokio mpsc queue.
///
/// The transport drains the receiver and writes events to the wire. Sends
/// never wait: a full buffer fails the send, so a stalled reader loses its
/// binding instead of blocking the sender.
pub struct MpscChannel {
    tx: mpsc::Sender<LiveEvent>,
}

impl MpscChannel {
    /// Create a channel and the receiver feeding the transport
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<LiveEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl LiveChannel for MpscChannel {
    async fn send(&self, event: &LiveEvent) -> Result<(), ChannelError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::Full,
            TrySendError::Closed(_) => ChannelError::Closed,
        })
    }
}

/// Parse one inbound text frame
pub fn parse_client_frame(frame: &str) -> Result<ClientEvent, ChannelError> {
    serde_json::from_str(frame).map_err(|e| ChannelError::Malformed(e.to_string()))
}

/// Drive one authenticated live connection until it ends.
///
/// Registers `channel` for `identity`, answers pings, ignores unknown
/// events, and stops on end of stream or the first error. On exit only this
/// connection's binding is removed, so a newer connection for the same
/// identity stays registered.
pub async fn run_channel<S>(
    registry: Arc<ConnectionRegistry>,
    identity: Identity,
    channel: Arc<dyn LiveChannel>,
    mut inbound: S,
) -> Result<(), ChannelError>
where
    S: Stream<Item = Result<ClientEvent, ChannelError>> + Unpin,
{
    let connection = registry.register(identity.clone(), Arc::clone(&channel));
    info!(%identity, %connection, "Live channel opened");

    let outcome = loop {
        match inbound.next().await {
            Some(Ok(ClientEvent::Ping)) => {
                if let Err(e) = channel.send(&LiveEvent::Pong).await {
                    break Err(e);
                }
            }
            Some(Ok(ClientEvent::Unknown)) => {
                debug!(%identity, "Ignoring unknown client event");
            }
            Some(Err(e)) => break Err(e),
            None => break Ok(()),
        }
    };

    registry.unregister_connection(&identity, connection);
    match &outcome {
        Ok(()) => info!(%identity, %connection, "Live channel closed"),
        Err(e) => info!(%identity, %connection, "Live channel dropped: {}", e),
    }
    outcome
}
