//! Stored messages and the live delivery wire events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::Identity;

/// Unique message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new random message ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A relayed message.
///
/// `encrypted_content` is the base64 form of a sealed blob. The relay never
/// inspects or decodes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Sender identity
    pub sender: Identity,
    /// Recipient identity
    pub recipient: Identity,
    /// Opaque ciphertext in transport encoding
    pub encrypted_content: String,
    /// Server-assigned creation time
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the given time
    pub fn new(
        sender: Identity,
        recipient: Identity,
        encrypted_content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            recipient,
            encrypted_content: encrypted_content.into(),
            timestamp,
        }
    }

    /// Whether this message belongs to the conversation between `a` and `b`
    pub fn is_between(&self, a: &Identity, b: &Identity) -> bool {
        (&self.sender == a && &self.recipient == b) || (&self.sender == b && &self.recipient == a)
    }

    /// Whether `user` sent or received this message
    pub fn involves(&self, user: &Identity) -> bool {
        &self.sender == user || &self.recipient == user
    }
}

/// Server-to-client event on a live channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// A message addressed to the channel owner was stored
    NewMessage {
        /// Who sent it
        sender: Identity,
        /// Opaque ciphertext in transport encoding
        encrypted_content: String,
        /// Server-assigned creation time
        timestamp: DateTime<Utc>,
    },
    /// Reply to a client ping
    Pong,
}

impl LiveEvent {
    /// Notification event for a freshly stored message
    pub fn new_message(message: &Message) -> Self {
        LiveEvent::NewMessage {
            sender: message.sender.clone(),
            encrypted_content: message.encrypted_content.clone(),
            timestamp: message.timestamp,
        }
    }
}

/// Client-to-server frame on a live channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Keepalive; answered with [`LiveEvent::Pong`]
    Ping,
    /// Anything else, ignored
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    #[test]
    fn test_is_between_both_directions() {
        let msg = Message::new(id("alice"), id("bob"), "blob", Utc::now());
        assert!(msg.is_between(&id("alice"), &id("bob")));
        assert!(msg.is_between(&id("bob"), &id("alice")));
        assert!(!msg.is_between(&id("alice"), &id("carol")));
        assert!(msg.involves(&id("bob")));
        assert!(!msg.involves(&id("carol")));
    }

    #[test]
    fn test_new_message_event_wire_format() {
        let msg = Message::new(id("alice"), id("bob"), "Zm9v", Utc::now());
        let json = serde_json::to_value(LiveEvent::new_message(&msg)).unwrap();

        assert_eq!(json["type"], "new_message");
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["encrypted_content"], "Zm9v");
        assert!(json["timestamp"].is_string());
        assert!(json.get("recipient").is_none());
    }

    #[test]
    fn test_pong_wire_format() {
        let json = serde_json::to_string(&LiveEvent::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_client_event_parsing() {
        let ping: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, ClientEvent::Ping);

        let other: ClientEvent = serde_json::from_str(r#"{"type":"typing"}"#).unwrap();
        assert_eq!(other, ClientEvent::Unknown);

        assert!(serde_json::from_str::<ClientEvent>("not json").is_err());
    }

    #[test]
    fn test_message_snapshot_roundtrip_keeps_timestamp() {
        let msg = Message::new(id("alice"), id("bob"), "blob", Utc::now());
        let json = serde_json::to_string(&vec![msg.clone()]).unwrap();
        let back: Vec<Message> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![msg]);
    }
}
