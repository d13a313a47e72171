//! Session channel payloads.
//!
//! Inbound and outbound payloads are distinct types: the relay adds `from`
//! (and presentation fields) to everything it fans out, and the client must
//! never be able to claim a sender identity on its own.

use serde::{Deserialize, Serialize};

use crate::{
    ParticipantId,
    encoding::base64_array,
    errors::{ProtocolError, Result},
};

/// Upper bound on a single inbound payload.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Discriminants understood by this client.
const KNOWN_TYPES: [&str; 3] = ["self", "ephemeral_key", "message"];

/// Identity assigned to the local participant for this connection.
///
/// Sent by the relay once per connection, right after it opens. Receiving it
/// is what triggers ephemeral key generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfIdentity {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Avatar reference (URL)
    #[serde(default)]
    pub avatar: String,
}

/// A peer's ephemeral public key as fanned out by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEphemeralKey {
    /// Announcing participant
    pub from: ParticipantId,
    /// X25519 public key
    #[serde(rename = "ephemeralPublicKey", with = "base64_array")]
    pub public_key: [u8; 32],
    /// Announcement sequence number; absent from legacy peers
    #[serde(default)]
    pub seq: u64,
    /// Display name of the announcing participant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Avatar of the announcing participant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A chat message as fanned out by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerChatMessage {
    /// Sending participant
    pub from: ParticipantId,
    /// Message text
    pub text: String,
    /// Display timestamp chosen by the sender
    #[serde(default)]
    pub timestamp: String,
    /// Sender display name
    #[serde(default)]
    pub name: String,
    /// Sender avatar
    #[serde(default)]
    pub avatar: String,
    /// Intended recipient, empty for the whole session
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
}

/// Typed payloads received over the session channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// Local identity assignment
    #[serde(rename = "self")]
    SelfIdentity(SelfIdentity),
    /// A participant's ephemeral public key
    #[serde(rename = "ephemeral_key")]
    EphemeralKey(PeerEphemeralKey),
    /// Application message
    #[serde(rename = "message")]
    Message(PeerChatMessage),
}

/// Error report from the relay (`{ "error": "..." }`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerNotice {
    /// Relay supplied description
    pub message: String,
}

/// Anything the relay may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Typed protocol payload
    Message(InboundMessage),
    /// Relay error notice
    Notice(ServerNotice),
}

impl Inbound {
    /// Parse one inbound text payload.
    ///
    /// Never panics. Anything that is not a known payload or an error notice
    /// is an error the caller logs and drops.
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` if `text` exceeds [`MAX_PAYLOAD_SIZE`]
    /// - `Malformed` if `text` is not JSON or fields are missing/invalid
    /// - `MissingType` if a JSON object has neither `type` nor `error`
    /// - `UnknownType` if `type` is not one of the known discriminants
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: text.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::Malformed { reason: e.to_string() })?;

        let Some(kind) = value.get("type") else {
            return match value.get("error") {
                Some(serde_json::Value::String(message)) => {
                    Ok(Self::Notice(ServerNotice { message: message.clone() }))
                },
                _ => Err(ProtocolError::MissingType),
            };
        };

        let Some(kind) = kind.as_str() else {
            return Err(ProtocolError::Malformed { reason: "type is not a string".to_string() });
        };

        if !KNOWN_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType { kind: kind.to_string() });
        }

        serde_json::from_value(value)
            .map(Self::Message)
            .map_err(|e| ProtocolError::Malformed { reason: e.to_string() })
    }
}

/// Announcement of the local ephemeral public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralKeyAnnounce {
    /// X25519 public key
    #[serde(rename = "ephemeralPublicKey", with = "base64_array")]
    pub public_key: [u8; 32],
    /// Monotonic announcement counter for the session
    pub seq: u64,
}

/// Chat message sent by the local participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingChatMessage {
    /// Message text
    pub text: String,
    /// Display timestamp
    pub timestamp: String,
    /// Local display name
    pub name: String,
    /// Local avatar
    pub avatar: String,
    /// Intended recipient, empty for the whole session
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
}

/// Payloads the client sends over the session channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Ephemeral key announcement
    #[serde(rename = "ephemeral_key")]
    EphemeralKey(EphemeralKeyAnnounce),
    /// Application message
    #[serde(rename = "message")]
    Message(OutgoingChatMessage),
}

impl OutboundMessage {
    /// Encode as a JSON text payload.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode { reason: e.to_string() })
    }
}
