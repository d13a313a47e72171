//! Client events and actions.

use hushlink_core::{ChannelError, ParticipantId};
use hushlink_proto::{IdentityPublication, PeerChatMessage};

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Reporting transport lifecycle and inbound text payloads
/// - Driving time forward via ticks
/// - Forwarding application intents (send message, close, teardown)
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation (virtual time) environments.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// Begin the first connection.
    Start,

    /// The transport requested by the last `Connect` is established.
    TransportOpened,

    /// Text payload received from the relay.
    TextReceived {
        /// Raw payload
        text: String,
    },

    /// The transport closed, or failed to connect.
    TransportClosed {
        /// Human readable cause
        reason: String,
    },

    /// Time tick for reconnect back-off and the identity timeout.
    ///
    /// The caller should send ticks periodically; nothing is retried without
    /// them.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Application wants to send a chat message.
    SendMessage {
        /// Message text
        text: String,
        /// Display timestamp. Formatted from the wall clock if `None`.
        timestamp: Option<String>,
    },

    /// Outcome of a `PublishIdentity` action.
    ///
    /// Failure is non-fatal; the caller decides whether to retry.
    IdentityPublished {
        /// `Err` carries the failure description
        result: Result<(), String>,
    },

    /// Close the channel. No reconnect follows.
    Close,

    /// End the session and release every piece of key material.
    Teardown {
        /// Also delete the persisted identity and ephemeral records
        clear_storage: bool,
    },
}

/// A chat message for the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Sending participant
    pub from: ParticipantId,
    /// Message text
    pub text: String,
    /// Display timestamp
    pub timestamp: String,
    /// Sender display name
    pub name: String,
    /// Sender avatar
    pub avatar: String,
    /// Intended recipient, empty for the whole session
    pub to: String,
}

impl From<PeerChatMessage> for ChatMessage {
    fn from(message: PeerChatMessage) -> Self {
        Self {
            from: message.from,
            text: message.text,
            timestamp: message.timestamp,
            name: message.name,
            avatar: message.avatar,
            to: message.to,
        }
    }
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Open a transport to the session address.
    ///
    /// The caller answers with `TransportOpened` or `TransportClosed`.
    Connect {
        /// Path relative to the relay base URL
        url_path: String,
    },

    /// Send a text payload over the open transport.
    Send(String),

    /// Close the current transport.
    Disconnect {
        /// Reason for closing
        reason: String,
    },

    /// Publish the identity public key to the external registry.
    ///
    /// The caller answers with `IdentityPublished`.
    PublishIdentity(IdentityPublication),

    /// Display identity assigned by the relay for this connection.
    SelfIdentity {
        /// Display name
        name: String,
        /// Avatar reference
        avatar: String,
    },

    /// Deliver a peer's message to the message log.
    DeliverMessage(ChatMessage),

    /// Render a message the local participant just sent.
    LocalEcho(ChatMessage),

    /// A shared secret with `peer` was derived for the current key pair.
    SharedSecretEstablished {
        /// Peer the secret is shared with
        peer: ParticipantId,
    },

    /// The relay reported an error.
    ServerNotice {
        /// Relay supplied description
        message: String,
    },

    /// The channel gave up reconnecting.
    ChannelFailed {
        /// Terminal error
        error: ChannelError,
    },
}
