//! Hushlink Protocol
//!
//! JSON payloads exchanged with the relay over the session channel, and the
//! JSON records persisted on the device.
//!
//! # Wire format
//!
//! Every payload is a UTF-8 JSON object with a `type` discriminant:
//!
//! | `type` | Direction | Fields |
//! |---|---|---|
//! | `self` | inbound | `name`, `avatar` |
//! | `ephemeral_key` | outbound | `ephemeralPublicKey`, `seq` |
//! | `ephemeral_key` | inbound | outbound fields + `from` (+ `name`, `avatar`) |
//! | `message` | outbound | `text`, `timestamp`, `name`, `avatar` (+ `to`) |
//! | `message` | inbound | outbound fields + `from` |
//!
//! The relay reports rejected input with `{ "error": "..." }` and no `type`,
//! which parses as [`Inbound::Notice`].
//!
//! Keys, nonces and ciphertexts are standard base64. Unknown fields are
//! ignored so the relay can enrich payloads without breaking clients.

#![forbid(unsafe_code)]

pub mod encoding;
pub mod errors;
mod ids;
pub mod message;
pub mod records;

pub use errors::{ProtocolError, Result};
pub use ids::{ParticipantId, SessionId};
pub use message::{
    EphemeralKeyAnnounce, Inbound, InboundMessage, MAX_PAYLOAD_SIZE, OutboundMessage,
    OutgoingChatMessage, PeerChatMessage, PeerEphemeralKey, SelfIdentity, ServerNotice,
};
pub use records::{
    EphemeralKeyRecord, IdentityKeyRecord, IdentityPublication, ephemeral_key_name,
    identity_key_name,
};
