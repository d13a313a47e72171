//! Records persisted on the device and sent to the identity registry.
//!
//! Stored values are JSON with base64 byte fields, addressed by a
//! session-scoped name ([`identity_key_name`], [`ephemeral_key_name`]).

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    ParticipantId, SessionId,
    encoding::{base64_array, base64_vec},
    errors::{ProtocolError, Result},
};

/// Storage name of the identity key record for a session.
pub fn identity_key_name(session_id: SessionId) -> String {
    format!("identityKey-{session_id}")
}

/// Storage name of the ephemeral key record for a session.
pub fn ephemeral_key_name(session_id: SessionId) -> String {
    format!("ephemeralKey-{session_id}")
}

/// Persisted identity key: public half in clear, private half sealed under
/// the secret code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityKeyRecord {
    /// X25519 public key
    #[serde(with = "base64_array")]
    pub public_key: [u8; 32],
    /// Sealed private key (ciphertext and tag)
    #[serde(with = "base64_vec")]
    pub encrypted_private_key: Vec<u8>,
    /// 24-byte sealing nonce
    #[serde(with = "base64_array")]
    pub nonce: [u8; 24],
}

impl IdentityKeyRecord {
    /// Encode as stored JSON.
    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }

    /// Decode stored JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        from_json(json)
    }
}

/// Persisted ephemeral key pair of the current connection.
///
/// Holds the private key in clear for the connection's lifetime; wiped on
/// drop. `seq` is the number carried by the announcement of this key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralKeyRecord {
    /// X25519 public key
    #[serde(with = "base64_array")]
    pub public_key: [u8; 32],
    /// X25519 private key
    #[serde(with = "base64_array")]
    pub private_key: [u8; 32],
    /// Announcement sequence number, 0 for records written by older clients
    #[serde(default)]
    pub seq: u64,
}

impl EphemeralKeyRecord {
    /// Encode as stored JSON.
    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }

    /// Decode stored JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        from_json(json)
    }
}

impl fmt::Debug for EphemeralKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyRecord")
            .field("public_key", &"..")
            .field("private_key", &"[REDACTED]")
            .field("seq", &self.seq)
            .finish()
    }
}

/// Body of the identity registry call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPublication {
    /// Session the identity belongs to
    pub session_id: SessionId,
    /// Owner of the identity
    pub participant_id: ParticipantId,
    /// X25519 identity public key
    #[serde(with = "base64_array")]
    pub identity_public_key: [u8; 32],
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| ProtocolError::Encode { reason: e.to_string() })
}

fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| ProtocolError::Malformed { reason: e.to_string() })
}
