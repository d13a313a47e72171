//! Client error types.

use hushlink_core::ChannelError;
use hushlink_crypto::CryptoError;
use hushlink_proto::ProtocolError;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors from the identity and ephemeral key stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    /// Storage backend failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A stored record exists but cannot be used
    #[error("corrupted key record {name}: {reason}")]
    Corrupted {
        /// Record name
        name: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Errors from the client state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Session access was not verified by the join flow
    #[error("session access has not been verified")]
    AccessNotVerified,

    /// Identity or ephemeral key store failed
    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    /// Key material could not be used
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Outbound payload could not be encoded
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Channel rejected the operation
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Operation needs an open channel
    #[error("channel is not open")]
    NotConnected,

    /// Session was torn down
    #[error("session has been torn down")]
    TornDown,
}

impl ClientError {
    /// Returns true if the same operation may succeed later.
    ///
    /// Sending while disconnected succeeds once the channel reconnects, and a
    /// storage I/O failure may clear. Everything else needs a new session or
    /// different input.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotConnected => true,
            Self::KeyStore(KeyStoreError::Storage(StorageError::Io { .. })) => true,
            Self::Channel(e) => e.is_transient(),
            Self::AccessNotVerified
            | Self::KeyStore(_)
            | Self::Crypto(_)
            | Self::Protocol(_)
            | Self::TornDown => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ClientError::NotConnected.is_transient());
        assert!(
            ClientError::KeyStore(KeyStoreError::Storage(StorageError::Io {
                name: "ephemeralKey-1".to_string(),
                reason: "disk full".to_string(),
            }))
            .is_transient()
        );

        assert!(!ClientError::TornDown.is_transient());
        assert!(!ClientError::AccessNotVerified.is_transient());
        assert!(
            !ClientError::Crypto(CryptoError::DecryptionFailed { reason: "tag".to_string() })
                .is_transient()
        );
        assert!(!ClientError::Channel(ChannelError::Lost { attempts: 10 }).is_transient());
    }
}
