//! Error types for the session core.

use std::time::Duration;

use hushlink_proto::ProtocolError;
use thiserror::Error;

use crate::channel::ChannelState;

/// Errors from the session channel state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Operation not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: ChannelState,
        /// Operation that was attempted
        operation: String,
    },

    /// Inbound payload could not be parsed
    #[error("malformed inbound payload: {0}")]
    Protocol(#[from] ProtocolError),

    /// A second `self` announcement arrived on the same connection
    #[error("duplicate self announcement on one connection")]
    DuplicateIdentity,

    /// No `self` announcement arrived within the configured window
    #[error("no self announcement after {elapsed:?}")]
    IdentityTimeout {
        /// How long the connection was open without one
        elapsed: Duration,
    },

    /// Reconnect attempts exhausted
    #[error("channel lost after {attempts} reconnect attempts")]
    Lost {
        /// Consecutive failed attempts
        attempts: u32,
    },
}

impl ChannelError {
    /// Returns true if the channel recovers from this on its own.
    ///
    /// An identity timeout is followed by a reconnect. Exhausted retries are
    /// terminal, and dropped payloads do not become valid on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::IdentityTimeout { .. })
    }
}

/// Errors building a session context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Secret code does not have the expected format
    #[error("invalid secret code: {reason}")]
    InvalidSecretCode {
        /// What is wrong with it
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_timeout_is_transient() {
        assert!(ChannelError::IdentityTimeout { elapsed: Duration::from_secs(31) }.is_transient());
    }

    #[test]
    fn exhaustion_and_protocol_errors_are_fatal() {
        assert!(!ChannelError::Lost { attempts: 10 }.is_transient());
        assert!(!ChannelError::DuplicateIdentity.is_transient());
        assert!(!ChannelError::from(ProtocolError::MissingType).is_transient());
        assert!(
            !ChannelError::InvalidState {
                state: ChannelState::Closed,
                operation: "receive".to_string(),
            }
            .is_transient()
        );
    }
}
