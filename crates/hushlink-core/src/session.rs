//! Explicit per-session inputs.
//!
//! Everything the core needs to know about "which session am I in" travels in
//! a [`SessionContext`] handed to constructors. Nothing is looked up from
//! process-wide state.

use std::fmt;

use hushlink_proto::{ParticipantId, SessionId};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SessionError;

/// Number of digits in a join PIN.
pub const PIN_LENGTH: usize = 6;

/// Human-entered code protecting the identity private key.
///
/// Never persisted or transmitted. Wiped on drop; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretCode(String);

impl SecretCode {
    /// Wrap an arbitrary code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Parse a join PIN: exactly six ASCII digits.
    ///
    /// # Errors
    ///
    /// - `InvalidSecretCode` if the input is not six digits
    pub fn parse_pin(input: &str) -> Result<Self, SessionError> {
        let pin = input.trim();

        if pin.len() != PIN_LENGTH {
            return Err(SessionError::InvalidSecretCode {
                reason: format!("expected {PIN_LENGTH} digits, got {} characters", pin.len()),
            });
        }

        if !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionError::InvalidSecretCode {
                reason: "only digits are allowed".to_string(),
            });
        }

        Ok(Self(pin.to_string()))
    }

    /// The code as entered.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretCode([REDACTED])")
    }
}

/// Inputs of one active session.
///
/// Created at join, borrowed by every component, dropped at teardown.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Session being joined
    pub session_id: SessionId,
    /// Local participant assigned by the session service
    pub local_participant: ParticipantId,
    /// Code protecting the identity private key
    pub secret_code: SecretCode,
    /// Set by the external verification flow once access was granted
    pub access_verified: bool,
}

impl SessionContext {
    /// Context for a session whose access has already been verified.
    pub fn verified(
        session_id: SessionId,
        local_participant: ParticipantId,
        secret_code: SecretCode,
    ) -> Self {
        Self { session_id, local_participant, secret_code, access_verified: true }
    }
}
