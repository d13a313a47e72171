//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from key protection and key exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Authentication of a sealed private key failed.
    ///
    /// Wrong secret code, corrupted storage or tampering. Callers must treat
    /// this as "cannot unlock identity" and ask for the code again.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },

    /// Key material with an unexpected length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length
        expected: usize,
        /// Actual key length
        actual: usize,
    },

    /// X25519 produced the all-zero output (peer sent a low-order point)
    #[error("non-contributory key exchange")]
    NonContributory,
}
