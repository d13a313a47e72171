use thiserror::Error;

/// Key storage failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Underlying I/O failed
    #[error("storage I/O failed for {name}: {reason}")]
    Io {
        /// Record name
        name: String,
        /// OS error description
        reason: String,
    },

    /// Record name cannot be mapped to the backend
    #[error("invalid record name: {name}")]
    InvalidName {
        /// Rejected name
        name: String,
    },

    /// A lock was poisoned by a panicking thread
    #[error("storage lock poisoned")]
    Poisoned,
}
