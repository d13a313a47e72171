//! Device-local key storage.
//!
//! A small name/value store for the session-scoped key records. The trait is
//! synchronous: a successful `store` means the value is durable and will be
//! returned by the next `load`, which is what the client relies on before it
//! announces a freshly minted ephemeral key.

mod chaotic;
mod error;
mod file;
mod memory;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Name/value storage for persisted key records.
///
/// Must be Clone (the runtime and tests keep handles), Send + Sync, and
/// synchronous. Implementations share internal state, so clones access the
/// same underlying storage.
pub trait KeyStorage: Clone + Send + Sync + 'static {
    /// Value stored under `name`. `None` if absent.
    fn load(&self, name: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `name`, replacing any previous value.
    ///
    /// # Invariants
    ///
    /// - Post: on `Ok`, a following `load(name)` returns `value`, also after a
    ///   process restart for persistent backends
    fn store(&self, name: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the value under `name`. Removing an absent name is not an error.
    fn remove(&self, name: &str) -> Result<(), StorageError>;
}
