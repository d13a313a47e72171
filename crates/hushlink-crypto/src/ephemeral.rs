//! Per-connection ephemeral key pairs.

use std::fmt;

use crate::keys::{KEY_SIZE, PrivateKey, PublicKey};

/// Short-lived key pair minted once per connection.
///
/// Only [`public_key`](Self::public_key) ever crosses the wire. A reconnect
/// produces a new pair; pairs are never reused.
#[derive(Clone)]
pub struct EphemeralKeyPair {
    public_key: PublicKey,
    private_key: PrivateKey,
}

impl EphemeralKeyPair {
    /// Build a key pair from 32 caller-provided random bytes.
    pub fn from_secret(secret: [u8; KEY_SIZE]) -> Self {
        Self::from_private_key(PrivateKey::from_bytes(secret))
    }

    /// Build a key pair around an existing private key.
    pub fn from_private_key(private_key: PrivateKey) -> Self {
        Self { public_key: private_key.public_key(), private_key }
    }

    /// Public half, announced to peers.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Private half, used for pairwise derivation.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}
