//! Hushlink Cryptographic Primitives
//!
//! Cryptographic building blocks for the Hushlink key exchange. Pure functions
//! with deterministic outputs. Callers provide random bytes (secret scalars,
//! nonces) so that tests and simulations stay reproducible.
//!
//! # Key Lifecycle
//!
//! ```text
//! Secret code ──derive_key──> DerivedKey
//!                                │
//! Identity secret ──encrypt──────┴──> IdentityKey { public, sealed private, nonce }
//!
//! Ephemeral secret ──> EphemeralKeyPair ──public──> wire
//!                            │
//!        peer public ────────┴──diffie_hellman──> SharedSecret (per peer)
//! ```
//!
//! The identity private key only exists in clear form for the duration of a
//! [`IdentityKey::recover_private_key`] call result. Ephemeral keys live for
//! one connection and are superseded on reconnect. Shared secrets are derived
//! from ephemeral keys only.
//!
//! # Security
//!
//! Key protection:
//! - XChaCha20-Poly1305 with a fresh 24-byte nonce per encryption
//! - A wrong secret code or a modified record fails authentication, it never
//!   yields a default key
//!
//! Key exchange:
//! - X25519, output expanded with HKDF-SHA256 under a fixed label
//! - Non-contributory results (low-order peer points) are rejected
//!
//! Hygiene:
//! - Private, derived and shared key material is zeroized on drop
//! - `Debug` output of secret types is redacted

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod ephemeral;
mod error;
mod exchange;
mod identity;
pub mod key_codec;
mod keys;

pub use ephemeral::EphemeralKeyPair;
pub use error::CryptoError;
pub use exchange::{SharedSecret, diffie_hellman};
pub use identity::IdentityKey;
pub use key_codec::{DerivedKey, NONCE_SIZE, SealedKey, derive_key};
pub use keys::{KEY_SIZE, PrivateKey, PublicKey};
