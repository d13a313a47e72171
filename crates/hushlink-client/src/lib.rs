//! Client
//!
//! Action-based client state machine for one Hushlink session. Owns the
//! identity key, the per-connection ephemeral key, the peer key registry and
//! the shared secret cache, and routes relay payloads between them.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and action-based patterns as
//! [`hushlink_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`]) for
//! the caller to execute. Key records are the one exception: they are written
//! synchronously through a [`KeyStorage`] so an ephemeral key is durable before
//! it is announced.
//!
//! # Components
//!
//! - [`Client`]: Top-level state machine for one session
//! - [`IdentityKeyStore`]: Per-session identity key, private half sealed
//! - [`EphemeralKeyStore`]: Per-connection key pair and announcement counter
//! - [`storage`]: Key storage trait with memory, file and fault-injecting
//!   backends
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::connect`]: WebSocket connection to the relay
//! - [`publisher::IdentityPublisher`]: identity registry client
//! - [`system_env::SystemEnv`]: production environment
//! - [`runtime::Runtime`]: async loop driving a client

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod event;
mod keystore;
pub mod storage;

#[cfg(feature = "transport")]
pub mod publisher;
#[cfg(feature = "transport")]
pub mod runtime;
#[cfg(feature = "transport")]
pub mod system_env;
#[cfg(feature = "transport")]
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use error::{ClientError, KeyStoreError};
pub use event::{ChatMessage, ClientAction, ClientEvent};
pub use hushlink_core::{
    ChannelConfig, ChannelState, Environment, ParticipantId, ReconnectPolicy, SecretCode,
    SessionContext, SessionId,
};
pub use keystore::{EphemeralKeyStore, IdentityKeyStore};
pub use storage::{FileStorage, KeyStorage, MemoryStorage};
