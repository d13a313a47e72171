//! Hushlink Core
//!
//! Sans-IO protocol logic for one chat session: the session channel state
//! machine, the registry of peer ephemeral keys and the pairwise shared
//! secret cache.
//!
//! # Architecture
//!
//! Nothing in this crate performs I/O. Time is passed in as `now`, randomness
//! comes from an [`Environment`], and state machines return actions for a
//! driver to execute. The same code runs under the production runtime and
//! the deterministic simulation harness.
//!
//! # Components
//!
//! - [`SessionChannel`]: connection lifecycle, `self` gating, reconnect
//!   back-off
//! - [`PeerKeyRegistry`]: participant id to ephemeral public key, with
//!   self-exclusion and announcement ordering
//! - [`SharedSecretDeriver`]: X25519 secret per peer, cached against the
//!   exact key pair it was derived from
//! - [`SessionContext`]: explicit per-session inputs (ids, secret code,
//!   verified-access flag)

#![forbid(unsafe_code)]

pub mod channel;
pub mod deriver;
pub mod env;
pub mod error;
pub mod registry;
pub mod session;

pub use channel::{
    ChannelAction, ChannelConfig, ChannelState, DEFAULT_IDENTITY_TIMEOUT, ReconnectPolicy,
    SessionChannel,
};
pub use deriver::SharedSecretDeriver;
pub use env::Environment;
pub use error::{ChannelError, SessionError};
pub use hushlink_proto::{ParticipantId, SessionId};
pub use registry::{PeerKeyRegistry, RecordOutcome};
pub use session::{SecretCode, SessionContext};
