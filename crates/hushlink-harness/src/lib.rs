//! Deterministic simulation harness for Hushlink sessions.
//!
//! Runs real [`hushlink_client::Client`]s against an in-memory relay with
//! virtual time and seeded randomness, so multi-party key exchange scenarios
//! (late joiners, reconnects, relay outages, storage faults) replay exactly
//! from a seed.
//!
//! - [`SimEnv`]: virtual clock and ChaCha20 randomness shared by all clients
//! - [`SimRelay`]: per-session relay with key replay and broadcast rules
//! - [`SimCluster`]: synchronous driver routing client actions through the
//!   relay

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod sim_env;
pub mod sim_relay;

pub use cluster::{SimClient, SimCluster, SimParticipant, SimStorage};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_relay::{Endpoint, SimRelay};
