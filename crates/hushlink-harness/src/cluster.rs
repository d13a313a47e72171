//! Simulated cluster of session clients behind one [`SimRelay`].
//!
//! Every client action is executed synchronously: `Connect` reaches the relay
//! at once, `Send` lands in the relay, relay outboxes are drained back into
//! the clients until nothing is left in flight. Time only moves when a test
//! calls [`SimCluster::advance`], so every run is reproducible from its seed.

use std::collections::VecDeque;

use hushlink_client::{
    ChannelConfig, ChannelState, ChatMessage, Client, ClientAction, ClientEvent, ParticipantId,
    SecretCode, SessionContext, SessionId,
    storage::{ChaoticStorage, MemoryStorage},
};
use hushlink_core::{ChannelError, Environment};
use hushlink_crypto::SharedSecret;
use hushlink_proto::IdentityPublication;

use crate::{
    SimEnv,
    sim_env::SimInstant,
    sim_relay::{Endpoint, SimRelay},
};

/// Upper bound on delivery rounds before a run counts as livelocked.
const MAX_ROUNDS: usize = 1_000;

/// Key storage used by simulated participants.
pub type SimStorage = ChaoticStorage<MemoryStorage>;

/// Client type driven by the cluster.
pub type SimClient = Client<SimEnv, SimStorage>;

/// One participant and everything it surfaced to the application.
pub struct SimParticipant {
    /// Participant id assigned at join
    pub id: ParticipantId,
    /// The client under test
    pub client: SimClient,
    /// Key storage, kept to restart the client or break writes
    pub storage: SimStorage,
    /// Peer messages delivered to the message log
    pub delivered: Vec<ChatMessage>,
    /// Local echoes of sent messages
    pub echoes: Vec<ChatMessage>,
    /// Relay error notices
    pub notices: Vec<String>,
    /// Terminal channel failures
    pub failures: Vec<ChannelError>,
    /// Identity publications requested
    pub publications: Vec<IdentityPublication>,
    /// Peers a shared secret was established with, in order
    pub established: Vec<ParticipantId>,
    code: String,
    endpoint: Option<Endpoint>,
}

impl SimParticipant {
    /// Whether the relay holds a connection for this participant.
    pub fn is_connected(&self) -> bool {
        self.endpoint.is_some()
    }

    fn record(&mut self, action: ClientAction) {
        match action {
            ClientAction::DeliverMessage(message) => self.delivered.push(message),
            ClientAction::LocalEcho(message) => self.echoes.push(message),
            ClientAction::ServerNotice { message } => self.notices.push(message),
            ClientAction::ChannelFailed { error } => self.failures.push(error),
            ClientAction::SharedSecretEstablished { peer } => self.established.push(peer),
            ClientAction::SelfIdentity { .. }
            | ClientAction::Connect { .. }
            | ClientAction::Send(_)
            | ClientAction::Disconnect { .. }
            | ClientAction::PublishIdentity(_) => {},
        }
    }
}

/// Simulated session: clients, relay and a shared virtual clock.
pub struct SimCluster {
    env: SimEnv,
    session_id: SessionId,
    config: ChannelConfig,
    relay: SimRelay,
    relay_down: bool,
    participants: Vec<SimParticipant>,
}

impl SimCluster {
    /// Empty cluster for `session_id`, seeded for reproducible keys.
    pub fn new(seed: u64, session_id: SessionId) -> Self {
        Self::with_config(seed, session_id, ChannelConfig::default())
    }

    /// Empty cluster whose clients use `config`.
    pub fn with_config(seed: u64, session_id: SessionId, config: ChannelConfig) -> Self {
        Self {
            env: SimEnv::with_seed(seed),
            session_id,
            config,
            relay: SimRelay::new(),
            relay_down: false,
            participants: Vec::new(),
        }
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Session every participant joins.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The relay, for inspecting stored keys.
    pub fn relay(&self) -> &SimRelay {
        &self.relay
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Whether the cluster has no participants.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Participant at `idx`.
    pub fn participant(&self, idx: usize) -> &SimParticipant {
        &self.participants[idx]
    }

    /// Client at `idx`.
    pub fn client(&self, idx: usize) -> &SimClient {
        &self.participants[idx].client
    }

    /// Add a participant without starting it.
    pub fn add_participant(&mut self, id: &str, code: &str) -> Result<usize, String> {
        let storage = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        let client = self.build_client(id, code, storage.clone())?;

        self.participants.push(SimParticipant {
            id: ParticipantId::new(id),
            client,
            storage,
            delivered: Vec::new(),
            echoes: Vec::new(),
            notices: Vec::new(),
            failures: Vec::new(),
            publications: Vec::new(),
            established: Vec::new(),
            code: code.to_string(),
            endpoint: None,
        });

        Ok(self.participants.len() - 1)
    }

    /// Add a participant, start it and deliver everything in flight.
    pub fn join(&mut self, id: &str, code: &str) -> Result<usize, String> {
        let idx = self.add_participant(id, code)?;
        self.start(idx)?;
        Ok(idx)
    }

    /// Start the client at `idx` and deliver everything in flight.
    pub fn start(&mut self, idx: usize) -> Result<(), String> {
        self.handle(idx, ClientEvent::Start)?;
        self.run_until_quiescent()
    }

    /// Send a chat message from `idx` and deliver it.
    pub fn send(&mut self, idx: usize, text: &str) -> Result<(), String> {
        self.handle(idx, ClientEvent::SendMessage { text: text.to_string(), timestamp: None })?;
        self.run_until_quiescent()
    }

    /// Queue a raw payload for `idx` as if the relay had sent it.
    pub fn inject(&mut self, idx: usize, text: &str) -> Result<(), String> {
        let endpoint =
            self.participants[idx].endpoint.clone().ok_or("participant is not connected")?;
        self.relay.inject(&endpoint, text);
        self.run_until_quiescent()
    }

    /// Cut the connection of `idx` without the client asking for it.
    pub fn drop_connection(&mut self, idx: usize, reason: &str) -> Result<(), String> {
        if let Some(endpoint) = self.participants[idx].endpoint.take() {
            self.relay.disconnect(&endpoint);
        }
        self.handle(idx, ClientEvent::TransportClosed { reason: reason.to_string() })?;
        self.run_until_quiescent()
    }

    /// Make the relay refuse (or accept again) new connections.
    pub fn set_relay_down(&mut self, down: bool) {
        self.relay_down = down;
    }

    /// Move time forward, tick every client and deliver the results.
    pub fn advance(&mut self, by: std::time::Duration) -> Result<(), String> {
        self.env.advance(by);
        let now = self.env.now();

        for idx in 0..self.participants.len() {
            self.handle(idx, ClientEvent::Tick { now })?;
        }
        self.run_until_quiescent()
    }

    /// Advance in `step` increments until `idx` is open or `limit` passes.
    pub fn advance_until_open(
        &mut self,
        idx: usize,
        step: std::time::Duration,
        limit: std::time::Duration,
    ) -> Result<(), String> {
        let deadline = self.env.now() + limit;
        while self.client(idx).channel_state() != ChannelState::Open {
            if self.env.now() >= deadline {
                return Err(format!(
                    "participant {idx} not open after {limit:?}: {:?}",
                    self.client(idx).channel_state()
                ));
            }
            self.advance(step)?;
        }
        Ok(())
    }

    /// Close the channel of `idx`.
    pub fn close(&mut self, idx: usize) -> Result<(), String> {
        self.handle(idx, ClientEvent::Close)?;
        self.run_until_quiescent()
    }

    /// Tear down the session of `idx`.
    pub fn teardown(&mut self, idx: usize, clear_storage: bool) -> Result<(), String> {
        self.handle(idx, ClientEvent::Teardown { clear_storage })?;
        self.run_until_quiescent()
    }

    /// Replace the client of `idx` with a fresh one over the same storage,
    /// as after an application restart. The new client is started.
    pub fn restart(&mut self, idx: usize) -> Result<(), String> {
        if let Some(endpoint) = self.participants[idx].endpoint.take() {
            self.relay.disconnect(&endpoint);
        }

        let participant = &self.participants[idx];
        let client = self.build_client(
            participant.id.as_str(),
            &participant.code,
            participant.storage.clone(),
        )?;
        self.participants[idx].client = client;

        self.start(idx)
    }

    /// Shared secret `idx` holds with `peer`, if current.
    pub fn shared_secret(&self, idx: usize, peer: usize) -> Option<&SharedSecret> {
        self.client(idx).shared_secret(&self.participants[peer].id)
    }

    /// Whether every pair of open participants holds equal secrets.
    pub fn secrets_agree(&self) -> bool {
        let open: Vec<usize> = (0..self.participants.len())
            .filter(|&idx| self.client(idx).channel_state() == ChannelState::Open)
            .collect();

        open.iter().all(|&a| {
            open.iter().filter(|&&b| b != a).all(|&b| {
                match (self.shared_secret(a, b), self.shared_secret(b, a)) {
                    (Some(ours), Some(theirs)) => ours == theirs,
                    _ => false,
                }
            })
        })
    }

    /// Drain relay outboxes into clients until nothing is in flight.
    pub fn run_until_quiescent(&mut self) -> Result<(), String> {
        for _ in 0..MAX_ROUNDS {
            let mut delivered = 0;

            for idx in 0..self.participants.len() {
                let Some(endpoint) = self.participants[idx].endpoint.clone() else {
                    continue;
                };
                for text in self.relay.drain(&endpoint) {
                    delivered += 1;
                    self.handle(idx, ClientEvent::TextReceived { text })?;
                }
            }

            if delivered == 0 {
                return Ok(());
            }
        }

        Err(format!("still delivering after {MAX_ROUNDS} rounds"))
    }

    fn build_client(&self, id: &str, code: &str, storage: SimStorage) -> Result<SimClient, String> {
        let context = SessionContext::verified(
            self.session_id,
            ParticipantId::new(id),
            SecretCode::new(code),
        );
        Client::new(self.env.clone(), context, storage, self.config.clone())
            .map_err(|e| format!("client {id} failed to start: {e}"))
    }

    /// Feed an event to `idx` and execute the resulting actions.
    fn handle(&mut self, idx: usize, event: ClientEvent<SimInstant>) -> Result<(), String> {
        let actions = self.participants[idx]
            .client
            .handle(event)
            .map_err(|e| format!("participant {idx} rejected event: {e}"))?;

        let mut pending = VecDeque::from(actions);
        while let Some(action) = pending.pop_front() {
            let follow_up = self.execute(idx, action);
            if let Some(event) = follow_up {
                let actions = self.participants[idx]
                    .client
                    .handle(event)
                    .map_err(|e| format!("participant {idx} rejected transport event: {e}"))?;
                pending.extend(actions);
            }
        }

        Ok(())
    }

    fn execute(&mut self, idx: usize, action: ClientAction) -> Option<ClientEvent<SimInstant>> {
        let participant = &mut self.participants[idx];

        match action {
            ClientAction::Connect { url_path } => {
                if self.relay_down {
                    return Some(ClientEvent::TransportClosed {
                        reason: "connection refused".to_string(),
                    });
                }
                let Some(endpoint) = SimRelay::parse_path(&url_path) else {
                    return Some(ClientEvent::TransportClosed {
                        reason: format!("no route for {url_path}"),
                    });
                };

                self.relay.connect(&endpoint);
                participant.endpoint = Some(endpoint);
                Some(ClientEvent::TransportOpened)
            },
            ClientAction::Send(text) => {
                match &participant.endpoint {
                    Some(endpoint) => self.relay.receive(endpoint, &text),
                    None => tracing::debug!(idx, "send without connection dropped"),
                }
                None
            },
            ClientAction::Disconnect { reason } => {
                if let Some(endpoint) = participant.endpoint.take() {
                    self.relay.disconnect(&endpoint);
                }
                Some(ClientEvent::TransportClosed { reason })
            },
            ClientAction::PublishIdentity(publication) => {
                participant.publications.push(publication);
                Some(ClientEvent::IdentityPublished { result: Ok(()) })
            },
            action => {
                participant.record(action);
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_connects_and_publishes() {
        let mut cluster = SimCluster::new(1, SessionId(5));
        let alice = cluster.join("alice", "111111").unwrap();

        assert_eq!(cluster.client(alice).channel_state(), ChannelState::Open);
        assert!(cluster.participant(alice).is_connected());
        assert_eq!(cluster.participant(alice).publications.len(), 1);
        assert_eq!(cluster.relay().stored_keys(SessionId(5)).len(), 1);
    }

    #[test]
    fn relay_down_keeps_client_lost() {
        let mut cluster = SimCluster::new(2, SessionId(5));
        cluster.set_relay_down(true);
        let alice = cluster.join("alice", "111111").unwrap();

        assert_eq!(cluster.client(alice).channel_state(), ChannelState::Lost);
        assert!(!cluster.participant(alice).is_connected());
    }
}
