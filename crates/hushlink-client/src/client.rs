//! Client state machine.
//!
//! The `Client` owns every component of one session and routes relay payloads
//! between them: `self` mints and announces an ephemeral key, `ephemeral_key`
//! feeds the peer registry and the shared secret cache, `message` goes to the
//! application. One event is processed to completion before the next.

use std::collections::BTreeMap;

use hushlink_core::{
    ChannelAction, ChannelConfig, ChannelError, ChannelState, Environment, ParticipantId,
    PeerKeyRegistry, RecordOutcome, SecretCode, SessionChannel, SessionContext,
    SharedSecretDeriver,
};
use hushlink_crypto::{EphemeralKeyPair, IdentityKey, PrivateKey, PublicKey, SharedSecret};
use hushlink_proto::{
    EphemeralKeyAnnounce, IdentityPublication, Inbound, InboundMessage, OutboundMessage,
    OutgoingChatMessage, PeerChatMessage, PeerEphemeralKey, SelfIdentity,
};
use zeroize::Zeroize;

use crate::{
    error::ClientError,
    event::{ChatMessage, ClientAction, ClientEvent},
    keystore::{EphemeralKeyStore, IdentityKeyStore},
    storage::KeyStorage,
};

/// Client for one chat session.
pub struct Client<E: Environment, S: KeyStorage> {
    /// Environment for randomness and timing.
    env: E,

    /// Session inputs handed over by the join flow.
    context: SessionContext,

    identity_store: IdentityKeyStore<S>,
    ephemeral_store: EphemeralKeyStore<S>,

    /// Identity of this session. `None` after teardown.
    identity: Option<IdentityKey>,

    /// Identity publication for the registry.
    publication: IdentityPublication,

    publish_state: PublishState,

    channel: SessionChannel<E::Instant>,
    registry: PeerKeyRegistry,
    deriver: SharedSecretDeriver,

    /// Key pair of the current announcement.
    ephemeral: Option<EphemeralKeyPair>,

    /// Sequence number of the last announcement that was persisted.
    announced_seq: u64,

    /// Display identity from the last `self`.
    display: SelfIdentity,

    torn_down: bool,
}

/// Progress of the identity publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishState {
    /// Not published yet, or the last attempt failed.
    Pending,
    /// Handed to the caller, no outcome reported yet.
    InFlight,
    /// Registry acknowledged the key.
    Published,
}

impl<E: Environment, S: KeyStorage> Client<E, S> {
    /// Create the client for a verified session.
    ///
    /// Loads the session identity from `storage` or creates it. The identity
    /// is published when the channel starts and again on every `self` until
    /// the registry acknowledged it.
    ///
    /// # Errors
    ///
    /// - `ClientError::AccessNotVerified` if the join flow did not verify access
    /// - `ClientError::KeyStore` if stored key records cannot be read or the
    ///   new identity cannot be written
    pub fn new(
        env: E,
        context: SessionContext,
        storage: S,
        config: ChannelConfig,
    ) -> Result<Self, ClientError> {
        if !context.access_verified {
            return Err(ClientError::AccessNotVerified);
        }

        let identity_store = IdentityKeyStore::new(storage.clone());
        let ephemeral_store = EphemeralKeyStore::new(storage);

        let (identity, created) =
            identity_store.get_or_create(&env, context.session_id, &context.secret_code)?;

        // a stored identity may never have reached the registry
        let publication = IdentityPublication {
            session_id: context.session_id,
            participant_id: context.local_participant.clone(),
            identity_public_key: *identity.public_key.as_bytes(),
        };

        // announcements keep counting across restarts
        let announced_seq =
            ephemeral_store.load(context.session_id)?.map_or(0, |(_, seq)| seq);

        tracing::info!(
            session = %context.session_id,
            participant = %context.local_participant,
            identity = %identity.public_key.fingerprint(),
            created,
            announced_seq,
            "session client ready"
        );

        Ok(Self {
            env,
            registry: PeerKeyRegistry::new(context.local_participant.clone()),
            context,
            identity_store,
            ephemeral_store,
            identity: Some(identity),
            publication,
            publish_state: PublishState::Pending,
            channel: SessionChannel::new(config),
            deriver: SharedSecretDeriver::new(),
            ephemeral: None,
            announced_seq,
            display: SelfIdentity { name: String::new(), avatar: String::new() },
            torn_down: false,
        })
    }

    /// Process an event and return resulting actions.
    ///
    /// After teardown every event is ignored, except `SendMessage` which
    /// fails with `ClientError::TornDown`.
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if self.torn_down {
            return match event {
                ClientEvent::SendMessage { .. } => Err(ClientError::TornDown),
                _ => Ok(Vec::new()),
            };
        }

        match event {
            ClientEvent::Start => self.handle_start(),
            ClientEvent::TransportOpened => {
                self.channel.transport_opened(self.env.now())?;
                Ok(Vec::new())
            },
            ClientEvent::TextReceived { text } => self.handle_text(&text),
            ClientEvent::TransportClosed { reason } => {
                let actions = self.channel.transport_closed(self.env.now(), &reason);
                Ok(self.channel_actions(actions))
            },
            ClientEvent::Tick { now } => {
                let actions = self.channel.tick(now);
                Ok(self.channel_actions(actions))
            },
            ClientEvent::SendMessage { text, timestamp } => {
                self.handle_send_message(text, timestamp)
            },
            ClientEvent::IdentityPublished { result } => {
                self.publish_state = match result {
                    Ok(()) => {
                        tracing::info!("identity key published");
                        PublishState::Published
                    },
                    Err(reason) => {
                        tracing::warn!(%reason, "identity key publication failed, retrying on next self");
                        PublishState::Pending
                    },
                };
                Ok(Vec::new())
            },
            ClientEvent::Close => {
                let actions = self.channel.close();
                Ok(self.channel_actions(actions))
            },
            ClientEvent::Teardown { clear_storage } => Ok(self.handle_teardown(clear_storage)),
        }
    }

    /// Current channel state.
    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Session context in use.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Identity public key. `None` after teardown.
    pub fn identity_public_key(&self) -> Option<PublicKey> {
        self.identity.as_ref().map(|identity| identity.public_key)
    }

    /// Public half of the current ephemeral key, once one was announced.
    pub fn ephemeral_public_key(&self) -> Option<PublicKey> {
        self.ephemeral.as_ref().map(EphemeralKeyPair::public_key)
    }

    /// Sequence number of the last announced ephemeral key.
    pub fn announced_seq(&self) -> u64 {
        self.announced_seq
    }

    /// Known peer ephemeral keys.
    pub fn peer_keys(&self) -> BTreeMap<ParticipantId, PublicKey> {
        self.registry.snapshot()
    }

    /// Shared secret with `peer`, if one is derived for the current keys.
    pub fn shared_secret(&self, peer: &ParticipantId) -> Option<&SharedSecret> {
        let local = self.ephemeral.as_ref()?.public_key();
        let peer_key = self.registry.get(peer)?;

        if !self.deriver.is_current(peer, &peer_key, &local) {
            return None;
        }
        self.deriver.secret_for(peer)
    }

    /// Number of X25519 computations performed so far.
    pub fn derivation_count(&self) -> u64 {
        self.deriver.derivation_count()
    }

    /// Whether the registry acknowledged the identity key.
    pub fn identity_published(&self) -> bool {
        self.publish_state == PublishState::Published
    }

    /// Whether teardown happened.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Unseal the identity private key with a code entered by the user.
    ///
    /// # Errors
    ///
    /// - `ClientError::Crypto` wrapping `DecryptionFailed` if the code is wrong
    /// - `ClientError::TornDown` after teardown
    pub fn recover_identity_private_key(
        &self,
        secret_code: &SecretCode,
    ) -> Result<PrivateKey, ClientError> {
        let identity = self.identity.as_ref().ok_or(ClientError::TornDown)?;
        Ok(IdentityKeyStore::<S>::recover_private_key(identity, secret_code)?)
    }

    fn handle_start(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        let channel_actions = self.channel.start()?;

        let mut actions: Vec<_> = self.publish_if_pending().into_iter().collect();
        actions.extend(self.channel_actions(channel_actions));

        Ok(actions)
    }

    fn handle_text(&mut self, text: &str) -> Result<Vec<ClientAction>, ClientError> {
        let inbound = match self.channel.receive(text) {
            Ok(inbound) => inbound,
            Err(ChannelError::Protocol(err)) => {
                tracing::warn!(error = %err, len = text.len(), "dropping malformed payload");
                return Ok(Vec::new());
            },
            Err(ChannelError::DuplicateIdentity) => {
                tracing::warn!("dropping repeated self announcement");
                return Ok(Vec::new());
            },
            Err(err @ ChannelError::InvalidState { .. }) => {
                tracing::debug!(error = %err, "dropping payload outside an open connection");
                return Ok(Vec::new());
            },
            Err(err) => return Err(err.into()),
        };

        match inbound {
            Inbound::Message(InboundMessage::SelfIdentity(identity)) => {
                self.handle_self_identity(identity)
            },
            Inbound::Message(InboundMessage::EphemeralKey(key)) => {
                Ok(self.handle_ephemeral_key(&key))
            },
            Inbound::Message(InboundMessage::Message(message)) => Ok(self.handle_message(message)),
            Inbound::Notice(notice) => {
                tracing::warn!(message = %notice.message, "relay reported an error");
                Ok(vec![ClientAction::ServerNotice { message: notice.message }])
            },
        }
    }

    /// Mint, persist and announce a fresh ephemeral key for this connection.
    fn handle_self_identity(
        &mut self,
        identity: SelfIdentity,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let mut actions = vec![ClientAction::SelfIdentity {
            name: identity.name.clone(),
            avatar: identity.avatar.clone(),
        }];
        self.display = identity;
        actions.extend(self.publish_if_pending());

        let pair = EphemeralKeyStore::<S>::generate(&self.env);
        // the wall clock floor keeps peers accepting keys after local records were lost
        let seq = (self.announced_seq + 1).max(self.env.wall_clock_millis());
        let announcement = OutboundMessage::EphemeralKey(EphemeralKeyAnnounce {
            public_key: *pair.public_key().as_bytes(),
            seq,
        })
        .encode()?;

        // the private half must be retrievable before anyone can answer
        if let Err(err) = self.ephemeral_store.persist(self.context.session_id, &pair, seq) {
            tracing::warn!(error = %err, seq, "ephemeral key not persisted, not announcing");
            return Ok(actions);
        }

        tracing::info!(seq, public_key = %pair.public_key().fingerprint(), "announcing ephemeral key");
        self.announced_seq = seq;
        self.ephemeral = Some(pair);

        actions.push(ClientAction::Send(announcement));

        let peers = self.registry.snapshot();
        actions.extend(peers.iter().filter_map(|(peer, key)| self.derive_for(peer, key)));

        Ok(actions)
    }

    fn handle_ephemeral_key(&mut self, key: &PeerEphemeralKey) -> Vec<ClientAction> {
        let public_key = PublicKey::from_bytes(key.public_key);

        match self.registry.record_peer_key(&key.from, public_key, key.seq) {
            RecordOutcome::SelfIgnored => {
                tracing::trace!(seq = key.seq, "ignoring own ephemeral key echo");
                Vec::new()
            },
            RecordOutcome::Stale => {
                tracing::debug!(
                    peer = %key.from,
                    seq = key.seq,
                    current = ?self.registry.seq(&key.from),
                    "ignoring stale ephemeral key"
                );
                Vec::new()
            },
            RecordOutcome::Unchanged => Vec::new(),
            RecordOutcome::Inserted | RecordOutcome::Updated => {
                tracing::debug!(peer = %key.from, seq = key.seq, "peer ephemeral key recorded");
                self.derive_for(&key.from, &public_key).into_iter().collect()
            },
        }
    }

    fn handle_message(&mut self, message: PeerChatMessage) -> Vec<ClientAction> {
        if message.from == self.context.local_participant {
            tracing::trace!("ignoring own message echo");
            return Vec::new();
        }

        vec![ClientAction::DeliverMessage(message.into())]
    }

    fn handle_send_message(
        &mut self,
        text: String,
        timestamp: Option<String>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if !self.channel.is_open() {
            return Err(ClientError::NotConnected);
        }

        let timestamp = timestamp.unwrap_or_else(|| format_clock(self.env.wall_clock_secs()));
        let outgoing = OutgoingChatMessage {
            text,
            timestamp,
            name: self.display.name.clone(),
            avatar: self.display.avatar.clone(),
            to: String::new(),
        };
        let payload = OutboundMessage::Message(outgoing.clone()).encode()?;

        let echo = ChatMessage {
            from: self.context.local_participant.clone(),
            text: outgoing.text,
            timestamp: outgoing.timestamp,
            name: outgoing.name,
            avatar: outgoing.avatar,
            to: outgoing.to,
        };

        Ok(vec![ClientAction::Send(payload), ClientAction::LocalEcho(echo)])
    }

    fn handle_teardown(&mut self, clear_storage: bool) -> Vec<ClientAction> {
        let channel_actions = self.channel.teardown();

        self.registry.clear();
        self.deriver.clear();
        self.ephemeral = None;
        self.identity = None;
        self.context.secret_code.zeroize();
        self.torn_down = true;

        if clear_storage {
            let session_id = self.context.session_id;
            if let Err(err) = self.identity_store.remove(session_id) {
                tracing::error!(error = %err, "failed to remove identity key record");
            }
            if let Err(err) = self.ephemeral_store.discard(session_id) {
                tracing::error!(error = %err, "failed to remove ephemeral key record");
            }
        }

        tracing::info!(session = %self.context.session_id, clear_storage, "session torn down");

        self.channel_actions(channel_actions)
    }

    fn publish_if_pending(&mut self) -> Option<ClientAction> {
        if self.publish_state != PublishState::Pending {
            return None;
        }
        self.publish_state = PublishState::InFlight;
        Some(ClientAction::PublishIdentity(self.publication.clone()))
    }

    /// Derive the secret with `peer` unless the cached one is current.
    fn derive_for(&mut self, peer: &ParticipantId, peer_key: &PublicKey) -> Option<ClientAction> {
        let pair = self.ephemeral.as_ref()?;
        if self.deriver.is_current(peer, peer_key, &pair.public_key()) {
            return None;
        }

        match self.deriver.derive_for(peer, peer_key, pair.private_key()) {
            Ok(_) => Some(ClientAction::SharedSecretEstablished { peer: peer.clone() }),
            Err(err) => {
                tracing::warn!(%peer, error = %err, "cannot derive shared secret");
                None
            },
        }
    }

    fn channel_actions(&self, actions: Vec<ChannelAction>) -> Vec<ClientAction> {
        actions
            .into_iter()
            .map(|action| match action {
                ChannelAction::Connect => ClientAction::Connect { url_path: self.url_path() },
                ChannelAction::Disconnect { reason } => ClientAction::Disconnect { reason },
                ChannelAction::Failed(error) => ClientAction::ChannelFailed { error },
            })
            .collect()
    }

    fn url_path(&self) -> String {
        format!("/ws/{}/{}", self.context.session_id, self.context.local_participant)
    }
}

/// `hh:mm AM` / `hh:mm PM` (UTC) of a Unix timestamp.
fn format_clock(unix_secs: u64) -> String {
    let hour = (unix_secs / 3600) % 24;
    let minute = (unix_secs / 60) % 60;
    let period = if hour < 12 { "AM" } else { "PM" };
    let hour = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{hour:02}:{minute:02} {period}")
}
