//! Async driver for one session.
//!
//! The runtime owns the [`Client`] and is the only place its events come
//! from. Ticks, transport payloads, registry results and application commands
//! are merged by a single `tokio::select!` loop and handed to the client one
//! at a time, so per-session ordering holds whatever the host does with
//! threads.

use std::{collections::VecDeque, future, time::Duration};

use futures_util::future::BoxFuture;
use hushlink_core::{ChannelState, Environment};
use hushlink_proto::IdentityPublication;
use tokio::sync::mpsc;

use crate::{
    Client, ClientAction, ClientError, ClientEvent,
    publisher::IdentityPublisher,
    storage::KeyStorage,
    transport::{self, ConnectedTransport, TransportError, TransportEvent},
};

/// Default period of the client tick.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Default bound on one WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type PendingConnect = BoxFuture<'static, Result<ConnectedTransport, TransportError>>;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Relay base URL (`ws://` or `wss://`), session path appended per connect
    pub server_url: String,
    /// Identity registry base URL. Publication is skipped if `None`.
    pub registry_url: Option<String>,
    /// How often the client is ticked
    pub tick_interval: Duration,
    /// A handshake still pending after this long counts as a failed attempt
    pub connect_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8000".to_string(),
            registry_url: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Application commands accepted by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a chat message to the session.
    Send {
        /// Message text
        text: String,
    },

    /// Close the channel and stop.
    Close,

    /// End the session, release key material and stop.
    Teardown {
        /// Also delete the persisted key records
        clear_storage: bool,
    },
}

/// Drives a [`Client`] over a WebSocket transport.
pub struct Runtime<E: Environment, S: KeyStorage> {
    env: E,
    client: Client<E, S>,
    config: RuntimeConfig,
    publisher: Option<IdentityPublisher>,
    transport: Option<ConnectedTransport>,
    /// Handshake in flight. Polled by the event loop so commands stay live.
    connecting: Option<PendingConnect>,
    publish_tx: mpsc::Sender<Result<(), String>>,
    publish_rx: mpsc::Receiver<Result<(), String>>,
    /// Actions for the application (messages, notices, failures).
    output: mpsc::Sender<ClientAction>,
}

impl<E: Environment, S: KeyStorage> Runtime<E, S> {
    /// Create a runtime. Application-facing actions are sent to `output`.
    pub fn new(
        env: E,
        client: Client<E, S>,
        config: RuntimeConfig,
        output: mpsc::Sender<ClientAction>,
    ) -> Self {
        let publisher = config.registry_url.as_deref().map(IdentityPublisher::new);
        let (publish_tx, publish_rx) = mpsc::channel(4);

        Self {
            env,
            client,
            config,
            publisher,
            transport: None,
            connecting: None,
            publish_tx,
            publish_rx,
            output,
        }
    }

    /// The client being driven.
    pub fn client(&self) -> &Client<E, S> {
        &self.client
    }

    /// Run until the channel is closed, fails, or the session is torn down.
    ///
    /// Closing `commands` closes the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot start. Later client errors are
    /// logged and the loop continues.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Result<(), ClientError> {
        let actions = self.client.handle(ClientEvent::Start)?;
        self.execute(actions).await;

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut commands_open = true;
        let env = self.env.clone();

        while !self.finished() {
            let event = tokio::select! {
                _ = ticker.tick() => ClientEvent::Tick { now: env.now() },
                Some(event) = next_transport_event(&mut self.transport) => match event {
                    TransportEvent::Text(text) => ClientEvent::TextReceived { text },
                    TransportEvent::Closed { reason } => {
                        self.transport = None;
                        ClientEvent::TransportClosed { reason }
                    },
                },
                result = next_connect_outcome(&mut self.connecting) => {
                    self.connecting = None;
                    self.connected(result)
                },
                Some(result) = self.publish_rx.recv() => ClientEvent::IdentityPublished { result },
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Send { text }) => ClientEvent::SendMessage { text, timestamp: None },
                    Some(Command::Teardown { clear_storage }) => ClientEvent::Teardown { clear_storage },
                    Some(Command::Close) => ClientEvent::Close,
                    None => {
                        commands_open = false;
                        ClientEvent::Close
                    },
                },
            };

            self.dispatch(event).await;
        }

        self.connecting = None;
        if let Some(transport) = self.transport.take() {
            transport.stop();
        }
        tracing::info!(state = ?self.client.channel_state(), "runtime stopped");

        Ok(())
    }

    fn finished(&self) -> bool {
        self.client.is_torn_down()
            || matches!(self.client.channel_state(), ChannelState::Closed | ChannelState::Failed)
    }

    async fn dispatch(&mut self, event: ClientEvent<E::Instant>) {
        match self.client.handle(event) {
            Ok(actions) => self.execute(actions).await,
            Err(e) if e.is_transient() => tracing::warn!(error = %e, "client event rejected"),
            Err(e) => tracing::error!(error = %e, "client event failed"),
        }
    }

    /// Execute actions, feeding transport outcomes back into the client.
    async fn execute(&mut self, actions: Vec<ClientAction>) {
        let mut pending = VecDeque::from(actions);

        while let Some(action) = pending.pop_front() {
            let follow_up = match action {
                ClientAction::Connect { url_path } => {
                    self.connect(&url_path);
                    None
                },
                ClientAction::Send(text) => {
                    self.send(text).await;
                    None
                },
                ClientAction::Disconnect { reason } => {
                    // dropping the handle closes the socket gracefully
                    self.transport = None;
                    self.connecting = None;
                    Some(ClientEvent::TransportClosed { reason })
                },
                ClientAction::PublishIdentity(publication) => {
                    self.publish(publication);
                    None
                },
                action => {
                    if self.output.send(action).await.is_err() {
                        tracing::debug!("application output closed");
                    }
                    None
                },
            };

            if let Some(event) = follow_up {
                match self.client.handle(event) {
                    Ok(actions) => pending.extend(actions),
                    Err(e) => tracing::warn!(error = %e, "transport event rejected"),
                }
            }
        }
    }

    /// Start a handshake. Its outcome arrives through the event loop.
    fn connect(&mut self, url_path: &str) {
        let url = format!("{}{url_path}", self.config.server_url.trim_end_matches('/'));
        let timeout = self.config.connect_timeout;

        tracing::debug!(%url, "connecting to relay");
        self.connecting = Some(Box::pin(async move {
            let transport = transport::connect_with_timeout(&url, timeout).await;
            if let Err(e) = &transport {
                tracing::warn!(%url, error = %e, "connect failed");
            }
            transport
        }));
    }

    fn connected(
        &mut self,
        result: Result<ConnectedTransport, TransportError>,
    ) -> ClientEvent<E::Instant> {
        match result {
            Ok(transport) => {
                tracing::info!("connected to relay");
                self.transport = Some(transport);
                ClientEvent::TransportOpened
            },
            Err(e) => ClientEvent::TransportClosed { reason: e.to_string() },
        }
    }

    async fn send(&mut self, text: String) {
        let Some(transport) = &self.transport else {
            tracing::warn!("no transport, dropping outbound payload");
            return;
        };
        if transport.to_server.send(text).await.is_err() {
            tracing::warn!("transport task ended, dropping outbound payload");
        }
    }

    fn publish(&self, publication: IdentityPublication) {
        let Some(publisher) = self.publisher.clone() else {
            tracing::debug!("no identity registry configured, skipping publication");
            return;
        };
        let results = self.publish_tx.clone();

        tokio::spawn(async move {
            let result = publisher.publish(&publication).await.map_err(|e| e.to_string());
            let _ = results.send(result).await;
        });
    }
}

/// Outcome of the handshake in flight, pending forever without one.
async fn next_connect_outcome(
    connecting: &mut Option<PendingConnect>,
) -> Result<ConnectedTransport, TransportError> {
    match connecting {
        Some(connect) => connect.await,
        None => future::pending().await,
    }
}

/// Next event of the current transport, pending forever without one.
async fn next_transport_event(transport: &mut Option<ConnectedTransport>) -> Option<TransportEvent> {
    match transport {
        Some(transport) => Some(transport.from_server.recv().await.unwrap_or_else(|| {
            TransportEvent::Closed { reason: "transport task ended".to_string() }
        })),
        None => future::pending().await,
    }
}
