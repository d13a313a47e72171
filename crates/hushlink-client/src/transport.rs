//! WebSocket transport for the session channel.
//!
//! Provides [`ConnectedTransport`] which handles WebSocket I/O for text
//! payloads. This is a thin layer that just sends and receives text; protocol
//! logic remains in the Sans-IO [`Client`](crate::Client).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Handshake did not complete in time.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Identity registry call failed.
    #[error("identity publication failed: {0}")]
    Publish(String),
}

/// What the connection task reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Text payload from the relay.
    Text(String),

    /// Connection is gone. Always the last event.
    Closed {
        /// Close frame reason or stream error
        reason: String,
    },
}

/// Handle to an open WebSocket connection.
///
/// Payloads are sent and received via the channels, and an internal task
/// handles the WebSocket I/O. Dropping `to_server` closes the connection
/// gracefully.
pub struct ConnectedTransport {
    /// Send text payloads to the relay.
    pub to_server: mpsc::Sender<String>,
    /// Receive payloads and the final close from the relay.
    pub from_server: mpsc::Receiver<TransportEvent>,
    /// Abort handle to stop the connection task.
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedTransport {
    /// Stop the connection without a close handshake.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Open a WebSocket to `url` (`ws://` or `wss://`).
pub async fn connect(url: &str) -> Result<ConnectedTransport, TransportError> {
    let (stream, _response) =
        connect_async(url).await.map_err(|e| TransportError::Connection(e.to_string()))?;

    tracing::debug!(%url, "websocket connected");

    let (to_server_tx, to_server_rx) = mpsc::channel::<String>(32);
    let (from_server_tx, from_server_rx) = mpsc::channel::<TransportEvent>(32);

    let handle = tokio::spawn(run_connection(stream, to_server_rx, from_server_tx));

    Ok(ConnectedTransport {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Open a WebSocket, giving up if the handshake takes longer than `timeout`.
///
/// # Errors
///
/// - `TransportError::Timeout` if the relay accepted the socket but never
///   finished the handshake
/// - `TransportError::Connection` if the connection was refused or failed
pub async fn connect_with_timeout(
    url: &str,
    timeout: Duration,
) -> Result<ConnectedTransport, TransportError> {
    tokio::time::timeout(timeout, connect(url))
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Bridge between the channels and the WebSocket until either side ends.
async fn run_connection(
    stream: WsStream,
    mut to_server: mpsc::Receiver<String>,
    from_server: mpsc::Sender<TransportEvent>,
) {
    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            outgoing = to_server.recv() => {
                let Some(text) = outgoing else {
                    let _ = write.send(Message::Close(None)).await;
                    break "closed by client".to_string();
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    break TransportError::Stream(e.to_string()).to_string();
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if from_server.send(TransportEvent::Text(text)).await.is_err() {
                        break "receiver dropped".to_string();
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || "closed by relay".to_string(),
                        |frame| format!("closed by relay: {}", frame.reason),
                    );
                },
                // ping/pong is answered by tungstenite; binary is not part of the protocol
                Some(Ok(_)) => {},
                Some(Err(e)) => break TransportError::Stream(e.to_string()).to_string(),
                None => break "stream ended".to_string(),
            },
        }
    };

    tracing::debug!(%reason, "websocket closed");
    let _ = from_server.send(TransportEvent::Closed { reason }).await;
}
