//! In-memory relay that behaves like the session server.
//!
//! Per session, the relay:
//!
//! - answers every new connection with a `self` announcement, then replays
//!   every stored `ephemeral_key` in arrival order
//! - enriches inbound payloads with `from`, `name` and `avatar`
//! - stores `ephemeral_key` payloads and fans them out to every connection,
//!   the sender included
//! - fans `message` payloads out to every connection except the sender
//! - answers bad input with `{ "error": "..." }`
//! - forgets the stored keys once the last connection of a session leaves
//!
//! Outbound payloads are queued per connection and drained by the caller.

use std::collections::{BTreeMap, HashMap, VecDeque};

use hushlink_core::{ParticipantId, SessionId};
use serde_json::{Map, Value, json};

/// Connection endpoint: session and participant.
pub type Endpoint = (SessionId, ParticipantId);

struct Connection {
    name: String,
    avatar: String,
    outbox: VecDeque<String>,
}

#[derive(Default)]
struct RelaySession {
    connections: BTreeMap<ParticipantId, Connection>,
    stored_keys: Vec<String>,
}

/// Simulated relay for any number of sessions.
#[derive(Default)]
pub struct SimRelay {
    sessions: HashMap<SessionId, RelaySession>,
}

impl SimRelay {
    /// Relay with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connect path of the form `/ws/{session}/{participant}`.
    pub fn parse_path(url_path: &str) -> Option<Endpoint> {
        let rest = url_path.strip_prefix("/ws/")?;
        let (session, participant) = rest.split_once('/')?;
        if participant.is_empty() || participant.contains('/') {
            return None;
        }
        Some((SessionId(session.parse().ok()?), ParticipantId::new(participant)))
    }

    /// Accept a connection. Queues `self` and the stored key replay.
    ///
    /// A second connection of the same participant replaces the first.
    pub fn connect(&mut self, endpoint: &Endpoint) {
        let (session_id, participant) = endpoint;
        let session = self.sessions.entry(*session_id).or_default();

        let name = format!("User {participant}");
        let avatar = format!("/static/avatars/{participant}.png");

        let mut outbox = VecDeque::new();
        outbox.push_back(json!({ "type": "self", "name": name, "avatar": avatar }).to_string());
        outbox.extend(session.stored_keys.iter().cloned());

        tracing::debug!(
            session = %session_id,
            %participant,
            replayed = session.stored_keys.len(),
            "relay accepted connection"
        );
        session.connections.insert(participant.clone(), Connection { name, avatar, outbox });
    }

    /// Drop a connection. Unknown endpoints are ignored.
    pub fn disconnect(&mut self, endpoint: &Endpoint) {
        let (session_id, participant) = endpoint;
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };

        session.connections.remove(participant);
        if session.connections.is_empty() {
            self.sessions.remove(session_id);
        }
    }

    /// Whether `endpoint` has a live connection.
    pub fn is_connected(&self, endpoint: &Endpoint) -> bool {
        self.sessions
            .get(&endpoint.0)
            .is_some_and(|session| session.connections.contains_key(&endpoint.1))
    }

    /// Handle a text payload sent by `endpoint`.
    pub fn receive(&mut self, endpoint: &Endpoint, text: &str) {
        let (session_id, participant) = endpoint;
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        let Some(sender) = session.connections.get_mut(participant) else {
            return;
        };

        let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(text) else {
            sender.outbox.push_back(error("Invalid JSON"));
            return;
        };

        let mut enriched = Map::new();
        enriched.insert("from".to_string(), json!(participant.as_str()));
        enriched.insert("name".to_string(), json!(sender.name));
        enriched.insert("avatar".to_string(), json!(sender.avatar));

        if payload.get("type").and_then(Value::as_str) == Some("ephemeral_key") {
            let Some(key) = payload.get("ephemeralPublicKey").filter(|key| key.is_string()) else {
                sender.outbox.push_back(error("Missing ephemeralPublicKey"));
                return;
            };
            enriched.insert("type".to_string(), json!("ephemeral_key"));
            enriched.insert("ephemeralPublicKey".to_string(), key.clone());
            if let Some(seq) = payload.get("seq") {
                enriched.insert("seq".to_string(), seq.clone());
            }

            let text = Value::Object(enriched).to_string();
            session.stored_keys.push(text.clone());
            for connection in session.connections.values_mut() {
                connection.outbox.push_back(text.clone());
            }
            return;
        }

        enriched.insert("type".to_string(), json!("message"));
        for field in ["text", "timestamp", "to"] {
            let value = payload.get(field).cloned().unwrap_or_else(|| json!(""));
            enriched.insert(field.to_string(), value);
        }

        let text = Value::Object(enriched).to_string();
        for (id, connection) in &mut session.connections {
            if id != participant {
                connection.outbox.push_back(text.clone());
            }
        }
    }

    /// Queue an arbitrary payload for `endpoint`, bypassing relay logic.
    pub fn inject(&mut self, endpoint: &Endpoint, text: impl Into<String>) {
        if let Some(connection) = self
            .sessions
            .get_mut(&endpoint.0)
            .and_then(|session| session.connections.get_mut(&endpoint.1))
        {
            connection.outbox.push_back(text.into());
        }
    }

    /// Take every payload queued for `endpoint`.
    pub fn drain(&mut self, endpoint: &Endpoint) -> Vec<String> {
        self.sessions
            .get_mut(&endpoint.0)
            .and_then(|session| session.connections.get_mut(&endpoint.1))
            .map(|connection| connection.outbox.drain(..).collect())
            .unwrap_or_default()
    }

    /// Stored `ephemeral_key` payloads of a session, oldest first.
    pub fn stored_keys(&self, session_id: SessionId) -> &[String] {
        self.sessions.get(&session_id).map_or(&[], |session| session.stored_keys.as_slice())
    }
}

fn error(message: &str) -> String {
    json!({ "error": message }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(participant: &str) -> Endpoint {
        (SessionId(1), ParticipantId::new(participant))
    }

    #[test]
    fn path_parsing() {
        assert_eq!(
            SimRelay::parse_path("/ws/12/abc"),
            Some((SessionId(12), ParticipantId::new("abc")))
        );
        assert_eq!(SimRelay::parse_path("/ws/x/abc"), None);
        assert_eq!(SimRelay::parse_path("/ws/1/"), None);
        assert_eq!(SimRelay::parse_path("/other/1/a"), None);
    }

    #[test]
    fn connect_sends_self_then_replay() {
        let mut relay = SimRelay::new();
        relay.connect(&endpoint("a"));
        relay.drain(&endpoint("a"));
        relay.receive(&endpoint("a"), r#"{"type":"ephemeral_key","ephemeralPublicKey":"k","seq":1}"#);

        relay.connect(&endpoint("b"));
        let queued = relay.drain(&endpoint("b"));

        assert_eq!(queued.len(), 2);
        assert!(queued[0].contains(r#""type":"self""#));
        assert!(queued[1].contains(r#""from":"a""#));
        assert!(queued[1].contains(r#""seq":1"#));
    }

    #[test]
    fn keys_reach_sender_messages_do_not() {
        let mut relay = SimRelay::new();
        relay.connect(&endpoint("a"));
        relay.connect(&endpoint("b"));
        relay.drain(&endpoint("a"));
        relay.drain(&endpoint("b"));

        relay.receive(&endpoint("a"), r#"{"type":"ephemeral_key","ephemeralPublicKey":"k"}"#);
        relay.receive(&endpoint("a"), r#"{"type":"message","text":"hi"}"#);

        assert_eq!(relay.drain(&endpoint("a")).len(), 1);
        assert_eq!(relay.drain(&endpoint("b")).len(), 2);
    }

    #[test]
    fn bad_input_gets_error_notice() {
        let mut relay = SimRelay::new();
        relay.connect(&endpoint("a"));
        relay.drain(&endpoint("a"));

        relay.receive(&endpoint("a"), "nope");
        relay.receive(&endpoint("a"), r#"{"type":"ephemeral_key"}"#);

        assert_eq!(relay.drain(&endpoint("a")), vec![
            r#"{"error":"Invalid JSON"}"#.to_string(),
            r#"{"error":"Missing ephemeralPublicKey"}"#.to_string(),
        ]);
    }

    #[test]
    fn last_disconnect_forgets_keys() {
        let mut relay = SimRelay::new();
        relay.connect(&endpoint("a"));
        relay.receive(&endpoint("a"), r#"{"type":"ephemeral_key","ephemeralPublicKey":"k"}"#);
        assert_eq!(relay.stored_keys(SessionId(1)).len(), 1);

        relay.disconnect(&endpoint("a"));

        assert!(relay.stored_keys(SessionId(1)).is_empty());
        assert!(!relay.is_connected(&endpoint("a")));
    }
}
