//! Fuzz target for the client state machine
//!
//! Drives one client through an arbitrary sequence of transport events,
//! relay payloads, timer ticks and application commands.
//!
//! # Invariants
//!
//! - `handle` never panics
//! - Relay payloads never fail the client
//! - The local participant never appears among the peer keys
//! - Every exposed secret belongs to the current keys
//! - After teardown no key material is reachable

#![no_main]

use std::{collections::HashMap, time::Duration};

use arbitrary::Arbitrary;
use base64::{Engine, engine::general_purpose::STANDARD};
use hushlink_client::{
    ChannelConfig, Client, ClientEvent, Environment, MemoryStorage, ParticipantId, SecretCode,
    SessionContext, SessionId,
};
use hushlink_crypto::{PrivateKey, diffie_hellman};
use hushlink_harness::SimEnv;
use libfuzzer_sys::fuzz_target;

const LOCAL: &str = "local";
const PEERS: [&str; 3] = [LOCAL, "peer-1", "peer-2"];

#[derive(Debug, Arbitrary)]
enum Step {
    Opened,
    Closed,
    SelfIdentity,
    PeerKey { peer: u8, secret: [u8; 32], seq: u8 },
    Message { peer: u8, text: String },
    Raw(String),
    Tick { millis: u16 },
    Send(String),
    Close,
    Teardown { clear_storage: bool },
}

#[derive(Debug, Arbitrary)]
struct Input {
    seed: u64,
    steps: Vec<Step>,
}

fuzz_target!(|input: Input| {
    let env = SimEnv::with_seed(input.seed);
    let context = SessionContext::verified(
        SessionId(1),
        ParticipantId::new(LOCAL),
        SecretCode::new("123456"),
    );
    let mut client =
        Client::new(env.clone(), context, MemoryStorage::new(), ChannelConfig::default())
            .expect("memory storage never fails");
    client.handle(ClientEvent::Start).expect("fresh client starts");
    let mut peer_secrets = HashMap::new();

    for step in input.steps.into_iter().take(256) {
        let event = match step {
            Step::Opened => ClientEvent::TransportOpened,
            Step::Closed => ClientEvent::TransportClosed { reason: "fuzz".to_string() },
            Step::SelfIdentity => ClientEvent::TextReceived {
                text: r#"{"type":"self","name":"n","avatar":"a"}"#.to_string(),
            },
            Step::PeerKey { peer, secret, seq } => {
                let from = PEERS[usize::from(peer) % PEERS.len()];
                let public = PrivateKey::from_bytes(secret).public_key();
                peer_secrets.insert(public, secret);
                let encoded = STANDARD.encode(public.as_bytes());
                ClientEvent::TextReceived {
                    text: format!(
                        r#"{{"type":"ephemeral_key","from":"{from}","ephemeralPublicKey":"{encoded}","seq":{seq}}}"#
                    ),
                }
            },
            Step::Message { peer, text } => {
                let from = PEERS[usize::from(peer) % PEERS.len()];
                ClientEvent::TextReceived {
                    text: format!(r#"{{"type":"message","from":"{from}","text":{text:?}}}"#),
                }
            },
            Step::Raw(text) => ClientEvent::TextReceived { text },
            Step::Tick { millis } => {
                env.advance(Duration::from_millis(u64::from(millis)));
                ClientEvent::Tick { now: env.now() }
            },
            Step::Send(text) => ClientEvent::SendMessage { text, timestamp: None },
            Step::Close => ClientEvent::Close,
            Step::Teardown { clear_storage } => ClientEvent::Teardown { clear_storage },
        };

        let inbound = matches!(event, ClientEvent::TextReceived { .. });
        let result = client.handle(event);
        if inbound {
            assert!(result.is_ok(), "relay payload failed the client: {result:?}");
        }

        assert!(!client.peer_keys().contains_key(&ParticipantId::new(LOCAL)));
    }

    if let Some(local) = client.ephemeral_public_key() {
        for (peer, peer_key) in client.peer_keys() {
            let Some(secret) = client.shared_secret(&peer) else { continue };
            // raw payloads may carry keys with unknown private halves
            let Some(peer_secret) = peer_secrets.get(&peer_key) else { continue };
            let expected = diffie_hellman(&local, &PrivateKey::from_bytes(*peer_secret))
                .expect("an exposed secret was derivable");
            assert_eq!(secret, &expected);
        }
    }

    if client.is_torn_down() {
        assert!(client.peer_keys().is_empty());
        assert_eq!(client.ephemeral_public_key(), None);
        assert_eq!(client.identity_public_key(), None);
    }
});
