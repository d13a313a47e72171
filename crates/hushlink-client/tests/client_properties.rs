//! Property-based tests for the client state machine
//!
//! 1. **Robustness**: arbitrary inbound text never fails the client or closes
//!    the channel
//! 2. **Self-exclusion**: the local participant never enters the peer keys
//! 3. **Correct secrets**: every exposed shared secret equals a fresh
//!    Diffie-Hellman over the current keys

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use hushlink_client::{
    ChannelConfig, ChannelState, Client, ClientEvent, Environment, MemoryStorage, ParticipantId,
    SecretCode, SessionContext, SessionId,
};
use hushlink_crypto::{PrivateKey, diffie_hellman};
use proptest::prelude::*;

#[derive(Clone)]
struct CounterEnv(Arc<Mutex<u8>>);

impl Environment for CounterEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        Duration::ZERO
    }

    fn wall_clock_secs(&self) -> u64 {
        0
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let mut counter = self.0.lock().unwrap();
        *counter = counter.wrapping_add(1);
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = counter.wrapping_add(i as u8);
        }
    }
}

fn open_client() -> Client<CounterEnv, MemoryStorage> {
    let context = SessionContext::verified(
        SessionId(1),
        ParticipantId::new("local"),
        SecretCode::new("123456"),
    );
    let mut client = Client::new(
        CounterEnv(Arc::new(Mutex::new(0))),
        context,
        MemoryStorage::new(),
        ChannelConfig::default(),
    )
    .unwrap();

    client.handle(ClientEvent::Start).unwrap();
    client.handle(ClientEvent::TransportOpened).unwrap();
    client
}

/// Inbound payloads: valid keys for a few peers (including self), messages,
/// self announcements, notices and junk.
fn arbitrary_payload() -> impl Strategy<Value = String> {
    let key = (0u8..4, 1u8..=255, 0u64..6).prop_map(|(peer, byte, seq)| {
        let from = if peer == 0 { "local".to_string() } else { format!("peer-{peer}") };
        let public = PrivateKey::from_bytes([byte; 32]).public_key();
        let encoded = STANDARD.encode(public.as_bytes());
        format!(
            r#"{{"type":"ephemeral_key","from":"{from}","ephemeralPublicKey":"{encoded}","seq":{seq}}}"#
        )
    });

    prop_oneof![
        4 => key,
        1 => Just(r#"{"type":"self","name":"n","avatar":"a"}"#.to_string()),
        1 => Just(r#"{"type":"message","from":"peer-1","text":"hi"}"#.to_string()),
        1 => Just(r#"{"error":"Ephemeral key missing"}"#.to_string()),
        2 => ".*",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_inbound_never_breaks_client(
        payloads in prop::collection::vec(arbitrary_payload(), 0..40),
    ) {
        let mut client = open_client();

        for text in payloads {
            prop_assert!(client.handle(ClientEvent::TextReceived { text }).is_ok(), "inbound text event returned an error");
        }

        prop_assert_eq!(client.channel_state(), ChannelState::Open);
        prop_assert!(!client.peer_keys().contains_key(&ParticipantId::new("local")));
    }

    #[test]
    fn prop_exposed_secrets_match_current_keys(
        payloads in prop::collection::vec(arbitrary_payload(), 0..40),
    ) {
        let mut client = open_client();
        for text in payloads {
            client.handle(ClientEvent::TextReceived { text }).unwrap();
        }

        for (peer, peer_key) in client.peer_keys() {
            let Some(secret) = client.shared_secret(&peer) else { continue };
            let local = client.ephemeral_public_key().unwrap();

            // recompute from the peer side: the peer private key is [byte; 32]
            let byte = (1u8..=255)
                .find(|b| PrivateKey::from_bytes([*b; 32]).public_key() == peer_key)
                .unwrap();
            let expected = diffie_hellman(&local, &PrivateKey::from_bytes([byte; 32])).unwrap();
            prop_assert_eq!(secret, &expected);
        }
    }
}
