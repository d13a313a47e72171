//! Property-based tests for payload parsing and encoding
//!
//! The parser sits directly behind the network, so it is checked against
//! arbitrary text as well as against everything the client itself produces.

use hushlink_proto::{
    EphemeralKeyAnnounce, EphemeralKeyRecord, Inbound, InboundMessage, OutboundMessage,
    OutgoingChatMessage, ProtocolError,
};
use proptest::prelude::*;

/// Strategy for outbound payloads
fn arbitrary_outbound() -> impl Strategy<Value = OutboundMessage> {
    prop_oneof![
        (any::<[u8; 32]>(), any::<u64>()).prop_map(|(public_key, seq)| {
            OutboundMessage::EphemeralKey(EphemeralKeyAnnounce { public_key, seq })
        }),
        (".{0,64}", "[0-9]{2}:[0-9]{2}", ".{0,16}", ".{0,32}").prop_map(
            |(text, timestamp, name, avatar)| {
                OutboundMessage::Message(OutgoingChatMessage {
                    text,
                    timestamp,
                    name,
                    avatar,
                    to: String::new(),
                })
            }
        ),
    ]
}

/// Adds `from` the way the relay does before fanning a payload out.
fn relay_enrich(encoded: &str, from: &str) -> String {
    let mut value: serde_json::Value = serde_json::from_str(encoded).unwrap();
    value["from"] = serde_json::Value::String(from.to_string());
    value.to_string()
}

proptest! {
    /// The parser never panics, whatever the relay sends.
    #[test]
    fn parse_never_panics(text in ".{0,512}") {
        let _ = Inbound::parse(&text);
    }

    /// Random bytes that happen to be valid UTF-8 never panic either.
    #[test]
    fn parse_never_panics_on_bytes(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        if let Ok(text) = std::str::from_utf8(&bytes) {
            let _ = Inbound::parse(text);
        }
    }

    /// Objects with a type outside the known set are always rejected as unknown.
    #[test]
    fn unknown_types_are_rejected(kind in "[a-z_]{1,16}") {
        prop_assume!(!["self", "ephemeral_key", "message"].contains(&kind.as_str()));

        let text = serde_json::json!({ "type": kind, "from": "p-1" }).to_string();

        prop_assert_eq!(Inbound::parse(&text), Err(ProtocolError::UnknownType { kind }));
    }

    /// Everything the client sends is readable by peers once the relay adds `from`.
    #[test]
    fn outbound_is_inbound_compatible(message in arbitrary_outbound(), from in "[a-f0-9-]{1,36}") {
        let encoded = message.encode().unwrap();
        let parsed = Inbound::parse(&relay_enrich(&encoded, &from)).unwrap();

        match (message, parsed) {
            (
                OutboundMessage::EphemeralKey(sent),
                Inbound::Message(InboundMessage::EphemeralKey(received)),
            ) => {
                prop_assert_eq!(received.public_key, sent.public_key);
                prop_assert_eq!(received.seq, sent.seq);
                prop_assert_eq!(received.from.as_str(), from.as_str());
            },
            (
                OutboundMessage::Message(sent),
                Inbound::Message(InboundMessage::Message(received)),
            ) => {
                prop_assert_eq!(received.text, sent.text);
                prop_assert_eq!(received.timestamp, sent.timestamp);
                prop_assert_eq!(received.name, sent.name);
                prop_assert_eq!(received.from.as_str(), from.as_str());
            },
            (sent, received) => {
                prop_assert!(false, "kind changed: {:?} -> {:?}", sent, received);
            },
        }
    }

    /// Stored ephemeral records read back with the same keys and sequence.
    #[test]
    fn ephemeral_record_survives_storage(
        public_key in any::<[u8; 32]>(),
        private_key in any::<[u8; 32]>(),
        seq in any::<u64>(),
    ) {
        let record = EphemeralKeyRecord { public_key, private_key, seq };

        let restored = EphemeralKeyRecord::from_json(&record.to_json().unwrap()).unwrap();

        prop_assert_eq!(restored, record);
    }
}
