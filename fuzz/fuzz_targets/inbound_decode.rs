//! Fuzz target for relay payload parsing
//!
//! Feeds arbitrary text to `Inbound::parse` and to both persisted record
//! decoders.
//!
//! # Invariants
//!
//! - NEVER panic, whatever the input
//! - Parsing is deterministic
//! - A decoded ephemeral record re-encodes to a record that decodes equal

#![no_main]

use hushlink_proto::{EphemeralKeyRecord, IdentityKeyRecord, Inbound};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    let first = Inbound::parse(&text);
    let second = Inbound::parse(&text);
    assert_eq!(first.is_ok(), second.is_ok());
    if let (Ok(first), Ok(second)) = (first, second) {
        assert_eq!(first, second);
    }

    let _ = IdentityKeyRecord::from_json(&text);

    if let Ok(record) = EphemeralKeyRecord::from_json(&text) {
        let json = record.to_json().expect("decoded record re-encodes");
        let again = EphemeralKeyRecord::from_json(&json).expect("re-encoded record decodes");
        assert_eq!(again.public_key, record.public_key);
        assert_eq!(again.seq, record.seq);
    }
});
