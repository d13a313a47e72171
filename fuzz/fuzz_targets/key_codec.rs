//! Fuzz target for sealing and unsealing private keys
//!
//! # Strategy
//!
//! - Seal a key under one code, open it under another
//! - Open attacker-chosen ciphertexts and nonces
//! - Compute shared secrets against arbitrary peer points
//!
//! # Invariants
//!
//! - The sealing code always recovers the original key
//! - A code that derives a different key never recovers it
//! - Arbitrary ciphertexts fail cleanly
//! - Diffie-Hellman agrees in both directions or rejects both
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use hushlink_crypto::{
    IdentityKey, NONCE_SIZE, PrivateKey, PublicKey, derive_key, diffie_hellman, key_codec,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum CodecInput {
    RoundTrip { secret: [u8; 32], nonce: [u8; NONCE_SIZE], code: String, guess: String },
    OpenGarbage { ciphertext: Vec<u8>, nonce: [u8; NONCE_SIZE], code: String },
    Exchange { ours: [u8; 32], theirs: [u8; 32], point: [u8; 32] },
}

fuzz_target!(|input: CodecInput| {
    match input {
        CodecInput::RoundTrip { secret, nonce, code, guess } => {
            let key = derive_key(&code);
            let identity = IdentityKey::generate(secret, nonce, &key);

            let recovered = identity.recover_private_key(&key).expect("sealing code opens");
            assert_eq!(recovered.public_key(), identity.public_key);

            let guessed = derive_key(&guess);
            if guessed.as_bytes() != key.as_bytes() {
                assert!(identity.recover_private_key(&guessed).is_err());
            }
        },
        CodecInput::OpenGarbage { ciphertext, nonce, code } => {
            let _ = key_codec::decrypt(&ciphertext, &nonce, &derive_key(&code));
        },
        CodecInput::Exchange { ours, theirs, point } => {
            let ours = PrivateKey::from_bytes(ours);
            let theirs = PrivateKey::from_bytes(theirs);

            let forward = diffie_hellman(&theirs.public_key(), &ours);
            let backward = diffie_hellman(&ours.public_key(), &theirs);
            assert_eq!(forward, backward);

            let _ = diffie_hellman(&PublicKey::from_bytes(point), &ours);
        },
    }
});
