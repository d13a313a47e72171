//! Private key protection under a human secret code.
//!
//! The secret code is turned into a 32-byte key by copying its UTF-8 bytes
//! into a zeroed buffer: shorter codes are zero-padded, longer codes are
//! truncated after byte 32. This is lossy on purpose (two codes sharing the
//! first 32 bytes unlock the same key) and must stay compatible with records
//! that already exist.
//!
//! Sealing uses `XChaCha20-Poly1305`. The nonce is provided by the caller and
//! MUST be fresh random bytes on every call.

use std::fmt;

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    error::CryptoError,
    keys::{KEY_SIZE, PrivateKey},
};

/// Size of the key derived from a secret code.
pub const DERIVED_KEY_SIZE: usize = 32;

/// Size of the `XChaCha20` nonce.
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const POLY1305_TAG_SIZE: usize = 16;

/// Symmetric key derived from a secret code.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; DERIVED_KEY_SIZE]);

impl DerivedKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// A private key sealed under a [`DerivedKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedKey {
    /// Ciphertext including the 16-byte Poly1305 tag
    pub ciphertext: Vec<u8>,
    /// The 24-byte nonce used for sealing
    pub nonce: [u8; NONCE_SIZE],
}

/// Derive the 32-byte sealing key from a secret code.
pub fn derive_key(secret_code: &str) -> DerivedKey {
    let code = secret_code.as_bytes();
    let len = code.len().min(DERIVED_KEY_SIZE);

    let mut key = [0u8; DERIVED_KEY_SIZE];
    key[..len].copy_from_slice(&code[..len]);

    DerivedKey(key)
}

/// Seal a private key.
pub fn encrypt(private_key: &PrivateKey, key: &DerivedKey, nonce: [u8; NONCE_SIZE]) -> SealedKey {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let plaintext = private_key.to_bytes();

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext.as_slice()) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    SealedKey { ciphertext, nonce }
}

/// Open a sealed private key.
///
/// # Errors
///
/// - `DecryptionFailed`: authentication tag does not verify (wrong code,
///   corrupted record, tampering) or the plaintext is not a key
pub fn decrypt(
    ciphertext: &[u8],
    nonce: &[u8; NONCE_SIZE],
    key: &DerivedKey,
) -> Result<PrivateKey, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptionFailed { reason: "authentication failed".to_string() })?;

    if plaintext.len() != KEY_SIZE {
        return Err(CryptoError::DecryptionFailed {
            reason: format!("expected {KEY_SIZE}-byte key, got {} bytes", plaintext.len()),
        });
    }

    PrivateKey::try_from(plaintext.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_private_key() -> PrivateKey {
        let mut bytes = [0u8; KEY_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = i as u8;
        }
        PrivateKey::from_bytes(bytes)
    }

    #[test]
    fn short_code_is_zero_padded() {
        let key = derive_key("123456");

        assert_eq!(&key.as_bytes()[..6], b"123456");
        assert!(key.as_bytes()[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn long_code_is_truncated() {
        let long = "a".repeat(40);
        let truncated = "a".repeat(32);

        assert_eq!(derive_key(&long).as_bytes(), derive_key(&truncated).as_bytes());
        assert_eq!(derive_key(&long).as_bytes(), &[b'a'; 32]);
    }

    #[test]
    fn empty_code_derives_all_zero_key() {
        assert_eq!(derive_key("").as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let private_key = test_private_key();
        let key = derive_key("482913");

        let sealed = encrypt(&private_key, &key, [0xAB; NONCE_SIZE]);
        let opened = decrypt(&sealed.ciphertext, &sealed.nonce, &key).unwrap();

        assert_eq!(*opened.to_bytes(), *private_key.to_bytes());
    }

    #[test]
    fn ciphertext_carries_tag() {
        let sealed = encrypt(&test_private_key(), &derive_key("482913"), [0; NONCE_SIZE]);

        assert_eq!(sealed.ciphertext.len(), KEY_SIZE + POLY1305_TAG_SIZE);
    }

    #[test]
    fn different_nonces_produce_different_ciphertexts() {
        let private_key = test_private_key();
        let key = derive_key("482913");

        let a = encrypt(&private_key, &key, [0x00; NONCE_SIZE]);
        let b = encrypt(&private_key, &key, [0xFF; NONCE_SIZE]);

        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_code_fails_decryption() {
        let sealed = encrypt(&test_private_key(), &derive_key("482913"), [0x11; NONCE_SIZE]);

        let result = decrypt(&sealed.ciphertext, &sealed.nonce, &derive_key("482914"));

        assert!(matches!(
            result,
            Err(CryptoError::DecryptionFailed { reason }) if reason.contains("authentication")
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let key = derive_key("482913");
        let mut sealed = encrypt(&test_private_key(), &key, [0x11; NONCE_SIZE]);
        sealed.ciphertext[0] ^= 0xFF;

        assert!(decrypt(&sealed.ciphertext, &sealed.nonce, &key).is_err());
    }

    #[test]
    fn tampered_nonce_fails_decryption() {
        let key = derive_key("482913");
        let mut sealed = encrypt(&test_private_key(), &key, [0x11; NONCE_SIZE]);
        sealed.nonce[23] ^= 0x01;

        assert!(decrypt(&sealed.ciphertext, &sealed.nonce, &key).is_err());
    }

    #[test]
    fn truncated_ciphertext_fails_decryption() {
        let key = derive_key("482913");
        let sealed = encrypt(&test_private_key(), &key, [0x11; NONCE_SIZE]);

        assert!(decrypt(&sealed.ciphertext[..10], &sealed.nonce, &key).is_err());
        assert!(decrypt(&[], &sealed.nonce, &key).is_err());
    }

    #[test]
    fn sealed_non_key_plaintext_is_rejected() {
        let key = derive_key("482913");
        let nonce = [0x22; NONCE_SIZE];
        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        let ciphertext = cipher.encrypt(XNonce::from_slice(&nonce), &b"short"[..]).unwrap();

        let result = decrypt(&ciphertext, &nonce, &key);

        assert!(matches!(
            result,
            Err(CryptoError::DecryptionFailed { reason }) if reason.contains("32-byte")
        ));
    }
}
