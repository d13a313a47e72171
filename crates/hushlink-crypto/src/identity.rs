//! Long-lived identity key with a sealed private half.

use crate::{
    error::CryptoError,
    key_codec::{self, DerivedKey, NONCE_SIZE},
    keys::{KEY_SIZE, PrivateKey, PublicKey},
};

/// Identity key pair as it is persisted for a session.
///
/// The private half only exists sealed under the key derived from the
/// participant's secret code. The same code must be entered again to recover
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey {
    /// X25519 public key, published for discovery
    pub public_key: PublicKey,
    /// Sealed private key (ciphertext including tag)
    pub encrypted_private_key: Vec<u8>,
    /// Nonce used to seal the private key
    pub nonce: [u8; NONCE_SIZE],
}

impl IdentityKey {
    /// Build a new identity from caller-provided randomness.
    ///
    /// `secret` becomes the private scalar and is wiped afterwards. `nonce`
    /// MUST be fresh random bytes.
    pub fn generate(secret: [u8; KEY_SIZE], nonce: [u8; NONCE_SIZE], key: &DerivedKey) -> Self {
        let private_key = PrivateKey::from_bytes(secret);
        let public_key = private_key.public_key();
        let sealed = key_codec::encrypt(&private_key, key, nonce);

        Self { public_key, encrypted_private_key: sealed.ciphertext, nonce: sealed.nonce }
    }

    /// Recover the private half.
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed` if the code is wrong, the record is corrupted, or
    ///   the recovered key does not belong to `public_key`
    pub fn recover_private_key(&self, key: &DerivedKey) -> Result<PrivateKey, CryptoError> {
        let private_key = key_codec::decrypt(&self.encrypted_private_key, &self.nonce, key)?;

        if private_key.public_key() != self.public_key {
            return Err(CryptoError::DecryptionFailed {
                reason: "recovered key does not match identity public key".to_string(),
            });
        }

        Ok(private_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_codec::derive_key;

    #[test]
    fn generate_then_recover() {
        let key = derive_key("135790");
        let identity = IdentityKey::generate([0x5A; KEY_SIZE], [0x01; NONCE_SIZE], &key);

        let private_key = identity.recover_private_key(&key).unwrap();

        assert_eq!(private_key.public_key(), identity.public_key);
    }

    #[test]
    fn wrong_code_cannot_recover() {
        let identity =
            IdentityKey::generate([0x5A; KEY_SIZE], [0x01; NONCE_SIZE], &derive_key("135790"));

        let result = identity.recover_private_key(&derive_key("000000"));

        assert!(matches!(result, Err(CryptoError::DecryptionFailed { .. })));
    }

    #[test]
    fn swapped_public_key_is_detected() {
        let key = derive_key("135790");
        let mut identity = IdentityKey::generate([0x5A; KEY_SIZE], [0x01; NONCE_SIZE], &key);
        identity.public_key = PrivateKey::from_bytes([0x5B; KEY_SIZE]).public_key();

        let result = identity.recover_private_key(&key);

        assert!(matches!(
            result,
            Err(CryptoError::DecryptionFailed { reason }) if reason.contains("does not match")
        ));
    }

    #[test]
    fn private_key_is_not_stored_in_clear() {
        let secret = [0x5A; KEY_SIZE];
        let identity = IdentityKey::generate(secret, [0x01; NONCE_SIZE], &derive_key("135790"));

        assert!(!identity.encrypted_private_key.windows(KEY_SIZE).any(|w| w == secret));
    }
}
