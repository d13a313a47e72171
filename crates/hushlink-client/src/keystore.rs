//! Identity and ephemeral key stores.
//!
//! Both stores persist through a [`KeyStorage`] under session-scoped names.
//! The identity store never writes a private key in clear form; the
//! ephemeral store holds the current connection's pair so that its private
//! half is retrievable before the public half is announced.

use hushlink_core::{Environment, SecretCode, SessionId};
use hushlink_crypto::{
    CryptoError, EphemeralKeyPair, IdentityKey, NONCE_SIZE, PrivateKey, PublicKey, derive_key,
};
use hushlink_proto::{
    EphemeralKeyRecord, IdentityKeyRecord, ProtocolError, ephemeral_key_name, identity_key_name,
};

use crate::{
    error::KeyStoreError,
    storage::{KeyStorage, StorageError},
};

/// Long-lived per-session identity keys.
#[derive(Clone)]
pub struct IdentityKeyStore<S: KeyStorage> {
    storage: S,
}

impl<S: KeyStorage> IdentityKeyStore<S> {
    /// Store backed by `storage`.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Stored identity for `session_id`, if any.
    pub fn load(&self, session_id: SessionId) -> Result<Option<IdentityKey>, KeyStoreError> {
        let name = identity_key_name(session_id);
        let Some(json) = self.storage.load(&name)? else {
            return Ok(None);
        };

        let record = IdentityKeyRecord::from_json(&json).map_err(|e| corrupted(&name, &e))?;

        Ok(Some(IdentityKey {
            public_key: PublicKey::from_bytes(record.public_key),
            encrypted_private_key: record.encrypted_private_key,
            nonce: record.nonce,
        }))
    }

    /// Identity for `session_id`, generated and persisted on first use.
    ///
    /// Idempotent: an existing identity is returned as is, never regenerated,
    /// whatever `secret_code` is passed. The boolean is true if the identity
    /// was created by this call.
    ///
    /// # Errors
    ///
    /// - `KeyStoreError::Storage` if the storage cannot be read or written
    /// - `KeyStoreError::Corrupted` if a stored record cannot be decoded
    pub fn get_or_create<E: Environment>(
        &self,
        env: &E,
        session_id: SessionId,
        secret_code: &SecretCode,
    ) -> Result<(IdentityKey, bool), KeyStoreError> {
        if let Some(identity) = self.load(session_id)? {
            return Ok((identity, false));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        env.random_bytes(&mut nonce);

        let identity =
            IdentityKey::generate(env.random_key_bytes(), nonce, &derive_key(secret_code.as_str()));

        let record = IdentityKeyRecord {
            public_key: *identity.public_key.as_bytes(),
            encrypted_private_key: identity.encrypted_private_key.clone(),
            nonce: identity.nonce,
        };
        let name = identity_key_name(session_id);
        let json = record.to_json().map_err(|e| corrupted(&name, &e))?;
        self.storage.store(&name, &json)?;

        tracing::info!(
            session = %session_id,
            public_key = %identity.public_key.fingerprint(),
            "created identity key"
        );

        Ok((identity, true))
    }

    /// Unseal the identity private key with the secret code.
    ///
    /// # Errors
    ///
    /// - `CryptoError::DecryptionFailed` if the code is wrong or the record
    ///   was modified
    pub fn recover_private_key(
        identity: &IdentityKey,
        secret_code: &SecretCode,
    ) -> Result<PrivateKey, CryptoError> {
        identity.recover_private_key(&derive_key(secret_code.as_str()))
    }

    /// Delete the identity of `session_id`.
    pub fn remove(&self, session_id: SessionId) -> Result<(), StorageError> {
        self.storage.remove(&identity_key_name(session_id))
    }
}

/// Per-connection ephemeral keys.
#[derive(Clone)]
pub struct EphemeralKeyStore<S: KeyStorage> {
    storage: S,
}

impl<S: KeyStorage> EphemeralKeyStore<S> {
    /// Store backed by `storage`.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Mint a fresh key pair. Touches nothing but the environment RNG.
    pub fn generate<E: Environment>(env: &E) -> EphemeralKeyPair {
        EphemeralKeyPair::from_secret(env.random_key_bytes())
    }

    /// Durably record `pair` as the current key of `session_id`, together
    /// with the sequence number of its announcement.
    ///
    /// Returns only after the storage accepted the write.
    pub fn persist(
        &self,
        session_id: SessionId,
        pair: &EphemeralKeyPair,
        seq: u64,
    ) -> Result<(), KeyStoreError> {
        let record = EphemeralKeyRecord {
            public_key: *pair.public_key().as_bytes(),
            private_key: *pair.private_key().to_bytes(),
            seq,
        };
        let name = ephemeral_key_name(session_id);
        let json = zeroize::Zeroizing::new(record.to_json().map_err(|e| corrupted(&name, &e))?);

        self.storage.store(&name, &json)?;
        Ok(())
    }

    /// Current key of `session_id` and its announcement number, if any.
    ///
    /// # Errors
    ///
    /// - `KeyStoreError::Corrupted` if the record does not decode or its
    ///   halves do not belong together
    pub fn load(
        &self,
        session_id: SessionId,
    ) -> Result<Option<(EphemeralKeyPair, u64)>, KeyStoreError> {
        let name = ephemeral_key_name(session_id);
        let Some(json) = self.storage.load(&name)?.map(zeroize::Zeroizing::new) else {
            return Ok(None);
        };

        let record = EphemeralKeyRecord::from_json(&json).map_err(|e| corrupted(&name, &e))?;
        let pair = EphemeralKeyPair::from_secret(record.private_key);

        if pair.public_key().as_bytes() != &record.public_key {
            return Err(KeyStoreError::Corrupted {
                name,
                reason: "public key does not match private key".to_string(),
            });
        }

        Ok(Some((pair, record.seq)))
    }

    /// Delete the ephemeral key of `session_id`.
    pub fn discard(&self, session_id: SessionId) -> Result<(), StorageError> {
        self.storage.remove(&ephemeral_key_name(session_id))
    }
}

fn corrupted(name: &str, err: &ProtocolError) -> KeyStoreError {
    KeyStoreError::Corrupted { name: name.to_string(), reason: err.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::MemoryStorage, testing::TestEnv};

    #[test]
    fn identity_is_created_once() {
        let env = TestEnv::new(1);
        let store = IdentityKeyStore::new(MemoryStorage::new());
        let code = SecretCode::new("482913");

        let (first, created) = store.get_or_create(&env, SessionId(1), &code).unwrap();
        assert!(created);

        let (second, created) = store.get_or_create(&env, SessionId(1), &code).unwrap();
        assert!(!created);
        assert_eq!(first, second);
    }

    #[test]
    fn identity_is_session_scoped() {
        let env = TestEnv::new(1);
        let store = IdentityKeyStore::new(MemoryStorage::new());
        let code = SecretCode::new("482913");

        let (a, _) = store.get_or_create(&env, SessionId(1), &code).unwrap();
        let (b, _) = store.get_or_create(&env, SessionId(2), &code).unwrap();

        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn identity_never_stored_in_clear() {
        let env = TestEnv::new(1);
        let storage = MemoryStorage::new();
        let store = IdentityKeyStore::new(storage.clone());
        let code = SecretCode::new("482913");

        let (identity, _) = store.get_or_create(&env, SessionId(1), &code).unwrap();
        let private = IdentityKeyStore::<MemoryStorage>::recover_private_key(&identity, &code)
            .unwrap();

        let stored = storage.load("identityKey-1").unwrap().unwrap();
        let record = IdentityKeyRecord::from_json(&stored).unwrap();
        assert_ne!(record.encrypted_private_key[..32], private.to_bytes()[..]);
        assert_eq!(private.public_key(), identity.public_key);
    }

    #[test]
    fn wrong_code_cannot_recover() {
        let env = TestEnv::new(1);
        let store = IdentityKeyStore::new(MemoryStorage::new());

        let (identity, _) =
            store.get_or_create(&env, SessionId(1), &SecretCode::new("482913")).unwrap();

        let result = IdentityKeyStore::<MemoryStorage>::recover_private_key(
            &identity,
            &SecretCode::new("000000"),
        );
        assert!(matches!(result, Err(CryptoError::DecryptionFailed { .. })));
    }

    #[test]
    fn corrupted_identity_is_reported_not_replaced() {
        let env = TestEnv::new(1);
        let storage = MemoryStorage::new();
        storage.store("identityKey-1", "not json").unwrap();
        let store = IdentityKeyStore::new(storage.clone());

        let result = store.get_or_create(&env, SessionId(1), &SecretCode::new("482913"));

        assert!(matches!(result, Err(KeyStoreError::Corrupted { .. })));
        assert_eq!(storage.load("identityKey-1").unwrap().as_deref(), Some("not json"));
    }

    #[test]
    fn generated_ephemeral_keys_differ() {
        let env = TestEnv::new(1);

        let a = EphemeralKeyStore::<MemoryStorage>::generate(&env);
        let b = EphemeralKeyStore::<MemoryStorage>::generate(&env);

        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn ephemeral_persist_load_discard() {
        let env = TestEnv::new(1);
        let store = EphemeralKeyStore::new(MemoryStorage::new());
        let pair = EphemeralKeyStore::<MemoryStorage>::generate(&env);

        store.persist(SessionId(3), &pair, 7).unwrap();

        let (loaded, seq) = store.load(SessionId(3)).unwrap().unwrap();
        assert_eq!(loaded.public_key(), pair.public_key());
        assert_eq!(seq, 7);

        store.discard(SessionId(3)).unwrap();
        assert!(store.load(SessionId(3)).unwrap().is_none());
    }

    #[test]
    fn mismatched_ephemeral_record_is_corrupted() {
        let storage = MemoryStorage::new();
        let record = EphemeralKeyRecord { public_key: [9u8; 32], private_key: [1u8; 32], seq: 0 };
        storage.store("ephemeralKey-3", &record.to_json().unwrap()).unwrap();

        let result = EphemeralKeyStore::new(storage).load(SessionId(3));

        assert!(matches!(result, Err(KeyStoreError::Corrupted { .. })));
    }
}
