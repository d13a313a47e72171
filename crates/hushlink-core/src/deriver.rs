//! Pairwise shared secret cache.
//!
//! A cached secret is tied to the exact pair of keys it was derived from: the
//! peer's ephemeral public key and the local ephemeral public key. It is
//! reused only while both still match. A peer rotating its key, or the local
//! side minting a new ephemeral key after a reconnect, leads to a fresh
//! derivation on the next call.
//!
//! The cache is owned by a single session and mutated through `&mut self`, so
//! the lookup and the insert of one derivation cannot interleave with
//! another.

use std::collections::{BTreeMap, btree_map::Entry};

use hushlink_crypto::{CryptoError, PrivateKey, PublicKey, SharedSecret, diffie_hellman};
use hushlink_proto::ParticipantId;

#[derive(Debug)]
struct CachedSecret {
    peer_key: PublicKey,
    local_key: PublicKey,
    secret: SharedSecret,
}

/// Derives and caches one X25519 shared secret per peer.
#[derive(Debug, Default)]
pub struct SharedSecretDeriver {
    cache: BTreeMap<ParticipantId, CachedSecret>,
    derivations: u64,
}

impl SharedSecretDeriver {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared secret with `peer`, derived only if no matching cached value
    /// exists.
    ///
    /// # Errors
    ///
    /// - `CryptoError::NonContributory` if the peer key is a low-order point.
    ///   Any previous secret for the peer is dropped and nothing is cached.
    pub fn derive_for(
        &mut self,
        peer: &ParticipantId,
        peer_key: &PublicKey,
        local_private: &PrivateKey,
    ) -> Result<&SharedSecret, CryptoError> {
        let local_key = local_private.public_key();

        let slot = match self.cache.entry(peer.clone()) {
            Entry::Occupied(entry)
                if entry.get().peer_key == *peer_key && entry.get().local_key == local_key =>
            {
                return Ok(&entry.into_mut().secret);
            },
            slot => slot,
        };

        let secret = match diffie_hellman(peer_key, local_private) {
            Ok(secret) => secret,
            Err(err) => {
                // the old secret belongs to keys that are no longer current
                if let Entry::Occupied(entry) = slot {
                    entry.remove();
                }
                return Err(err);
            },
        };
        self.derivations += 1;
        tracing::debug!(%peer, peer_key = %peer_key.fingerprint(), "derived shared secret");

        let fresh = CachedSecret { peer_key: *peer_key, local_key, secret };
        let cached = match slot {
            Entry::Occupied(mut entry) => {
                entry.insert(fresh);
                entry.into_mut()
            },
            Entry::Vacant(entry) => entry.insert(fresh),
        };

        Ok(&cached.secret)
    }

    /// Whether the cached secret for `peer` was derived from exactly these
    /// keys.
    pub fn is_current(
        &self,
        peer: &ParticipantId,
        peer_key: &PublicKey,
        local_key: &PublicKey,
    ) -> bool {
        self.cache
            .get(peer)
            .is_some_and(|cached| cached.peer_key == *peer_key && cached.local_key == *local_key)
    }

    /// Cached secret for `peer`, whatever keys it came from.
    pub fn secret_for(&self, peer: &ParticipantId) -> Option<&SharedSecret> {
        self.cache.get(peer).map(|cached| &cached.secret)
    }

    /// Peers with a cached secret.
    pub fn peers(&self) -> impl Iterator<Item = &ParticipantId> {
        self.cache.keys()
    }

    /// Number of X25519 computations performed so far.
    pub fn derivation_count(&self) -> u64 {
        self.derivations
    }

    /// Number of cached secrets.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop the secret for one peer.
    pub fn forget(&mut self, peer: &ParticipantId) {
        self.cache.remove(peer);
    }

    /// Drop every cached secret. Each one is zeroized as it is dropped.
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
