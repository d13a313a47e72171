//! Pairwise shared secrets via X25519.

use std::fmt;

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::CryptoError,
    keys::{KEY_SIZE, PrivateKey, PublicKey},
};

/// Label used to expand the raw X25519 output
const SHARED_SECRET_LABEL: &[u8] = b"hushlinkPairwiseV1";

/// 32-byte symmetric secret shared with exactly one peer.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; KEY_SIZE]);

impl SharedSecret {
    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

/// Derive the secret shared between `local_private` and the owner of
/// `peer_public`.
///
/// Commutative: `diffie_hellman(pub_b, priv_a) == diffie_hellman(pub_a,
/// priv_b)`. Deterministic and free of side effects.
///
/// # Errors
///
/// - `NonContributory` if the peer key is a low-order point
pub fn diffie_hellman(
    peer_public: &PublicKey,
    local_private: &PrivateKey,
) -> Result<SharedSecret, CryptoError> {
    let peer = x25519_dalek::PublicKey::from(*peer_public.as_bytes());
    let raw = local_private.secret().diffie_hellman(&peer);

    if !raw.was_contributory() {
        return Err(CryptoError::NonContributory);
    }

    // Only order-independent input goes into the expansion
    let hkdf = Hkdf::<Sha256>::new(None, raw.as_bytes());

    let mut okm = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(SHARED_SECRET_LABEL, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    Ok(SharedSecret(okm))
}
