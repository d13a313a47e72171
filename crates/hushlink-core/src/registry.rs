//! Registry of peer ephemeral public keys.
//!
//! One entry per remote participant, updated by `ephemeral_key`
//! announcements. The local participant never appears as a key. Entries are
//! only overwritten, never removed, until the session ends.
//!
//! Each entry remembers the sequence number of the announcement it came from.
//! An announcement with a lower number than the stored one is stale (a
//! replay from the relay, or a reordered message) and is rejected. An equal
//! number overwrites, so peers that send no number still get
//! last-write-wins.

use std::collections::BTreeMap;

use hushlink_crypto::PublicKey;
use hushlink_proto::ParticipantId;

/// Result of recording an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First key seen for this peer
    Inserted,
    /// Peer announced a different key
    Updated,
    /// Same key announced again
    Unchanged,
    /// Announcement came from the local participant
    SelfIgnored,
    /// Older than the stored announcement
    Stale,
}

impl RecordOutcome {
    /// Whether the stored key for the peer changed.
    pub fn changed(self) -> bool {
        matches!(self, Self::Inserted | Self::Updated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeerEntry {
    public_key: PublicKey,
    seq: u64,
}

/// Participant id to current ephemeral public key.
#[derive(Debug, Clone)]
pub struct PeerKeyRegistry {
    local: ParticipantId,
    peers: BTreeMap<ParticipantId, PeerEntry>,
}

impl PeerKeyRegistry {
    /// Empty registry for the given local participant.
    pub fn new(local: ParticipantId) -> Self {
        Self { local, peers: BTreeMap::new() }
    }

    /// Local participant excluded from the registry.
    pub fn local(&self) -> &ParticipantId {
        &self.local
    }

    /// Record a peer's announced key.
    pub fn record_peer_key(
        &mut self,
        peer: &ParticipantId,
        public_key: PublicKey,
        seq: u64,
    ) -> RecordOutcome {
        if *peer == self.local {
            return RecordOutcome::SelfIgnored;
        }

        let outcome = match self.peers.get(peer) {
            None => RecordOutcome::Inserted,
            Some(entry) if seq < entry.seq => return RecordOutcome::Stale,
            Some(entry) if entry.public_key == public_key => RecordOutcome::Unchanged,
            Some(_) => RecordOutcome::Updated,
        };

        self.peers.insert(peer.clone(), PeerEntry { public_key, seq });
        outcome
    }

    /// Current key of one peer.
    pub fn get(&self, peer: &ParticipantId) -> Option<PublicKey> {
        self.peers.get(peer).map(|entry| entry.public_key)
    }

    /// Sequence number of the stored announcement of one peer.
    pub fn seq(&self, peer: &ParticipantId) -> Option<u64> {
        self.peers.get(peer).map(|entry| entry.seq)
    }

    /// Read-only copy of every peer key, ordered by participant id.
    pub fn snapshot(&self) -> BTreeMap<ParticipantId, PublicKey> {
        self.peers.iter().map(|(peer, entry)| (peer.clone(), entry.public_key)).collect()
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True if no peer key is known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Forget every peer. Session end only.
    pub fn clear(&mut self) {
        self.peers.clear();
    }
}
