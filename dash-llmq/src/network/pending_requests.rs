//! Bookkeeping of outstanding quorum data requests.
//!
//! Every entry is keyed by the peer and the direction. An outbound entry exists while we
//! wait for a `qdata` answer, an inbound entry rate limits a peer to one `qgetdata` per
//! expiry period.

use std::collections::HashMap;

use dash_llmq_types::{ProTxHash, QuorumDataRequest};

use crate::types::{PeerId, QuorumPeer};

/// Identifies the remote side of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerKey {
    /// A peer authenticated as a masternode.
    Masternode(ProTxHash),
    /// A watch connection, identified by its connection.
    Watch(PeerId),
}

impl PeerKey {
    pub fn for_peer(peer: &QuorumPeer) -> Self {
        match peer.verified_pro_reg_tx_hash {
            Some(pro_tx_hash) => PeerKey::Masternode(pro_tx_hash),
            None => PeerKey::Watch(peer.id),
        }
    }
}

#[derive(Debug, Default)]
pub struct PendingDataRequests {
    requests: HashMap<(PeerKey, bool), QuorumDataRequest>,
}

impl PendingDataRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request. An existing entry that has not expired at `now` is kept and
    /// `false` returned; an expired one is replaced.
    pub fn insert(
        &mut self,
        peer: PeerKey,
        outbound: bool,
        request: QuorumDataRequest,
        now: u64,
    ) -> bool {
        match self.requests.get(&(peer, outbound)) {
            Some(existing) if !existing.is_expired_at(now) => false,
            _ => {
                self.requests.insert((peer, outbound), request);
                true
            }
        }
    }

    pub fn get(&self, peer: &PeerKey, outbound: bool) -> Option<&QuorumDataRequest> {
        self.requests.get(&(*peer, outbound))
    }

    pub fn get_mut(&mut self, peer: &PeerKey, outbound: bool) -> Option<&mut QuorumDataRequest> {
        self.requests.get_mut(&(*peer, outbound))
    }

    pub fn remove(&mut self, peer: &PeerKey, outbound: bool) -> Option<QuorumDataRequest> {
        self.requests.remove(&(*peer, outbound))
    }

    /// Drops every entry expired at `now`, returns how many were removed.
    pub fn purge_expired(&mut self, now: u64) -> usize {
        let before = self.requests.len();
        self.requests.retain(|_, request| !request.is_expired_at(now));
        before - self.requests.len()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
