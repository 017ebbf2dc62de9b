//! Common types shared across the LLMQ subsystem.

use std::fmt;

use dash_llmq_types::{BLSSecretKey, BlockHash, ProTxHash};

/// Identifier the connection manager assigns to a connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer={}", self.0)
    }
}

/// What the LLMQ subsystem needs to know about a connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumPeer {
    pub id: PeerId,
    /// Protocol version the peer announced.
    pub version: u32,
    /// Set once the peer proved control of a masternode's operator key.
    pub verified_pro_reg_tx_hash: Option<ProTxHash>,
    /// The peer asked to watch quorum traffic without being a masternode.
    pub qwatch: bool,
}

impl QuorumPeer {
    /// Only verified masternodes and watch connections may exchange quorum data.
    pub fn is_quorum_peer(&self) -> bool {
        self.verified_pro_reg_tx_hash.is_some() || self.qwatch
    }
}

/// A block on the active chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub hash: BlockHash,
    pub height: u32,
}

impl BlockRef {
    pub fn new(hash: BlockHash, height: u32) -> Self {
        Self {
            hash,
            height,
        }
    }
}

/// Identity of the local masternode.
#[derive(Clone, PartialEq, Eq)]
pub struct ActiveMasternodeInfo {
    pub pro_tx_hash: ProTxHash,
    /// Operator key used to decrypt contributions addressed to us.
    pub operator_secret_key: BLSSecretKey,
}

impl fmt::Debug for ActiveMasternodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveMasternodeInfo").field("pro_tx_hash", &self.pro_tx_hash).finish()
    }
}

/// How much key material of a quorum is available locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QuorumDataState {
    /// Mined, but neither verification vector nor secret key share is known.
    Committed,
    HasVerificationVector,
    /// Verification vector plus our own secret key share.
    HasFullData,
}
