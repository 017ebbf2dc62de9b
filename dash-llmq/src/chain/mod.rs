//! Views of the block chain the quorum manager depends on.
//!
//! The manager never walks the chain itself. Block lookups, mined commitments and the sync
//! state are supplied by the embedding node through these traits.

use dash_llmq_types::{BlockHash, FinalCommitment, LLMQType, QuorumHash};

use crate::types::BlockRef;

/// Read access to the active chain.
pub trait ChainView: Send + Sync {
    /// Block with `hash` if it is known to the node.
    fn lookup_block(&self, hash: &BlockHash) -> Option<BlockRef>;

    /// Ancestor of `block` at `height`.
    fn ancestor(&self, block: &BlockRef, height: u32) -> Option<BlockRef>;

    /// Current chain tip.
    fn tip(&self) -> Option<BlockRef>;
}

/// Access to the final commitments mined on the active chain.
pub trait QuorumBlockProcessor: Send + Sync {
    /// Whether a commitment for the quorum is mined on the active chain.
    fn has_mined_commitment(&self, llmq_type: LLMQType, quorum_hash: &QuorumHash) -> bool;

    /// The mined commitment and the hash of the block that contains it.
    fn get_mined_commitment(
        &self,
        llmq_type: LLMQType,
        quorum_hash: &QuorumHash,
    ) -> Option<(FinalCommitment, BlockHash)>;

    /// Quorum base blocks of the last `max_count` commitments mined up to and including
    /// `block`, newest first.
    fn mined_commitments_until_block(
        &self,
        llmq_type: LLMQType,
        block: &BlockRef,
        max_count: usize,
    ) -> Vec<BlockRef>;
}

/// Sync progress of the node.
pub trait MasternodeSyncStatus: Send + Sync {
    fn is_blockchain_synced(&self) -> bool;
}
