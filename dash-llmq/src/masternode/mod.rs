//! Deterministic masternode list access.

use dash_llmq_types::{LLMQType, ProTxHash};

use crate::types::BlockRef;

/// Computes quorum membership from the deterministic masternode list.
pub trait MasternodeListProvider: Send + Sync {
    /// Members of the `llmq_type` quorum based on `quorum_block`, in member index order.
    ///
    /// The result is deterministic for a given block: every node derives the same list.
    fn quorum_members(&self, llmq_type: LLMQType, quorum_block: &BlockRef) -> Vec<ProTxHash>;
}
