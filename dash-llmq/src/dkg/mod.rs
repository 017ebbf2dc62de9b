//! Access to the local DKG session state.

use std::sync::Arc;

use dash_llmq_types::{BLSIESEncryptedSecretKey, BLSPublicKey, BLSSecretKey, LLMQType, ProTxHash};

use crate::types::BlockRef;

/// Contributions this node verified during a DKG session.
#[derive(Debug, Clone, Default)]
pub struct VerifiedContributions {
    /// Member index of each contributor.
    pub member_indexes: Vec<usize>,
    /// Verification vector contributed by each member.
    pub vvecs: Vec<Arc<Vec<BLSPublicKey>>>,
    /// Secret key contribution each member addressed to us.
    pub sk_contributions: Vec<BLSSecretKey>,
}

/// DKG session manager of the node.
pub trait DkgSessionManager: Send + Sync {
    /// Contributions of the valid members we verified while participating in the session.
    /// `None` when we did not take part or the session data is gone.
    fn get_verified_contributions(
        &self,
        llmq_type: LLMQType,
        quorum_block: &BlockRef,
        valid_members: &[bool],
    ) -> Option<VerifiedContributions>;

    /// Encrypted contributions of every valid member addressed to `pro_tx_hash`, in member
    /// index order.
    fn get_encrypted_contributions(
        &self,
        llmq_type: LLMQType,
        quorum_block: &BlockRef,
        valid_members: &[bool],
        pro_tx_hash: &ProTxHash,
    ) -> Option<Vec<BLSIESEncryptedSecretKey>>;
}
