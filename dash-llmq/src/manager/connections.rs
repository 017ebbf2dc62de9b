//! Maintenance of intra-quorum connections.

use std::collections::HashSet;

use dash_llmq_types::{LLMQType, QuorumHash};
use tracing::debug;

use super::QuorumManager;
use crate::types::BlockRef;

impl QuorumManager {
    /// Keeps connections to the recent quorums we are a member of, or to all recent quorums
    /// when watching, and drops connections to older ones.
    ///
    /// The quorum of the currently running DKG is left alone: the DKG session manages those
    /// connections itself.
    pub async fn ensure_quorum_connections(&self, llmq_type: LLMQType, tip: &BlockRef) {
        let params = llmq_type.params();
        let local_pro_tx_hash = self.local_pro_tx_hash();

        let recent = self.scan_quorums(llmq_type, tip, params.keep_old_connections as usize).await;

        let mut to_remove: HashSet<QuorumHash> =
            self.connections().masternode_quorums(llmq_type).await;
        if params.dkg_params.interval > 0 {
            let dkg_height = llmq_type.get_cycle_base_height(tip.height);
            if let Some(dkg_block) = self.services.chain.ancestor(tip, dkg_height) {
                to_remove.remove(&QuorumHash::from(dkg_block.hash));
            }
        }

        for quorum in recent {
            let is_member = local_pro_tx_hash.as_ref().is_some_and(|local| quorum.is_member(local));
            if !is_member && !self.config.watch_quorums {
                continue;
            }

            let members: Vec<_> = quorum
                .members()
                .iter()
                .filter(|member| Some(*member) != local_pro_tx_hash.as_ref())
                .copied()
                .collect();
            debug!(
                "{} {}: keeping connections to {} members",
                llmq_type,
                quorum.quorum_hash(),
                members.len()
            );
            self.connections()
                .set_masternode_quorum_nodes(llmq_type, quorum.quorum_hash(), members)
                .await;
            to_remove.remove(&quorum.quorum_hash());
        }

        for quorum_hash in to_remove {
            debug!("{} {}: removing masternode quorum connections", llmq_type, quorum_hash);
            self.connections().remove_masternode_quorum_nodes(llmq_type, &quorum_hash).await;
        }
    }
}
