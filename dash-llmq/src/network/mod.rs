//! Peer-facing side of the LLMQ subsystem.
//!
//! Transport, handshakes and masternode authentication belong to the node. This module
//! defines what the quorum manager needs from the node's connection manager, tracks
//! outstanding `qgetdata` requests and peer misbehavior, and handles inbound quorum data
//! messages.

use std::collections::HashSet;

use async_trait::async_trait;
use dash_llmq_types::{LLMQType, ProTxHash, QuorumHash, QuorumMessage};

use crate::error::NetworkResult;
use crate::types::{PeerId, QuorumPeer};

pub mod message_handler;
pub mod misbehavior;
pub mod pending_requests;

pub use misbehavior::MisbehaviorTracker;
pub use pending_requests::{PeerKey, PendingDataRequests};

/// Connection manager operations used for quorum connectivity and data recovery.
#[async_trait]
pub trait QuorumConnectionManager: Send + Sync {
    /// Asks the connection manager to open an outbound connection to a masternode.
    async fn add_pending_masternode(&self, pro_tx_hash: ProTxHash);

    /// The connected peer that authenticated as `pro_tx_hash`, if any.
    async fn connected_peer(&self, pro_tx_hash: &ProTxHash) -> Option<QuorumPeer>;

    async fn send_message(&self, peer: PeerId, message: QuorumMessage) -> NetworkResult<()>;

    async fn disconnect(&self, peer: PeerId);

    /// Quorums of `llmq_type` the connection manager currently keeps connections for.
    async fn masternode_quorums(&self, llmq_type: LLMQType) -> HashSet<QuorumHash>;

    /// Keeps connections to `members` for the given quorum.
    async fn set_masternode_quorum_nodes(
        &self,
        llmq_type: LLMQType,
        quorum_hash: QuorumHash,
        members: Vec<ProTxHash>,
    );

    async fn remove_masternode_quorum_nodes(&self, llmq_type: LLMQType, quorum_hash: &QuorumHash);
}
