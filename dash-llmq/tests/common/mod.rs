//! Two-node harness: a requesting member and a member serving quorum data.

#![allow(dead_code)]

use dash_llmq::QuorumManager;
use dash_llmq::dash_llmq_types::{DataMask, QuorumMessage};
use dash_llmq::network::QuorumConnectionManager;
use dash_llmq::test_utils::{QuorumFixture, TestNode};
use dash_llmq::types::{PeerId, QuorumPeer};

pub const SERVING_MEMBER: usize = 0;

pub struct ServingNode {
    pub node: TestNode,
    pub manager: QuorumManager,
    /// The requesting member as seen by the serving node.
    pub requester: QuorumPeer,
}

impl ServingNode {
    /// A member that took part in the DKG of `fixture` and holds the contributions
    /// addressed to the fixture's local member.
    pub fn new(fixture: &QuorumFixture) -> Self {
        let node = TestNode::new();
        let mut serving = fixture.clone();
        serving.local_index = SERVING_MEMBER;

        node.mine_quorum(&serving);
        node.dkg.set_verified_contributions(
            serving.llmq_type,
            &serving.quorum_block,
            serving.verified_contributions(SERVING_MEMBER),
        );
        node.dkg.set_encrypted_contributions(
            serving.llmq_type,
            &serving.quorum_block,
            fixture.local_pro_tx_hash(),
            fixture.encrypted_contributions(fixture.local_index),
        );

        let manager = node.member_manager(&serving).unwrap();
        let requester = node.connections.connect_masternode(fixture.local_pro_tx_hash());
        Self {
            node,
            manager,
            requester,
        }
    }
}

/// Delivers every `qgetdata` the requester sent to the serving node and hands the answers
/// back. Returns the number of answers delivered.
pub async fn relay(requester: &TestNode, manager: &QuorumManager, serving: &ServingNode) -> usize {
    let mut delivered = 0;
    for (peer_id, message) in requester.connections.take_sent_messages() {
        let QuorumMessage::GetData(request) = message else {
            continue;
        };
        let _ = serving
            .manager
            .process_message(&serving.requester, QuorumMessage::GetData(request))
            .await;

        let Some(peer) = connected_peer(requester, peer_id).await else {
            continue;
        };
        for (_, answer) in serving.node.connections.take_sent_messages() {
            let _ = manager.process_message(&peer, answer).await;
            delivered += 1;
        }
    }
    delivered
}

async fn connected_peer(node: &TestNode, peer_id: PeerId) -> Option<QuorumPeer> {
    let pro_tx_hash = node.connections.masternode_of(peer_id)?;
    node.connections.connected_peer(&pro_tx_hash).await
}

/// Data masks of the `qgetdata` messages sent so far.
pub fn requested_masks(node: &TestNode) -> Vec<DataMask> {
    node.connections
        .sent_messages()
        .into_iter()
        .filter_map(|(_, message)| match message {
            QuorumMessage::GetData(request) => Some(request.data_mask),
            QuorumMessage::Data(_) => None,
        })
        .collect()
}
