//! Quorum manager: building, caching, scanning and connections.

use std::sync::Arc;

use dash_llmq::dash_llmq_types::bitcoin_hashes::Hash;
use dash_llmq::dash_llmq_types::{DataMask, LLMQType, ProTxHash, QuorumHash, QuorumMessage};
use dash_llmq::network::QuorumConnectionManager;
use dash_llmq::storage::DiskQuorumStorage;
use dash_llmq::test_utils::{QuorumFixture, TestNode, masternode_info};
use dash_llmq::types::{PeerId, QuorumPeer};
use dash_llmq::{LlmqConfig, LlmqError, QuorumDataState};
use tempfile::TempDir;

const LOCAL_MEMBER: usize = 1;

/// Three quorums of `llmq_test` at consecutive DKG intervals, oldest first.
fn three_quorums() -> Vec<QuorumFixture> {
    (1..=3u8)
        .map(|i| QuorumFixture::new(3, LOCAL_MEMBER).with_seed(i).with_height(24 * i as u32))
        .collect()
}

#[tokio::test]
async fn test_get_quorum_builds_and_caches() {
    let fixture = QuorumFixture::new(3, LOCAL_MEMBER);
    let node = TestNode::new();
    node.mine_quorum(&fixture);
    let manager = node.member_manager(&fixture).unwrap();

    let quorum = manager.get_quorum(fixture.llmq_type, &fixture.quorum_hash()).await.unwrap();
    assert_eq!(quorum.members(), fixture.members.as_slice());
    assert_eq!(quorum.quorum_block(), &fixture.quorum_block);
    assert_eq!(quorum.mined_block_hash(), &fixture.mined_block_hash);
    assert_eq!(quorum.data_state(), QuorumDataState::Committed);
    assert_eq!(manager.cached_quorum_count().await, 1);

    let again = manager.get_quorum(fixture.llmq_type, &fixture.quorum_hash()).await.unwrap();
    assert!(Arc::ptr_eq(&quorum, &again));
    assert_eq!(manager.cached_quorum_count().await, 1);
}

#[tokio::test]
async fn test_get_quorum_unknown() {
    let fixture = QuorumFixture::new(3, LOCAL_MEMBER);
    let node = TestNode::new();
    let manager = node.member_manager(&fixture).unwrap();

    // block unknown
    assert!(manager.get_quorum(fixture.llmq_type, &fixture.quorum_hash()).await.is_none());

    // block known, nothing mined
    node.chain.add_block(fixture.quorum_block);
    assert!(manager.get_quorum(fixture.llmq_type, &fixture.quorum_hash()).await.is_none());
    assert!(!manager.has_quorum(fixture.llmq_type, &fixture.quorum_hash()));

    // mined for another type
    node.mine_quorum(&fixture);
    let other_type = LLMQType::LlmqtypeTestV17;
    assert!(manager.get_quorum(other_type, &fixture.quorum_hash()).await.is_none());
    assert_eq!(manager.cached_quorum_count().await, 0);
}

#[tokio::test]
async fn test_member_builds_contributions_from_dkg() {
    let fixture = QuorumFixture::new(3, LOCAL_MEMBER);
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(DiskQuorumStorage::new(temp_dir.path().to_path_buf()).await.unwrap());

    let node = TestNode::new().with_storage(storage.clone());
    node.mine_quorum(&fixture);
    node.dkg.set_verified_contributions(
        fixture.llmq_type,
        &fixture.quorum_block,
        fixture.verified_contributions(LOCAL_MEMBER),
    );
    let manager = node.member_manager(&fixture).unwrap();

    let quorum = manager.get_quorum(fixture.llmq_type, &fixture.quorum_hash()).await.unwrap();
    assert_eq!(quorum.data_state(), QuorumDataState::HasFullData);
    assert_eq!(quorum.secret_key_share(), Some(fixture.secret_key_share(LOCAL_MEMBER)));
    manager.shutdown().await;

    // reloaded from disk without the DKG session
    let restarted = TestNode::new().with_storage(storage);
    restarted.mine_quorum(&fixture);
    let manager = restarted.member_manager(&fixture).unwrap();
    let quorum = manager.get_quorum(fixture.llmq_type, &fixture.quorum_hash()).await.unwrap();
    assert_eq!(quorum.data_state(), QuorumDataState::HasFullData);
    assert_eq!(quorum.verification_vector().as_deref(), Some(&fixture.vvec));
}

#[tokio::test]
async fn test_reorged_quorum_is_evicted() {
    let fixture = QuorumFixture::new(3, LOCAL_MEMBER);
    let node = TestNode::new();
    node.mine_quorum(&fixture);
    let manager = node.member_manager(&fixture).unwrap();

    let quorum = manager.get_quorum(fixture.llmq_type, &fixture.quorum_hash()).await.unwrap();
    node.block_processor.remove_commitment(fixture.llmq_type, &fixture.quorum_hash());

    assert!(manager.get_quorum(fixture.llmq_type, &fixture.quorum_hash()).await.is_none());
    assert_eq!(manager.cached_quorum_count().await, 0);
    assert!(quorum.stop_token().is_cancelled());

    // mined again: a fresh quorum is built
    node.mine_quorum(&fixture);
    let rebuilt = manager.get_quorum(fixture.llmq_type, &fixture.quorum_hash()).await.unwrap();
    assert!(!Arc::ptr_eq(&quorum, &rebuilt));
    assert!(!rebuilt.stop_token().is_cancelled());
}

#[tokio::test]
async fn test_scan_quorums_newest_first() {
    let quorums = three_quorums();
    let node = TestNode::new();
    for fixture in &quorums {
        node.mine_quorum(fixture);
    }
    let tip = node.chain.add_block_at(80);
    let manager = node.member_manager(&quorums[0]).unwrap();

    let scanned = manager.scan_quorums(LLMQType::LlmqtypeTest, &tip, 3).await;
    let hashes: Vec<QuorumHash> = scanned.iter().map(|q| q.quorum_hash()).collect();
    assert_eq!(
        hashes,
        vec![quorums[2].quorum_hash(), quorums[1].quorum_hash(), quorums[0].quorum_hash()]
    );

    // served from the scan cache, truncated
    let newest = manager.scan_quorums(LLMQType::LlmqtypeTest, &tip, 1).await;
    assert_eq!(newest.len(), 1);
    assert!(Arc::ptr_eq(&newest[0], &scanned[0]));

    // scanning from an older block only sees older quorums
    let older = manager.scan_quorums(LLMQType::LlmqtypeTest, &quorums[1].quorum_block, 5).await;
    assert_eq!(older.len(), 2);
    assert_eq!(older[0].quorum_hash(), quorums[1].quorum_hash());

    assert_eq!(manager.scan_quorums_at_tip(LLMQType::LlmqtypeTest, 2).await.len(), 2);
}

#[tokio::test]
async fn test_scan_quorums_disabled_type() {
    let fixture = QuorumFixture::new(3, LOCAL_MEMBER);
    let node = TestNode::new();
    node.mine_quorum(&fixture);
    let tip = node.chain.add_block_at(30);
    let manager = node.manager(LlmqConfig::mainnet()).unwrap();

    assert!(manager.scan_quorums(LLMQType::LlmqtypeTest, &tip, 2).await.is_empty());
}

#[tokio::test]
async fn test_scan_cache_drops_reorged_quorum() {
    let quorums = three_quorums();
    let node = TestNode::new();
    for fixture in &quorums {
        node.mine_quorum(fixture);
    }
    let tip = node.chain.add_block_at(80);
    let manager = node.member_manager(&quorums[0]).unwrap();
    assert_eq!(manager.scan_quorums(LLMQType::LlmqtypeTest, &tip, 3).await.len(), 3);

    node.block_processor.remove_commitment(LLMQType::LlmqtypeTest, &quorums[2].quorum_hash());
    assert!(manager.get_quorum(LLMQType::LlmqtypeTest, &quorums[2].quorum_hash()).await.is_none());

    let scanned = manager.scan_quorums(LLMQType::LlmqtypeTest, &tip, 3).await;
    assert_eq!(scanned.len(), 2);
    assert_eq!(scanned[0].quorum_hash(), quorums[1].quorum_hash());
}

#[tokio::test]
async fn test_ensure_quorum_connections() {
    let quorums = three_quorums();
    let node = TestNode::new();
    for fixture in &quorums {
        node.mine_quorum(fixture);
    }
    let dkg_block = node.chain.add_block_at(96);
    let tip = node.chain.add_block_at(100);
    let manager = node.member_manager(&quorums[0]).unwrap();

    // a stale quorum and the quorum of the running DKG are known to the connection manager
    let stale = QuorumHash::from_byte_array([0x99; 32]);
    node.connections.set_masternode_quorum_nodes(LLMQType::LlmqtypeTest, stale, vec![]).await;
    let dkg_quorum = QuorumHash::from(dkg_block.hash);
    node.connections.set_masternode_quorum_nodes(LLMQType::LlmqtypeTest, dkg_quorum, vec![]).await;

    manager.ensure_quorum_connections(LLMQType::LlmqtypeTest, &tip).await;

    let nodes = node.connections.quorum_nodes();
    assert!(!nodes.contains_key(&(LLMQType::LlmqtypeTest, stale)));
    assert!(nodes.contains_key(&(LLMQType::LlmqtypeTest, dkg_quorum)));
    let members = &nodes[&(LLMQType::LlmqtypeTest, quorums[0].quorum_hash())];
    assert_eq!(members.len(), 2);
    assert!(!members.contains(&quorums[0].local_pro_tx_hash()));
    // not a member of the other two
    for fixture in &quorums[1..] {
        assert!(!nodes.contains_key(&(LLMQType::LlmqtypeTest, fixture.quorum_hash())));
    }

    let config = LlmqConfig::regtest()
        .with_masternode(masternode_info(&quorums[0]))
        .with_watch_quorums(true);
    let watching = node.manager(config).unwrap();
    watching.ensure_quorum_connections(LLMQType::LlmqtypeTest, &tip).await;

    let nodes = node.connections.quorum_nodes();
    assert_eq!(nodes[&(LLMQType::LlmqtypeTest, quorums[0].quorum_hash())].len(), 2);
    for fixture in &quorums[1..] {
        assert_eq!(nodes[&(LLMQType::LlmqtypeTest, fixture.quorum_hash())].len(), 3);
    }
}

#[tokio::test]
async fn test_quorum_connections_for_non_members() {
    let fixture = QuorumFixture::new(3, LOCAL_MEMBER);
    let mut outsider = masternode_info(&fixture);
    outsider.pro_tx_hash = ProTxHash::from_byte_array([0xee; 32]);

    let node = TestNode::new();
    node.mine_quorum(&fixture);
    let tip = node.chain.add_block_at(30);

    let manager = node.manager(LlmqConfig::regtest().with_masternode(outsider.clone())).unwrap();
    manager.ensure_quorum_connections(fixture.llmq_type, &tip).await;
    assert!(node.connections.quorum_nodes().is_empty());

    let config = LlmqConfig::regtest().with_masternode(outsider).with_watch_quorums(true);
    let manager = node.manager(config).unwrap();
    manager.ensure_quorum_connections(fixture.llmq_type, &tip).await;
    let nodes = node.connections.quorum_nodes();
    assert_eq!(nodes[&(fixture.llmq_type, fixture.quorum_hash())].len(), 3);
}

#[tokio::test]
async fn test_request_quorum_data() {
    let fixture = QuorumFixture::new(3, LOCAL_MEMBER);
    let node = TestNode::new();
    node.mine_quorum(&fixture);
    let manager = node.member_manager(&fixture).unwrap();
    let peer = node.connections.connect_masternode(fixture.members[0]);
    let mask = DataMask::QUORUM_VERIFICATION_VECTOR;
    let local = fixture.local_pro_tx_hash();

    let request = |peer: QuorumPeer, llmq_type: LLMQType, quorum: &QuorumFixture| {
        let manager = manager.clone();
        let block = quorum.quorum_block;
        async move { manager.request_quorum_data(&peer, llmq_type, &block, mask, &local).await }
    };

    let old_peer = QuorumPeer {
        version: 70218,
        ..peer.clone()
    };
    assert!(!request(old_peer, fixture.llmq_type, &fixture).await);

    let anonymous = QuorumPeer {
        verified_pro_reg_tx_hash: None,
        ..peer.clone()
    };
    assert!(!request(anonymous, fixture.llmq_type, &fixture).await);

    let unmined = QuorumFixture::new(3, LOCAL_MEMBER).with_seed(5);
    assert!(!request(peer.clone(), unmined.llmq_type, &unmined).await);
    assert!(!request(peer.clone(), LLMQType::Llmqtype50_60, &fixture).await);
    assert!(node.connections.sent_messages().is_empty());

    assert!(request(peer.clone(), fixture.llmq_type, &fixture).await);
    assert!(manager.has_pending_outbound_request(&fixture.members[0]).await);
    assert_eq!(manager.outbound_request_processed(&fixture.members[0]).await, Some(false));

    // one outstanding request per peer
    assert!(!request(peer.clone(), fixture.llmq_type, &fixture).await);

    let sent = node.connections.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, peer.id);
    match &sent[0].1 {
        QuorumMessage::GetData(request) => {
            assert_eq!(request.llmq_type, u8::from(fixture.llmq_type));
            assert_eq!(request.quorum_hash, fixture.quorum_hash());
            assert_eq!(request.data_mask, mask);
            assert_eq!(request.pro_tx_hash, local);
        }
        other => panic!("unexpected message {:?}", other),
    }

    // a request that could not be sent does not block the next one
    let gone = QuorumPeer {
        id: PeerId(1000),
        verified_pro_reg_tx_hash: Some(fixture.members[2]),
        ..peer.clone()
    };
    assert!(!request(gone, fixture.llmq_type, &fixture).await);
    assert!(!manager.has_pending_outbound_request(&fixture.members[2]).await);
    let reconnected = node.connections.connect_masternode(fixture.members[2]);
    assert!(request(reconnected, fixture.llmq_type, &fixture).await);
    assert_eq!(node.connections.sent_messages().len(), 2);
}

#[tokio::test]
async fn test_unsynced_tip_is_ignored() {
    let fixture = QuorumFixture::new(3, LOCAL_MEMBER);
    let node = TestNode::new();
    node.mine_quorum(&fixture);
    let tip = node.chain.add_block_at(30);
    node.sync_status.set_synced(false);
    let manager = node.member_manager(&fixture).unwrap();

    manager.on_new_chain_tip(&tip).await;
    assert_eq!(manager.cached_quorum_count().await, 0);
    assert!(node.connections.quorum_nodes().is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let node = TestNode::new();
    let mut config = LlmqConfig::regtest();
    config.masternode_mode = true;
    assert!(matches!(node.manager(config), Err(LlmqError::Config(_))));
}
