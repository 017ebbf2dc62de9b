//! Test support: in-memory node services and deterministic quorums.

mod fixture;
mod mocks;

use std::sync::Arc;

pub use fixture::QuorumFixture;
pub use mocks::{
    MockBlockProcessor, MockBlsWorker, MockChain, MockConnectionManager, MockDkgSessionManager,
    MockMasternodeList, MockSyncStatus,
};

use crate::config::LlmqConfig;
use crate::error::Result;
use crate::manager::{QuorumManager, QuorumServices};
use crate::storage::{MemoryQuorumStorage, QuorumDataStorage};
use crate::types::ActiveMasternodeInfo;
use dash_llmq_types::BLSSecretKey;

/// A node made of mocks.
pub struct TestNode {
    pub chain: Arc<MockChain>,
    pub block_processor: Arc<MockBlockProcessor>,
    pub masternodes: Arc<MockMasternodeList>,
    pub dkg: Arc<MockDkgSessionManager>,
    pub connections: Arc<MockConnectionManager>,
    pub sync_status: Arc<MockSyncStatus>,
    pub storage: Arc<dyn QuorumDataStorage>,
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}

impl TestNode {
    /// A synced node with in-memory storage whose connection manager connects on request.
    pub fn new() -> Self {
        Self {
            chain: Arc::new(MockChain::new()),
            block_processor: Arc::new(MockBlockProcessor::new()),
            masternodes: Arc::new(MockMasternodeList::new()),
            dkg: Arc::new(MockDkgSessionManager::new()),
            connections: Arc::new(MockConnectionManager::new().with_auto_connect()),
            sync_status: Arc::new(MockSyncStatus::new(true)),
            storage: Arc::new(MemoryQuorumStorage::new()),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn QuorumDataStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn services(&self) -> QuorumServices {
        QuorumServices {
            chain: self.chain.clone(),
            block_processor: self.block_processor.clone(),
            masternodes: self.masternodes.clone(),
            dkg: self.dkg.clone(),
            bls: Arc::new(MockBlsWorker),
            connections: self.connections.clone(),
            sync_status: self.sync_status.clone(),
            storage: self.storage.clone(),
        }
    }

    pub fn manager(&self, config: LlmqConfig) -> Result<QuorumManager> {
        QuorumManager::new(config, self.services())
    }

    /// A regtest manager running as the local member of `fixture`.
    pub fn member_manager(&self, fixture: &QuorumFixture) -> Result<QuorumManager> {
        self.manager(LlmqConfig::regtest().with_masternode(masternode_info(fixture)))
    }

    /// Mines `fixture`: adds its base block to the chain, its commitment and its members.
    pub fn mine_quorum(&self, fixture: &QuorumFixture) {
        self.chain.add_block(fixture.quorum_block);
        self.masternodes.set_members(
            fixture.llmq_type,
            &fixture.quorum_block,
            fixture.members.clone(),
        );
        self.block_processor.add_commitment(
            fixture.llmq_type,
            fixture.quorum_block,
            fixture.commitment(),
            fixture.mined_block_hash,
        );
    }
}

/// Identity of the local member of `fixture`.
pub fn masternode_info(fixture: &QuorumFixture) -> ActiveMasternodeInfo {
    ActiveMasternodeInfo {
        pro_tx_hash: fixture.local_pro_tx_hash(),
        operator_secret_key: BLSSecretKey::from_bytes([0x42; 32]),
    }
}
