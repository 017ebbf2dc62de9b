//! In-memory storage implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use dash_llmq_types::QuorumDataKey;
use tokio::sync::RwLock;

use super::{QuorumDataStorage, RecordTag};
use crate::error::StorageResult;

/// Keeps records for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryQuorumStorage {
    records: RwLock<HashMap<(RecordTag, QuorumDataKey), Vec<u8>>>,
}

impl MemoryQuorumStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl QuorumDataStorage for MemoryQuorumStorage {
    async fn write_record(
        &self,
        tag: RecordTag,
        key: &QuorumDataKey,
        value: &[u8],
    ) -> StorageResult<()> {
        self.records.write().await.insert((tag, *key), value.to_vec());
        Ok(())
    }

    async fn read_record(
        &self,
        tag: RecordTag,
        key: &QuorumDataKey,
    ) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.records.read().await.get(&(tag, *key)).cloned())
    }

    async fn remove_quorum(&self, key: &QuorumDataKey) -> StorageResult<()> {
        let mut records = self.records.write().await;
        records.remove(&(RecordTag::VerificationVector, *key));
        records.remove(&(RecordTag::SecretKeyShare, *key));
        Ok(())
    }
}
