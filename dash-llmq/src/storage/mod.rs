//! Persistence of quorum contributions.
//!
//! Two records are kept per quorum, both keyed by [`QuorumDataKey`]: the verification
//! vector and our secret key share. Values are consensus encoded.

pub(crate) mod io;

mod disk;
mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dash_llmq_types::QuorumDataKey;

use crate::config::LlmqConfig;
use crate::error::StorageResult;

pub use disk::DiskQuorumStorage;
pub use memory::MemoryQuorumStorage;

/// Kind of record stored for a quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordTag {
    VerificationVector,
    SecretKeyShare,
}

impl RecordTag {
    /// Database tag of the record kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordTag::VerificationVector => "q_Qqvvec",
            RecordTag::SecretKeyShare => "q_Qsk",
        }
    }
}

impl fmt::Display for RecordTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait QuorumDataStorage: Send + Sync {
    async fn write_record(
        &self,
        tag: RecordTag,
        key: &QuorumDataKey,
        value: &[u8],
    ) -> StorageResult<()>;

    async fn read_record(&self, tag: RecordTag, key: &QuorumDataKey)
    -> StorageResult<Option<Vec<u8>>>;

    /// Deletes both records of a quorum.
    async fn remove_quorum(&self, key: &QuorumDataKey) -> StorageResult<()>;
}

/// Opens the storage selected by `config`: on disk below `storage_path`, in memory otherwise.
pub async fn open_storage(config: &LlmqConfig) -> StorageResult<Arc<dyn QuorumDataStorage>> {
    match &config.storage_path {
        Some(path) => Ok(Arc::new(DiskQuorumStorage::new(path.clone()).await?)),
        None => Ok(Arc::new(MemoryQuorumStorage::new())),
    }
}
