//! Disk-based storage: one file per record below `<base>/<tag>/<key>.dat`.

use std::path::PathBuf;

use async_trait::async_trait;
use dash_llmq_types::QuorumDataKey;

use super::io::{atomic_write, remove_if_exists};
use super::{QuorumDataStorage, RecordTag};
use crate::error::{StorageError, StorageResult};

pub struct DiskQuorumStorage {
    base_path: PathBuf,
}

impl DiskQuorumStorage {
    pub async fn new(base_path: PathBuf) -> StorageResult<Self> {
        for tag in [RecordTag::VerificationVector, RecordTag::SecretKeyShare] {
            let dir = base_path.join(tag.as_str());
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                StorageError::WriteFailed(format!("Failed to create directory: {}", e))
            })?;
        }

        tracing::debug!("Opened quorum data storage at {}", base_path.display());
        Ok(Self {
            base_path,
        })
    }

    fn record_path(&self, tag: RecordTag, key: &QuorumDataKey) -> PathBuf {
        self.base_path.join(tag.as_str()).join(format!("{}.dat", key))
    }
}

#[async_trait]
impl QuorumDataStorage for DiskQuorumStorage {
    async fn write_record(
        &self,
        tag: RecordTag,
        key: &QuorumDataKey,
        value: &[u8],
    ) -> StorageResult<()> {
        atomic_write(&self.record_path(tag, key), value).await
    }

    async fn read_record(
        &self,
        tag: RecordTag,
        key: &QuorumDataKey,
    ) -> StorageResult<Option<Vec<u8>>> {
        let path = self.record_path(tag, key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(StorageError::ReadFailed(format!("Failed to read {}: {}", path.display(), e)))
            }
        }
    }

    async fn remove_quorum(&self, key: &QuorumDataKey) -> StorageResult<()> {
        remove_if_exists(&self.record_path(RecordTag::VerificationVector, key)).await?;
        remove_if_exists(&self.record_path(RecordTag::SecretKeyShare, key)).await
    }
}
