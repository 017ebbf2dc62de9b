//! File helpers shared by the disk storage.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{StorageError, StorageResult};

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `data` to a temporary file next to `path` and renames it into place, so readers
/// never observe a partially written record.
pub(crate) async fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| StorageError::WriteFailed(format!("Invalid path: {}", path.display())))?;
    let mut temp_name = file_name.to_os_string();
    let suffix = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    temp_name.push(format!(".{}.{}.tmp", std::process::id(), suffix));
    let temp_path = path.with_file_name(temp_name);

    tokio::fs::write(&temp_path, data).await.map_err(|e| {
        StorageError::WriteFailed(format!("Failed to write {}: {}", temp_path.display(), e))
    })?;

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(StorageError::WriteFailed(format!(
            "Failed to rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        )));
    }

    Ok(())
}

/// Removes `path`, treating a missing file as success.
pub(crate) async fn remove_if_exists(path: &Path) -> StorageResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Io(e)),
    }
}
