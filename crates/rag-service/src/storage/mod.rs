pub mod conversation_store;
pub mod document_store;
pub mod vector_store;

pub use conversation_store::ConversationStore;
pub use document_store::DocumentStore;
pub use vector_store::{ScoredChunk, VectorStore, VectorStoreStats};

use crate::utils::error::ApiError;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Write-to-temp, fsync, rename. Readers either see the old file or the new
/// one, never a partial write.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ApiError> {
    let parent = path
        .parent()
        .ok_or_else(|| ApiError::PersistenceFailed(format!("no parent dir for {}", path.display())))?;
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ApiError::PersistenceFailed(format!("bad file name: {}", path.display())))?;
    let tmp = parent.join(format!(".{}.tmp", file_name));

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ApiError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}
