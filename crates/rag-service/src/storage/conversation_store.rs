use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::chat::{Conversation, ConversationSummary};
use crate::utils::error::ApiError;

use super::write_json_atomic;

/// One JSON file per conversation plus an index.json of summaries. Full
/// conversations load from disk on demand; only the index lives in memory.
pub struct ConversationStore {
    dir: PathBuf,
    index: RwLock<HashMap<Uuid, ConversationSummary>>,
}

impl ConversationStore {
    pub async fn open(data_dir: &Path) -> Result<Self, ApiError> {
        let dir = data_dir.join("conversations");
        tokio::fs::create_dir_all(&dir).await?;

        // Rebuild the index from the per-conversation files; index.json is a
        // cache, the individual files are the source of truth.
        let mut index = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".json") || name == "index.json" || name.starts_with('.') {
                continue;
            }
            match std::fs::read(&path)
                .map_err(anyhow::Error::from)
                .and_then(|bytes| serde_json::from_slice::<Conversation>(&bytes).map_err(Into::into))
            {
                Ok(conv) => {
                    index.insert(conv.id, conv.summary());
                }
                Err(e) => warn!("Skipping unreadable conversation {}: {}", path.display(), e),
            }
        }

        info!("Loaded {} conversation(s) from {}", index.len(), dir.display());

        let store = Self {
            dir,
            index: RwLock::new(index),
        };
        store.persist_index().await?;
        Ok(store)
    }

    pub async fn save(&self, conversation: &Conversation) -> Result<(), ApiError> {
        write_json_atomic(&self.conv_path(conversation.id), conversation).await?;
        self.index
            .write()
            .await
            .insert(conversation.id, conversation.summary());
        self.persist_index().await
    }

    pub async fn load(&self, id: Uuid) -> Result<Option<Conversation>, ApiError> {
        if !self.index.read().await.contains_key(&id) {
            return Ok(None);
        }
        let bytes = match tokio::fs::read(self.conv_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub async fn list(&self) -> Vec<ConversationSummary> {
        let mut summaries: Vec<ConversationSummary> =
            self.index.read().await.values().cloned().collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    /// Idempotent: deleting a missing conversation is not an error.
    pub async fn delete(&self, id: Uuid) -> Result<bool, ApiError> {
        let existed = self.index.write().await.remove(&id).is_some();
        match tokio::fs::remove_file(self.conv_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if existed {
            self.persist_index().await?;
        }
        Ok(existed)
    }

    pub async fn rename(&self, id: Uuid, title: String) -> Result<Conversation, ApiError> {
        let mut conversation = self
            .load(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("conversation {}", id)))?;
        conversation.title = title;
        conversation.updated_at = chrono::Utc::now();
        self.save(&conversation).await?;
        Ok(conversation)
    }

    fn conv_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn persist_index(&self) -> Result<(), ApiError> {
        let index: HashMap<Uuid, ConversationSummary> = self.index.read().await.clone();
        write_json_atomic(&self.dir.join("index.json"), &index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatMessage;

    #[tokio::test]
    async fn save_load_roundtrip_preserves_messages() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConversationStore::open(tmp.path()).await.unwrap();

        let mut conv = Conversation::new(None);
        conv.title = "First question".to_string();
        conv.messages.push(ChatMessage::user("What is this?".to_string()));
        conv.messages
            .push(ChatMessage::assistant("An answer.".to_string(), Vec::new(), Vec::new()));
        store.save(&conv).await.unwrap();

        let loaded = store.load(conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, conv.id);
        assert_eq!(loaded.title, conv.title);
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "What is this?");
        // Second precision is enough for persisted timestamps
        assert_eq!(
            loaded.created_at.timestamp(),
            conv.created_at.timestamp()
        );
        assert_eq!(
            loaded.updated_at.timestamp(),
            conv.updated_at.timestamp()
        );
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let id = {
            let store = ConversationStore::open(tmp.path()).await.unwrap();
            let mut conv = Conversation::new(None);
            conv.title = "Kept".to_string();
            store.save(&conv).await.unwrap();
            conv.id
        };

        let store = ConversationStore::open(tmp.path()).await.unwrap();
        let listed = store.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].title, "Kept");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConversationStore::open(tmp.path()).await.unwrap();
        let conv = Conversation::new(None);
        store.save(&conv).await.unwrap();

        assert!(store.delete(conv.id).await.unwrap());
        assert!(!store.delete(conv.id).await.unwrap());
        assert!(store.load(conv.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_updates_index() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConversationStore::open(tmp.path()).await.unwrap();
        let conv = Conversation::new(None);
        store.save(&conv).await.unwrap();

        store.rename(conv.id, "Renamed".to_string()).await.unwrap();
        let listed = store.list().await;
        assert_eq!(listed[0].title, "Renamed");
    }
}
