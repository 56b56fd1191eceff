use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::document::{Document, DocumentStatus, DocumentSummary};
use crate::utils::error::ApiError;

use super::{write_json_atomic, write_atomic};

/// File-backed document registry: one JSON file per document plus an
/// index.json for listings. The in-memory map is the working copy; every
/// mutation persists before returning.
pub struct DocumentStore {
    dir: PathBuf,
    inner: RwLock<HashMap<Uuid, Document>>,
}

impl DocumentStore {
    pub async fn open(data_dir: &Path) -> Result<Self, ApiError> {
        let dir = data_dir.join("documents");
        tokio::fs::create_dir_all(&dir).await?;

        let mut documents = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".json") || name == "index.json" || name.starts_with('.') {
                continue;
            }
            match std::fs::read(&path)
                .map_err(anyhow::Error::from)
                .and_then(|bytes| serde_json::from_slice::<Document>(&bytes).map_err(Into::into))
            {
                Ok(doc) => {
                    documents.insert(doc.id, doc);
                }
                Err(e) => warn!("Skipping unreadable document file {}: {}", path.display(), e),
            }
        }

        info!("Loaded {} document records from {}", documents.len(), dir.display());

        let store = Self {
            dir,
            inner: RwLock::new(documents),
        };
        store.persist_index().await?;
        Ok(store)
    }

    /// Documents stuck mid-ingestion when the process died are unrecoverable:
    /// their chunks may be partial. Mark them failed so the caller can retry.
    pub async fn reconcile_startup(&self) -> Result<Vec<Uuid>, ApiError> {
        let mut stale = Vec::new();
        {
            let mut inner = self.inner.write().await;
            for doc in inner.values_mut() {
                if matches!(doc.status, DocumentStatus::Pending | DocumentStatus::Processing) {
                    doc.status = DocumentStatus::Failed;
                    doc.error_message = Some("stale_on_restart".to_string());
                    doc.updated_at = Utc::now();
                    stale.push(doc.id);
                }
            }
            for id in &stale {
                let doc = inner[id].clone();
                write_json_atomic(&self.doc_path(*id), &doc).await?;
            }
        }
        if !stale.is_empty() {
            info!("Startup reconciliation marked {} stale document(s) failed", stale.len());
            self.persist_index().await?;
        }
        Ok(stale)
    }

    pub async fn create(&self, doc: Document) -> Result<Document, ApiError> {
        write_json_atomic(&self.doc_path(doc.id), &doc).await?;
        self.inner.write().await.insert(doc.id, doc.clone());
        self.persist_index().await?;
        debug!("Created document record {}", doc.id);
        Ok(doc)
    }

    pub async fn get(&self, id: Uuid) -> Option<Document> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<DocumentSummary> {
        let mut summaries: Vec<DocumentSummary> =
            self.inner.read().await.values().map(Document::summary).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    pub async fn ready_ids(&self) -> Vec<Uuid> {
        self.inner
            .read()
            .await
            .values()
            .filter(|d| d.status == DocumentStatus::Ready)
            .map(|d| d.id)
            .collect()
    }

    pub async fn all_ids(&self) -> Vec<Uuid> {
        self.inner.read().await.keys().copied().collect()
    }

    /// Enforced forward-only status transition.
    pub async fn set_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<String>,
    ) -> Result<Document, ApiError> {
        let updated = {
            let mut inner = self.inner.write().await;
            let doc = inner
                .get_mut(&id)
                .ok_or_else(|| ApiError::NotFound(format!("document {}", id)))?;
            if !doc.status.can_transition_to(status) {
                return Err(ApiError::PersistenceFailed(format!(
                    "illegal status transition {} -> {} for document {}",
                    doc.status.as_str(),
                    status.as_str(),
                    id
                )));
            }
            doc.status = status;
            doc.error_message = error_message;
            doc.updated_at = Utc::now();
            doc.clone()
        };
        write_json_atomic(&self.doc_path(id), &updated).await?;
        self.persist_index().await?;
        Ok(updated)
    }

    pub async fn set_chunk_count(&self, id: Uuid, chunk_count: usize) -> Result<(), ApiError> {
        let updated = {
            let mut inner = self.inner.write().await;
            let doc = inner
                .get_mut(&id)
                .ok_or_else(|| ApiError::NotFound(format!("document {}", id)))?;
            doc.chunk_count = chunk_count;
            doc.updated_at = Utc::now();
            doc.clone()
        };
        write_json_atomic(&self.doc_path(id), &updated).await?;
        self.persist_index().await?;
        Ok(())
    }

    /// Idempotent delete: returns false when the document was already gone.
    pub async fn delete(&self, id: Uuid) -> Result<bool, ApiError> {
        let existed = self.inner.write().await.remove(&id).is_some();
        match tokio::fs::remove_file(self.doc_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if existed {
            self.persist_index().await?;
        }
        Ok(existed)
    }

    pub async fn status_counts(&self) -> HashMap<&'static str, usize> {
        let mut counts = HashMap::new();
        for doc in self.inner.read().await.values() {
            *counts.entry(doc.status.as_str()).or_insert(0) += 1;
        }
        counts
    }

    fn doc_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn persist_index(&self) -> Result<(), ApiError> {
        let index: HashMap<Uuid, DocumentSummary> = self
            .inner
            .read()
            .await
            .iter()
            .map(|(id, doc)| (*id, doc.summary()))
            .collect();
        let bytes = serde_json::to_vec_pretty(&index)?;
        write_atomic(&self.dir.join("index.json"), &bytes).await
    }
}
