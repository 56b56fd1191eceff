use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::document::chunker::TextChunker;
use crate::document::parser::DocumentParser;
use crate::models::document::DocumentStatus;
use crate::services::embedding::EmbeddingProvider;
use crate::storage::{DocumentStore, VectorStore};
use crate::utils::error::ApiError;

use super::queue::{IngestQueue, IngestTask};

/// Parse -> chunk -> embed -> index for one uploaded document. Serialized
/// per document id; independent documents process in parallel across the
/// worker pool.
pub struct IngestPipeline {
    document_store: Arc<DocumentStore>,
    vector_store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: TextChunker,
    batch_size: usize,
    doc_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl IngestPipeline {
    pub fn new(
        document_store: Arc<DocumentStore>,
        vector_store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            document_store,
            vector_store,
            embedder,
            chunker: TextChunker::new(config.chunk_size, config.chunk_overlap),
            batch_size: config.embedding_batch_size.max(1),
            doc_locks: DashMap::new(),
        }
    }

    pub async fn process(&self, task: IngestTask) {
        let document_id = task.document_id;
        let lock = self
            .doc_locks
            .entry(document_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        info!("Ingesting document {} ({} bytes)", document_id, task.data.len());

        if let Err(e) = self.run(task).await {
            error!("Ingestion failed for document {}: {}", document_id, e);
            if let Err(e2) = self
                .document_store
                .set_status(document_id, DocumentStatus::Failed, Some(e.to_string()))
                .await
            {
                error!("Could not mark document {} failed: {}", document_id, e2);
            }
        }

        self.doc_locks.remove(&document_id);
    }

    async fn run(&self, task: IngestTask) -> Result<(), ApiError> {
        let document_id = task.document_id;
        self.document_store
            .set_status(document_id, DocumentStatus::Processing, None)
            .await?;

        // Parsing is CPU-bound; keep it off the request scheduler.
        let doc_type = task.doc_type;
        let data = task.data;
        let parsed = tokio::task::spawn_blocking(move || DocumentParser::parse(&data, doc_type))
            .await
            .map_err(|e| ApiError::PersistenceFailed(format!("parser task panicked: {}", e)))?
            .map_err(|e| ApiError::InputInvalid(format!("could not parse document: {}", e)))?;

        if parsed.content.trim().is_empty() {
            return Err(ApiError::InputInvalid(
                "no text content found in document".to_string(),
            ));
        }

        let raw_chunks = self
            .chunker
            .chunk(&parsed.content)
            .map_err(|e| ApiError::InputInvalid(format!("chunking failed: {}", e)))?;
        if raw_chunks.is_empty() {
            return Err(ApiError::InputInvalid("document produced no chunks".to_string()));
        }

        let chunks = self.chunker.into_chunks(document_id, &parsed, raw_chunks);
        debug!("Document {} produced {} chunk(s)", document_id, chunks.len());

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self.embedder.embed(&texts).await?;
            vectors.extend(embedded);
        }

        let entries: Vec<_> = chunks.into_iter().zip(vectors).collect();
        let chunk_count = entries.len();
        self.vector_store.add_document(document_id, entries).await?;

        self.document_store
            .set_chunk_count(document_id, chunk_count)
            .await?;
        self.document_store
            .set_status(document_id, DocumentStatus::Ready, None)
            .await?;

        info!("Document {} ready with {} chunk(s)", document_id, chunk_count);
        Ok(())
    }
}

/// Fixed-size worker pool draining the ingest queue. Uploads never block on
/// the pool; they enqueue and return with the document still pending.
pub struct IngestWorkerPool {
    queue: Arc<IngestQueue>,
}

impl IngestWorkerPool {
    pub fn spawn(pipeline: Arc<IngestPipeline>, worker_count: usize) -> Self {
        let queue = Arc::new(IngestQueue::new());

        for worker in 0..worker_count.max(1) {
            let queue = queue.clone();
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                debug!("Ingest worker {} started", worker);
                loop {
                    let task = queue.dequeue().await;
                    pipeline.process(task).await;
                }
            });
        }

        Self { queue }
    }

    pub async fn submit(&self, task: IngestTask) {
        self.queue.enqueue(task).await;
    }

    pub async fn backlog(&self) -> usize {
        self.queue.len().await
    }
}
