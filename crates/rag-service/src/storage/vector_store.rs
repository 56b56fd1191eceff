use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::document::Chunk;
use crate::utils::error::ApiError;
use crate::utils::similarity::cosine_similarity;

use super::{write_atomic, write_json_atomic};

const INDEX_FILE: &str = "index.bin";
const CHUNKS_FILE: &str = "chunks.json";

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorStoreStats {
    pub total_chunks: usize,
    pub total_documents: usize,
    pub dimension: Option<usize>,
}

struct IndexState {
    dimension: Option<usize>,
    vectors: HashMap<Uuid, Vec<f32>>,
    chunks: HashMap<Uuid, Chunk>,
}

impl IndexState {
    fn empty() -> Self {
        Self {
            dimension: None,
            vectors: HashMap::new(),
            chunks: HashMap::new(),
        }
    }
}

/// Flat vector index plus the chunk store it is keyed against. Read-mostly:
/// searches take the read lock, ingestion and deletion take the write lock.
/// Persisted as vectors/index.bin (binary) and vectors/chunks.json.
pub struct VectorStore {
    dir: PathBuf,
    inner: RwLock<IndexState>,
}

impl VectorStore {
    pub async fn open(data_dir: &Path) -> Result<Self, ApiError> {
        let dir = data_dir.join("vectors");
        tokio::fs::create_dir_all(&dir).await?;

        let mut state = IndexState::empty();

        let chunks_path = dir.join(CHUNKS_FILE);
        if chunks_path.exists() {
            let bytes = std::fs::read(&chunks_path)?;
            let chunks: Vec<Chunk> = serde_json::from_slice(&bytes)?;
            state.chunks = chunks.into_iter().map(|c| (c.id, c)).collect();
        }

        let index_path = dir.join(INDEX_FILE);
        if index_path.exists() {
            let bytes = std::fs::read(&index_path)?;
            let (dimension, vectors) = decode_index(&bytes)
                .map_err(|e| ApiError::PersistenceFailed(format!("corrupt index.bin: {}", e)))?;
            state.dimension = dimension;
            state.vectors = vectors;
        }

        // A vector whose chunk record is missing is a remnant of a crashed
        // two-phase delete; drop it here rather than serving it.
        let orphans: Vec<Uuid> = state
            .vectors
            .keys()
            .filter(|id| !state.chunks.contains_key(id))
            .copied()
            .collect();
        if !orphans.is_empty() {
            warn!("Pruning {} orphaned vector(s) at startup", orphans.len());
            for id in orphans {
                state.vectors.remove(&id);
            }
        }

        info!(
            "Vector store loaded: {} chunks, {} vectors, dimension {:?}",
            state.chunks.len(),
            state.vectors.len(),
            state.dimension
        );

        let store = Self {
            dir,
            inner: RwLock::new(state),
        };
        store.persist().await?;
        Ok(store)
    }

    /// Drop chunks whose parent document no longer exists. Completes the
    /// second phase of any delete interrupted by a crash.
    pub async fn prune_orphans(&self, valid_doc_ids: &HashSet<Uuid>) -> Result<usize, ApiError> {
        let removed = {
            let mut state = self.inner.write().await;
            let doomed: Vec<Uuid> = state
                .chunks
                .values()
                .filter(|c| !valid_doc_ids.contains(&c.document_id))
                .map(|c| c.id)
                .collect();
            for id in &doomed {
                state.chunks.remove(id);
                state.vectors.remove(id);
            }
            doomed.len()
        };
        if removed > 0 {
            info!("Pruned {} chunk(s) with no parent document", removed);
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Replace a document's chunks and vectors. Vectors must share one
    /// dimension; the index learns its dimension from the first insert.
    pub async fn add_document(
        &self,
        document_id: Uuid,
        entries: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<(), ApiError> {
        {
            let mut state = self.inner.write().await;

            for (chunk, vector) in &entries {
                if chunk.document_id != document_id {
                    return Err(ApiError::PersistenceFailed(format!(
                        "chunk {} does not belong to document {}",
                        chunk.id, document_id
                    )));
                }
                match state.dimension {
                    None => state.dimension = Some(vector.len()),
                    Some(dim) if dim != vector.len() => {
                        return Err(ApiError::PersistenceFailed(format!(
                            "vector dimension mismatch: index is {}, got {}",
                            dim,
                            vector.len()
                        )));
                    }
                    Some(_) => {}
                }
            }

            // Re-ingestion replaces whatever was previously indexed.
            let stale: Vec<Uuid> = state
                .chunks
                .values()
                .filter(|c| c.document_id == document_id)
                .map(|c| c.id)
                .collect();
            for id in stale {
                state.chunks.remove(&id);
                state.vectors.remove(&id);
            }

            for (chunk, vector) in entries {
                state.vectors.insert(chunk.id, vector);
                state.chunks.insert(chunk.id, chunk);
            }
        }
        self.persist().await
    }

    /// Two-phase delete: vectors leave the index first, chunk records second.
    /// Startup reconciliation sweeps whichever phase a crash interrupts.
    pub async fn remove_document(&self, document_id: Uuid) -> Result<usize, ApiError> {
        let doomed: Vec<Uuid> = {
            let state = self.inner.read().await;
            state
                .chunks
                .values()
                .filter(|c| c.document_id == document_id)
                .map(|c| c.id)
                .collect()
        };

        {
            let mut state = self.inner.write().await;
            for id in &doomed {
                state.vectors.remove(id);
            }
        }
        self.persist_index().await?;

        {
            let mut state = self.inner.write().await;
            for id in &doomed {
                state.chunks.remove(id);
            }
        }
        self.persist_chunks().await?;

        debug!("Removed {} chunk(s) for document {}", doomed.len(), document_id);
        Ok(doomed.len())
    }

    /// Top-k by cosine similarity over the eligible documents. Results come
    /// back ordered by score descending, ordinal ascending on ties.
    pub async fn top_k(
        &self,
        query: &[f32],
        k: usize,
        eligible: &HashSet<Uuid>,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        let mut scored = self.scored_chunks(query, eligible).await?;
        scored.truncate(k);
        Ok(scored)
    }

    /// Score every eligible chunk against the query. Used directly by
    /// region-stratified retrieval, which needs the full ranking.
    pub async fn scored_chunks(
        &self,
        query: &[f32],
        eligible: &HashSet<Uuid>,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        let state = self.inner.read().await;
        let mut scored = Vec::new();
        for (id, chunk) in &state.chunks {
            if !eligible.contains(&chunk.document_id) {
                continue;
            }
            let Some(vector) = state.vectors.get(id) else {
                continue;
            };
            let score = cosine_similarity(query, vector)
                .map_err(|e| ApiError::RetrievalFailed(e.to_string()))?;
            scored.push(ScoredChunk {
                chunk: chunk.clone(),
                score,
            });
        }
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.ordinal.cmp(&b.chunk.ordinal))
        });
        Ok(scored)
    }

    pub async fn chunks_for_document(&self, document_id: Uuid) -> Vec<Chunk> {
        let state = self.inner.read().await;
        let mut chunks: Vec<Chunk> = state
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.ordinal);
        chunks
    }

    pub async fn get_chunks(&self, ids: &[Uuid]) -> Vec<Chunk> {
        let state = self.inner.read().await;
        ids.iter().filter_map(|id| state.chunks.get(id).cloned()).collect()
    }

    pub async fn chunk_count(&self, eligible: &HashSet<Uuid>) -> usize {
        let state = self.inner.read().await;
        state
            .chunks
            .values()
            .filter(|c| eligible.contains(&c.document_id))
            .count()
    }

    pub async fn stats(&self) -> VectorStoreStats {
        let state = self.inner.read().await;
        let docs: HashSet<Uuid> = state.chunks.values().map(|c| c.document_id).collect();
        VectorStoreStats {
            total_chunks: state.chunks.len(),
            total_documents: docs.len(),
            dimension: state.dimension,
        }
    }

    async fn persist(&self) -> Result<(), ApiError> {
        self.persist_chunks().await?;
        self.persist_index().await
    }

    async fn persist_chunks(&self) -> Result<(), ApiError> {
        let chunks: Vec<Chunk> = {
            let state = self.inner.read().await;
            let mut chunks: Vec<Chunk> = state.chunks.values().cloned().collect();
            chunks.sort_by_key(|c| (c.document_id, c.ordinal));
            chunks
        };
        write_json_atomic(&self.dir.join(CHUNKS_FILE), &chunks).await
    }

    async fn persist_index(&self) -> Result<(), ApiError> {
        let bytes = {
            let state = self.inner.read().await;
            encode_index(state.dimension, &state.vectors)
        };
        write_atomic(&self.dir.join(INDEX_FILE), &bytes).await
    }
}

/// index.bin layout: u32 dimension (0 = unset), u64 count, then per entry a
/// 16-byte chunk id followed by `dimension` little-endian f32 values.
fn encode_index(dimension: Option<usize>, vectors: &HashMap<Uuid, Vec<f32>>) -> Vec<u8> {
    let dim = dimension.unwrap_or(0);
    let mut out = Vec::with_capacity(12 + vectors.len() * (16 + dim * 4));
    out.extend_from_slice(&(dim as u32).to_le_bytes());
    out.extend_from_slice(&(vectors.len() as u64).to_le_bytes());

    let mut ids: Vec<&Uuid> = vectors.keys().collect();
    ids.sort();
    for id in ids {
        out.extend_from_slice(id.as_bytes());
        for value in &vectors[id] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out
}

fn decode_index(bytes: &[u8]) -> anyhow::Result<(Option<usize>, HashMap<Uuid, Vec<f32>>)> {
    use anyhow::Context;

    if bytes.len() < 12 {
        anyhow::bail!("truncated header");
    }
    let dim = u32::from_le_bytes(bytes[0..4].try_into()?) as usize;
    let count = u64::from_le_bytes(bytes[4..12].try_into()?) as usize;

    let entry_len = 16 + dim * 4;
    let expected = 12 + count * entry_len;
    if bytes.len() != expected {
        anyhow::bail!("expected {} bytes for {} entries, got {}", expected, count, bytes.len());
    }

    let mut vectors = HashMap::with_capacity(count);
    for i in 0..count {
        let offset = 12 + i * entry_len;
        let id = Uuid::from_slice(&bytes[offset..offset + 16]).context("bad chunk id")?;
        let mut vector = Vec::with_capacity(dim);
        for j in 0..dim {
            let at = offset + 16 + j * 4;
            vector.push(f32::from_le_bytes(bytes[at..at + 4].try_into()?));
        }
        vectors.insert(id, vector);
    }

    let dimension = if dim == 0 { None } else { Some(dim) };
    Ok((dimension, vectors))
}
