use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::models::document::{Chunk, Document, Region};
use crate::models::retrieval::{
    CoverageDescriptor, DocumentCoverage, RetrievalOutcome, RetrievalStrategy, SourceMetadata,
    SourceRef,
};
use crate::services::embedding::EmbeddingProvider;
use crate::storage::{DocumentStore, ScoredChunk, VectorStore};
use crate::utils::error::ApiError;

/// Diverse retrieval never selects fewer chunks than this when the corpus
/// has them.
const DIVERSE_FLOOR: usize = 6;

/// Region allocation proportions for diverse retrieval (intro/middle/conclusion).
const REGION_SHARES: [f32; 3] = [0.30, 0.40, 0.30];

const EXCERPT_MAX_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub document_ids: Option<Vec<Uuid>>,
    pub strategy: RetrievalStrategy,
    pub target_pct: Option<f32>,
    pub escalate: bool,
}

pub struct Retriever {
    document_store: Arc<DocumentStore>,
    vector_store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        document_store: Arc<DocumentStore>,
        vector_store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            document_store,
            vector_store,
            embedder,
            config,
        }
    }

    /// Run one retrieval. An empty corpus produces an empty outcome with a
    /// warning, never an error.
    pub async fn retrieve(&self, req: RetrievalRequest) -> Result<RetrievalOutcome, ApiError> {
        let eligible = self.eligible_documents(req.document_ids.as_deref()).await;
        if eligible.is_empty() {
            info!("Retrieval skipped: no ready documents for request");
            return Ok(RetrievalOutcome::empty(
                req.strategy,
                Some("no_context: no ready documents were available for retrieval".to_string()),
            ));
        }

        let eligible_ids: HashSet<Uuid> = eligible.iter().map(|d| d.id).collect();
        let total = self.vector_store.chunk_count(&eligible_ids).await;
        if total == 0 {
            return Ok(RetrievalOutcome::empty(
                req.strategy,
                Some("no_context: the eligible documents contain no indexed chunks".to_string()),
            ));
        }

        let embed_start = Instant::now();
        let query_vec = self
            .embedder
            .embed(std::slice::from_ref(&req.query))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::EmbeddingFailed("empty embedding batch".to_string()))?;
        let embedding_ms = embed_start.elapsed().as_millis() as u64;

        let selected = match req.strategy {
            RetrievalStrategy::Similarity => {
                self.select_similarity(&query_vec, &eligible_ids).await?
            }
            RetrievalStrategy::Diverse => {
                let target_pct = req
                    .target_pct
                    .unwrap_or(self.config.default_coverage_pct);
                let target_pct = if req.escalate {
                    (target_pct + 15.0).min(self.config.max_coverage_pct)
                } else {
                    target_pct
                };
                self.select_diverse(&query_vec, &eligible_ids, total, target_pct)
                    .await?
            }
        };

        debug!(
            "Retrieved {} of {} chunk(s) via {} strategy",
            selected.len(),
            total,
            req.strategy.as_str()
        );

        let coverage = self
            .build_coverage(req.strategy, &selected, &eligible)
            .await;
        let sources = selected
            .into_iter()
            .map(|sc| source_ref(sc.chunk, sc.score, &eligible))
            .collect();

        Ok(RetrievalOutcome {
            sources,
            coverage,
            warnings: Vec::new(),
            embedding_ms,
        })
    }

    /// Recompute coverage over an arbitrary chunk-id union, used for the
    /// cumulative view of a conversation.
    pub async fn coverage_for_chunk_ids(
        &self,
        chunk_ids: &[Uuid],
        document_ids: Option<&[Uuid]>,
        strategy: RetrievalStrategy,
    ) -> CoverageDescriptor {
        let eligible = self.eligible_documents(document_ids).await;
        if eligible.is_empty() {
            return CoverageDescriptor::empty(strategy);
        }
        let chunks = self.vector_store.get_chunks(chunk_ids).await;
        let scored: Vec<ScoredChunk> = chunks
            .into_iter()
            .map(|chunk| ScoredChunk { chunk, score: 1.0 })
            .collect();
        self.build_coverage(strategy, &scored, &eligible).await
    }

    async fn eligible_documents(&self, requested: Option<&[Uuid]>) -> Vec<Document> {
        let ready = self.document_store.ready_ids().await;
        let ready: HashSet<Uuid> = ready.into_iter().collect();

        let ids: Vec<Uuid> = match requested {
            Some(ids) if !ids.is_empty() => {
                ids.iter().copied().filter(|id| ready.contains(id)).collect()
            }
            _ => ready.into_iter().collect(),
        };

        let mut docs: Vec<Document> =
            futures::future::join_all(ids.into_iter().map(|id| self.document_store.get(id)))
                .await
                .into_iter()
                .flatten()
                .collect();
        docs.sort_by_key(|d| d.id);
        docs
    }

    async fn select_similarity(
        &self,
        query: &[f32],
        eligible: &HashSet<Uuid>,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        let mut results = self
            .vector_store
            .top_k(query, self.config.top_k, eligible)
            .await?;
        results.retain(|sc| sc.score >= self.config.similarity_threshold);
        Ok(results)
    }

    /// Region-stratified sampling toward a target coverage percentage.
    /// Under-populated regions spill their quota to adjacent regions.
    async fn select_diverse(
        &self,
        query: &[f32],
        eligible: &HashSet<Uuid>,
        total: usize,
        target_pct: f32,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        let target = diverse_target(total, target_pct, self.config.max_coverage_pct);

        let scored = self.vector_store.scored_chunks(query, eligible).await?;

        // scored_chunks is already ordered score desc, ordinal asc, so each
        // region pool keeps that ranking.
        let mut pools: HashMap<Region, Vec<ScoredChunk>> = HashMap::new();
        for sc in scored {
            pools.entry(sc.chunk.region).or_default().push(sc);
        }

        let quotas = allocate_quotas(target);
        let mut cursors: HashMap<Region, usize> = HashMap::new();
        let mut selected: Vec<ScoredChunk> = Vec::with_capacity(target);
        let mut deficits: Vec<(Region, usize)> = Vec::new();

        for (region, quota) in Region::ALL.into_iter().zip(quotas) {
            let pool = pools.get(&region).map(Vec::as_slice).unwrap_or(&[]);
            let take = quota.min(pool.len());
            selected.extend_from_slice(&pool[..take]);
            cursors.insert(region, take);
            if take < quota {
                deficits.push((region, quota - take));
            }
        }

        // An under-populated region spills its unmet quota into adjacent
        // regions that still have unselected chunks.
        for (region, deficit) in deficits {
            let mut need = deficit;
            for neighbor in spill_neighbors(region) {
                let pool = pools.get(&neighbor).map(Vec::as_slice).unwrap_or(&[]);
                let cursor = cursors.entry(neighbor).or_insert(0);
                while need > 0 && *cursor < pool.len() {
                    selected.push(pool[*cursor].clone());
                    *cursor += 1;
                    need -= 1;
                }
                if need == 0 {
                    break;
                }
            }
        }

        // Reading order for the prompt: document then ordinal. Scores stay
        // on the chunks.
        selected.sort_by_key(|sc| (sc.chunk.document_id, sc.chunk.ordinal));
        Ok(selected)
    }

    async fn build_coverage(
        &self,
        strategy: RetrievalStrategy,
        selected: &[ScoredChunk],
        eligible: &[Document],
    ) -> CoverageDescriptor {
        let selected_by_doc: HashMap<Uuid, Vec<&Chunk>> = {
            let mut map: HashMap<Uuid, Vec<&Chunk>> = HashMap::new();
            for sc in selected {
                map.entry(sc.chunk.document_id).or_default().push(&sc.chunk);
            }
            map
        };

        let mut documents = Vec::with_capacity(eligible.len());
        let mut blind_spots = Vec::new();
        let mut chunks_total = 0;

        for doc in eligible {
            let doc_chunks = self.vector_store.chunks_for_document(doc.id).await;
            let available_regions: HashSet<Region> =
                doc_chunks.iter().map(|c| c.region).collect();
            let doc_total = doc_chunks.len();
            chunks_total += doc_total;

            let seen = selected_by_doc.get(&doc.id).map(Vec::len).unwrap_or(0);
            let seen_regions: HashSet<Region> = selected_by_doc
                .get(&doc.id)
                .map(|chunks| chunks.iter().map(|c| c.region).collect())
                .unwrap_or_default();

            if seen == 0 {
                blind_spots.push(format!("{} not sampled", doc.title));
            } else {
                for region in Region::ALL {
                    if available_regions.contains(&region) && !seen_regions.contains(&region) {
                        blind_spots.push(format!("{} of {} not sampled", region, doc.title));
                    }
                }
            }

            documents.push(DocumentCoverage {
                document_id: doc.id,
                title: doc.title.clone(),
                chunks_seen: seen,
                chunks_total: doc_total,
                coverage_percentage: percentage(seen, doc_total),
            });
        }

        let chunks_seen = selected.len();
        let coverage_percentage = percentage(chunks_seen, chunks_total);
        let coverage_summary = format!(
            "Sampled {} of {} chunk(s) ({:.1}%) across {} document(s) using {} retrieval",
            chunks_seen,
            chunks_total,
            coverage_percentage,
            eligible.len(),
            strategy.as_str()
        );

        CoverageDescriptor {
            retrieval_type: strategy,
            chunks_seen,
            chunks_total,
            coverage_percentage,
            documents,
            blind_spots,
            coverage_summary,
        }
    }
}

fn percentage(seen: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        100.0 * seen as f32 / total as f32
    }
}

/// Target chunk count for diverse retrieval: ceil(N * pct / 100), floored at
/// a minimum sample and capped by the max coverage percentage and N itself.
fn diverse_target(total: usize, target_pct: f32, max_pct: f32) -> usize {
    let raw = (total as f32 * target_pct / 100.0).ceil() as usize;
    let ceiling = (total as f32 * max_pct / 100.0).ceil() as usize;
    raw.max(DIVERSE_FLOOR).min(ceiling.max(1)).min(total)
}

/// Largest-remainder split of the target across the 30/40/30 region shares.
fn allocate_quotas(target: usize) -> [usize; 3] {
    let exact: Vec<f32> = REGION_SHARES.iter().map(|s| target as f32 * s).collect();
    let mut quotas: Vec<usize> = exact.iter().map(|x| x.floor() as usize).collect();
    let mut assigned: usize = quotas.iter().sum();

    let mut order: Vec<usize> = (0..3).collect();
    order.sort_by(|&a, &b| {
        let fa = exact[a] - exact[a].floor();
        let fb = exact[b] - exact[b].floor();
        fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut i = 0;
    while assigned < target {
        quotas[order[i % 3]] += 1;
        assigned += 1;
        i += 1;
    }

    [quotas[0], quotas[1], quotas[2]]
}

fn spill_neighbors(region: Region) -> [Region; 2] {
    match region {
        Region::Intro => [Region::Middle, Region::Conclusion],
        Region::Middle => [Region::Intro, Region::Conclusion],
        Region::Conclusion => [Region::Middle, Region::Intro],
    }
}

fn source_ref(chunk: Chunk, score: f32, eligible: &[Document]) -> SourceRef {
    let doc = eligible.iter().find(|d| d.id == chunk.document_id);
    let excerpt: String = chunk.text.chars().take(EXCERPT_MAX_CHARS).collect();
    SourceRef {
        document_id: chunk.document_id,
        chunk_id: chunk.id,
        excerpt,
        relevance_score: score.clamp(0.0, 1.0),
        metadata: SourceMetadata {
            title: doc.map(|d| d.title.clone()).unwrap_or_default(),
            filename: doc.map(|d| d.filename.clone()).unwrap_or_default(),
            page: chunk.page,
            section_title: chunk.section_title,
            region: chunk.region,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::models::document::{Document, DocumentStatus, DocumentType};
    use async_trait::async_trait;

    /// Deterministic stand-in for the embedding backend: every text maps to
    /// the same unit vector, so ranking falls back to ordinal tie-breaks.
    struct FlatEmbedder {
        dimension: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlatEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(texts
                .iter()
                .map(|_| {
                    let mut v = vec![0.0; self.dimension];
                    v[0] = 1.0;
                    v
                })
                .collect())
        }
    }

    fn test_config() -> RetrievalConfig {
        RetrievalConfig {
            similarity_threshold: 0.35,
            top_k: 10,
            default_coverage_pct: 35.0,
            max_coverage_pct: 60.0,
        }
    }

    async fn seed_document(
        docs: &DocumentStore,
        vectors: &VectorStore,
        title: &str,
        chunk_count: usize,
        dim: usize,
    ) -> Uuid {
        let doc = docs
            .create(Document::new(
                title.to_string(),
                format!("{}.txt", title),
                DocumentType::Txt,
            ))
            .await
            .unwrap();
        docs.set_status(doc.id, DocumentStatus::Processing, None)
            .await
            .unwrap();

        let entries: Vec<(Chunk, Vec<f32>)> = (0..chunk_count)
            .map(|ordinal| {
                let chunk = Chunk {
                    id: Uuid::new_v4(),
                    document_id: doc.id,
                    ordinal,
                    text: format!("{} chunk {}", title, ordinal),
                    page: None,
                    section_title: None,
                    region: Region::of(ordinal, chunk_count),
                };
                let mut v = vec![0.0; dim];
                v[0] = 1.0;
                (chunk, v)
            })
            .collect();
        vectors.add_document(doc.id, entries).await.unwrap();
        docs.set_chunk_count(doc.id, chunk_count).await.unwrap();
        docs.set_status(doc.id, DocumentStatus::Ready, None)
            .await
            .unwrap();
        doc.id
    }

    async fn retriever_with(
        dir: &std::path::Path,
    ) -> (Retriever, Arc<DocumentStore>, Arc<VectorStore>) {
        let docs = Arc::new(DocumentStore::open(dir).await.unwrap());
        let vectors = Arc::new(VectorStore::open(dir).await.unwrap());
        let retriever = Retriever::new(
            docs.clone(),
            vectors.clone(),
            Arc::new(FlatEmbedder { dimension: 4 }),
            test_config(),
        );
        (retriever, docs, vectors)
    }

    #[test]
    fn quotas_follow_thirty_forty_thirty() {
        assert_eq!(allocate_quotas(10), [3, 4, 3]);
        let q = allocate_quotas(105);
        assert_eq!(q.iter().sum::<usize>(), 105);
        assert!((q[0] as i64 - 32).abs() <= 1);
        assert_eq!(q[1], 42);
        assert!((q[2] as i64 - 32).abs() <= 1);
    }

    #[test]
    fn diverse_target_clamps() {
        // 35% of 300 chunks
        assert_eq!(diverse_target(300, 35.0, 60.0), 105);
        // Escalated past the cap
        assert_eq!(diverse_target(300, 65.0, 60.0), 180);
        // Small corpora hit the floor, bounded by N
        assert_eq!(diverse_target(10, 35.0, 60.0), 6);
        assert_eq!(diverse_target(4, 35.0, 60.0), 3);
    }

    #[tokio::test]
    async fn empty_corpus_yields_warning_not_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, _, _) = retriever_with(tmp.path()).await;

        let outcome = retriever
            .retrieve(RetrievalRequest {
                query: "anything".to_string(),
                document_ids: None,
                strategy: RetrievalStrategy::Similarity,
                target_pct: None,
                escalate: false,
            })
            .await
            .unwrap();

        assert!(outcome.sources.is_empty());
        assert_eq!(outcome.coverage.chunks_seen, 0);
        assert!(outcome.warnings.iter().any(|w| w.starts_with("no_context")));
    }

    #[tokio::test]
    async fn similarity_respects_top_k_and_reports_coverage() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, docs, vectors) = retriever_with(tmp.path()).await;
        seed_document(&docs, &vectors, "a", 30, 4).await;

        let outcome = retriever
            .retrieve(RetrievalRequest {
                query: "what is data feminism?".to_string(),
                document_ids: None,
                strategy: RetrievalStrategy::Similarity,
                target_pct: None,
                escalate: false,
            })
            .await
            .unwrap();

        assert_eq!(outcome.sources.len(), 10);
        assert_eq!(outcome.coverage.chunks_total, 30);
        assert!((outcome.coverage.coverage_percentage - 100.0 * 10.0 / 30.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn diverse_selection_hits_region_proportions() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, docs, vectors) = retriever_with(tmp.path()).await;
        seed_document(&docs, &vectors, "b", 300, 4).await;

        let outcome = retriever
            .retrieve(RetrievalRequest {
                query: "summarize this document".to_string(),
                document_ids: None,
                strategy: RetrievalStrategy::Diverse,
                target_pct: None,
                escalate: false,
            })
            .await
            .unwrap();

        assert_eq!(outcome.sources.len(), 105);

        let mut by_region: HashMap<Region, usize> = HashMap::new();
        for s in &outcome.sources {
            *by_region.entry(s.metadata.region).or_insert(0) += 1;
        }
        let intro = by_region.get(&Region::Intro).copied().unwrap_or(0) as i64;
        let middle = by_region.get(&Region::Middle).copied().unwrap_or(0) as i64;
        let conclusion = by_region.get(&Region::Conclusion).copied().unwrap_or(0) as i64;
        assert!((intro - 32).abs() <= 1, "intro share was {}", intro);
        assert!((middle - 42).abs() <= 1, "middle share was {}", middle);
        assert!((conclusion - 32).abs() <= 1, "conclusion share was {}", conclusion);
    }

    #[tokio::test]
    async fn escalation_raises_coverage_to_fifty_percent() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, docs, vectors) = retriever_with(tmp.path()).await;
        seed_document(&docs, &vectors, "b", 300, 4).await;

        let outcome = retriever
            .retrieve(RetrievalRequest {
                query: "summarize this document".to_string(),
                document_ids: None,
                strategy: RetrievalStrategy::Diverse,
                target_pct: None,
                escalate: true,
            })
            .await
            .unwrap();

        assert_eq!(outcome.sources.len(), 150);
        assert!((outcome.coverage.coverage_percentage - 50.0).abs() < 0.5);
    }

    #[tokio::test]
    async fn unsampled_document_becomes_blind_spot() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, docs, vectors) = retriever_with(tmp.path()).await;
        let first = seed_document(&docs, &vectors, "first", 12, 4).await;
        seed_document(&docs, &vectors, "second", 12, 4).await;

        // Coverage restricted to chunks of one document only
        let chunk_ids: Vec<Uuid> = vectors
            .chunks_for_document(first)
            .await
            .into_iter()
            .map(|c| c.id)
            .collect();
        let coverage = retriever
            .coverage_for_chunk_ids(&chunk_ids, None, RetrievalStrategy::Diverse)
            .await;

        assert!(coverage
            .blind_spots
            .iter()
            .any(|b| b == "second not sampled"));
        assert!(!coverage.blind_spots.iter().any(|b| b.contains("first")));
    }

    #[tokio::test]
    async fn small_corpus_floors_at_six_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, docs, vectors) = retriever_with(tmp.path()).await;
        seed_document(&docs, &vectors, "tiny", 9, 4).await;

        let outcome = retriever
            .retrieve(RetrievalRequest {
                query: "overview please".to_string(),
                document_ids: None,
                strategy: RetrievalStrategy::Diverse,
                target_pct: None,
                escalate: false,
            })
            .await
            .unwrap();

        assert_eq!(outcome.sources.len(), 6);
    }
}
