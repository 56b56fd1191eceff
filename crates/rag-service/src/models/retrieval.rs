use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    Similarity,
    Diverse,
}

impl RetrievalStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::Diverse => "diverse",
        }
    }
}

/// Value copy of a retrieved chunk handed to the prompt assembler and the
/// caller. Never persisted; holds ids only, no back-references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: Uuid,
    pub chunk_id: Uuid,
    pub excerpt: String,
    pub relevance_score: f32,
    pub metadata: SourceMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub title: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    pub region: Region,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCoverage {
    pub document_id: Uuid,
    pub title: String,
    pub chunks_seen: usize,
    pub chunks_total: usize,
    pub coverage_percentage: f32,
}

/// Computed from retrieval, never guessed by the model. Injected into the
/// prompt and returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageDescriptor {
    pub retrieval_type: RetrievalStrategy,
    pub chunks_seen: usize,
    pub chunks_total: usize,
    pub coverage_percentage: f32,
    pub documents: Vec<DocumentCoverage>,
    pub blind_spots: Vec<String>,
    pub coverage_summary: String,
}

impl CoverageDescriptor {
    pub fn empty(retrieval_type: RetrievalStrategy) -> Self {
        Self {
            retrieval_type,
            chunks_seen: 0,
            chunks_total: 0,
            coverage_percentage: 0.0,
            documents: Vec::new(),
            blind_spots: Vec::new(),
            coverage_summary: "No document content was available for retrieval.".to_string(),
        }
    }
}

/// What one retrieval call produced: ordered sources plus the coverage
/// contract. Warnings are non-fatal (an empty corpus is not an error).
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub sources: Vec<SourceRef>,
    pub coverage: CoverageDescriptor,
    pub warnings: Vec<String>,
    pub embedding_ms: u64,
}

impl RetrievalOutcome {
    pub fn empty(retrieval_type: RetrievalStrategy, warning: Option<String>) -> Self {
        Self {
            sources: Vec::new(),
            coverage: CoverageDescriptor::empty(retrieval_type),
            warnings: warning.into_iter().collect(),
            embedding_ms: 0,
        }
    }
}
