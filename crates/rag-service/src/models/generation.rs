use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::retrieval::{CoverageDescriptor, RetrievalStrategy, SourceRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intent {
    Analysis,
    Qa,
    Writing,
}

impl Intent {
    pub fn suggested_retrieval(self) -> RetrievalStrategy {
        match self {
            Self::Analysis => RetrievalStrategy::Diverse,
            Self::Qa | Self::Writing => RetrievalStrategy::Similarity,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "ANALYSIS",
            Self::Qa => "QA",
            Self::Writing => "WRITING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryScope {
    #[serde(rename = "BROAD")]
    Broad,
    #[serde(rename = "FOCUSED")]
    Focused,
    #[serde(rename = "N/A")]
    NotApplicable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f32,
    pub reasoning: String,
    pub suggested_retrieval: RetrievalStrategy,
    pub summary_scope: SummaryScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_topic: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    Unknown,
}

/// One validated slice of model output. `sources` and `warnings` are always
/// present, possibly empty; `content` carries only citations that resolve
/// into `sources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    pub sources: Vec<SourceRef>,
    pub confidence: Confidence,
    pub warnings: Vec<String>,
    pub is_user_edited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMetadata {
    pub intent: IntentClassification,
    pub coverage: CoverageDescriptor,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timings {
    pub embedding_ms: u64,
    pub retrieval_ms: u64,
    pub generation_ms: u64,
    pub validation_ms: u64,
    pub total_ms: u64,
}
