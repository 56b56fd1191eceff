use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ModelsConfig;
use crate::models::generation::{
    GeneratedSection, Intent, RetrievalMetadata, Timings,
};
use crate::services::generator::GeneratorProvider;
use crate::services::intent::IntentClassifier;
use crate::services::prompt::PromptAssembler;
use crate::services::retriever::{RetrievalRequest, Retriever};
use crate::services::validator::Validator;
use crate::utils::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub escalate_coverage: bool,
    #[serde(default)]
    pub intent_override: Option<Intent>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub generation_id: Uuid,
    pub sections: Vec<GeneratedSection>,
    pub retrieval_metadata: RetrievalMetadata,
    pub timings: Timings,
}

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    pub section_id: Uuid,
    pub original_content: String,
    #[serde(default)]
    pub refinement_prompt: Option<String>,
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    pub section: GeneratedSection,
    pub retrieval_metadata: RetrievalMetadata,
    pub timings: Timings,
}

/// Top-level request pipeline: classify, retrieve, assemble, generate,
/// validate. Nothing here persists; chat persistence lives in the chat
/// controller.
pub struct Orchestrator {
    retriever: Arc<Retriever>,
    generator: Arc<dyn GeneratorProvider>,
    models: ModelsConfig,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Arc<dyn GeneratorProvider>,
        models: ModelsConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            models,
        }
    }

    pub async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ApiError> {
        if req.prompt.trim().is_empty() {
            return Err(ApiError::InputInvalid("prompt must not be empty".to_string()));
        }

        let total_start = Instant::now();
        let classification =
            IntentClassifier::classify_with_override(&req.prompt, req.intent_override);
        info!(
            intent = classification.intent.as_str(),
            strategy = classification.suggested_retrieval.as_str(),
            "Generation request classified"
        );

        let retrieval_start = Instant::now();
        let outcome = self
            .retriever
            .retrieve(RetrievalRequest {
                query: req.prompt.clone(),
                document_ids: req.document_ids.clone(),
                strategy: classification.suggested_retrieval,
                target_pct: None,
                escalate: req.escalate_coverage,
            })
            .await?;
        let retrieval_ms =
            (retrieval_start.elapsed().as_millis() as u64).saturating_sub(outcome.embedding_ms);

        let mut warnings = outcome.warnings.clone();
        if outcome.sources.is_empty() && !warnings.iter().any(|w| w.starts_with("no_context")) {
            // An empty similarity result is not retried with the diverse
            // strategy; the model is asked to state its inability instead.
            warnings.push(
                "no_context: retrieval returned no chunks above the similarity threshold"
                    .to_string(),
            );
        }

        let assembled = PromptAssembler::assemble(
            &classification,
            &req.prompt,
            &outcome.sources,
            &outcome.coverage,
            None,
        );

        let model = self.models.for_intent(classification.intent);
        let generation_start = Instant::now();
        let raw_output = self
            .generator
            .generate(&assembled.system_prompt, &assembled.user_prompt, model)
            .await?;
        let generation_ms = generation_start.elapsed().as_millis() as u64;

        let validation_start = Instant::now();
        let sections = Validator::validate(&raw_output, &outcome.sources, assembled.template);
        let validation_ms = validation_start.elapsed().as_millis() as u64;

        debug!(
            sections = sections.len(),
            sources = outcome.sources.len(),
            "Generation validated"
        );

        Ok(GenerateResponse {
            generation_id: Uuid::new_v4(),
            sections,
            retrieval_metadata: RetrievalMetadata {
                intent: classification,
                coverage: outcome.coverage,
                warnings,
            },
            timings: Timings {
                embedding_ms: outcome.embedding_ms,
                retrieval_ms,
                generation_ms,
                validation_ms,
                total_ms: total_start.elapsed().as_millis() as u64,
            },
        })
    }

    /// Re-run retrieval and generation for one section. The replacement
    /// always comes back with `is_user_edited` false.
    pub async fn regenerate(&self, req: RegenerateRequest) -> Result<RegenerateResponse, ApiError> {
        let query = req
            .refinement_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| req.original_content.clone());
        if query.trim().is_empty() {
            return Err(ApiError::InputInvalid(
                "either original_content or refinement_prompt must be non-empty".to_string(),
            ));
        }

        let response = self
            .generate(GenerateRequest {
                prompt: query,
                document_ids: req.document_ids,
                escalate_coverage: false,
                intent_override: None,
            })
            .await?;

        let mut section = response
            .sections
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::GenerationFailed("no section produced".to_string()))?;
        section.id = req.section_id;
        section.is_user_edited = false;

        Ok(RegenerateResponse {
            section,
            retrieval_metadata: response.retrieval_metadata,
            timings: response.timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelsConfig, RetrievalConfig};
    use crate::models::generation::Confidence;
    use crate::services::embedding::EmbeddingProvider;
    use crate::services::generator::MockGeneratorProvider;
    use crate::storage::{DocumentStore, VectorStore};
    use async_trait::async_trait;

    struct FlatEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FlatEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn models() -> ModelsConfig {
        ModelsConfig {
            generation_model: "gen".to_string(),
            embedding_model: "emb".to_string(),
            analysis_model: None,
            writing_model: None,
            qa_model: None,
        }
    }

    async fn empty_orchestrator(dir: &std::path::Path, generator: MockGeneratorProvider) -> Orchestrator {
        let docs = Arc::new(DocumentStore::open(dir).await.unwrap());
        let vectors = Arc::new(VectorStore::open(dir).await.unwrap());
        let retriever = Arc::new(Retriever::new(
            docs,
            vectors,
            Arc::new(FlatEmbedder),
            RetrievalConfig {
                similarity_threshold: 0.35,
                top_k: 10,
                default_coverage_pct: 35.0,
                max_coverage_pct: 60.0,
            },
        ));
        Orchestrator::new(retriever, Arc::new(generator), models())
    }

    #[tokio::test]
    async fn empty_corpus_generates_with_no_context_warning() {
        let tmp = tempfile::tempdir().unwrap();

        let mut generator = MockGeneratorProvider::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_, _, _| Ok("I cannot answer this from the documents.".to_string()));

        let orchestrator = empty_orchestrator(tmp.path(), generator).await;
        let response = orchestrator
            .generate(GenerateRequest {
                prompt: "Write a report on X".to_string(),
                document_ids: None,
                escalate_coverage: false,
                intent_override: None,
            })
            .await
            .unwrap();

        assert!(response
            .retrieval_metadata
            .warnings
            .iter()
            .any(|w| w.starts_with("no_context")));
        assert_eq!(response.sections[0].confidence, Confidence::Unknown);
        assert!(response.sections[0].sources.is_empty());
    }

    #[tokio::test]
    async fn generation_failure_surfaces_as_error() {
        let tmp = tempfile::tempdir().unwrap();

        let mut generator = MockGeneratorProvider::new();
        generator
            .expect_generate()
            .returning(|_, _, _| Err(ApiError::GenerationFailed("backend down".to_string())));

        let orchestrator = empty_orchestrator(tmp.path(), generator).await;
        let err = orchestrator
            .generate(GenerateRequest {
                prompt: "What happened?".to_string(),
                document_ids: None,
                escalate_coverage: false,
                intent_override: None,
            })
            .await;
        assert!(matches!(err, Err(ApiError::GenerationFailed(_))));
    }
}
