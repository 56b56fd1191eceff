use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ChatConfig, ModelsConfig};
use crate::models::chat::{ChatMessage, Conversation};
use crate::models::generation::Timings;
use crate::models::retrieval::CoverageDescriptor;
use crate::services::generator::GeneratorProvider;
use crate::services::intent::IntentClassifier;
use crate::services::prompt::PromptAssembler;
use crate::services::retriever::{RetrievalRequest, Retriever};
use crate::services::validator::Validator;
use crate::storage::ConversationStore;
use crate::utils::error::ApiError;

use super::context_builder;

const TITLE_MAX_CHARS: usize = 80;

#[derive(Debug, Deserialize)]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    pub message: String,
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
    #[serde(default = "default_true")]
    pub include_history: bool,
    #[serde(default)]
    pub history_turns: Option<usize>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ContextUsed {
    pub history_messages_count: usize,
    pub history_truncated: bool,
    pub sources_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ChatTurnResponse {
    pub conversation_id: Uuid,
    pub message: ChatMessage,
    pub cumulative_coverage: CoverageDescriptor,
    pub context_used: ContextUsed,
    pub timings: Timings,
}

/// Multi-turn chat state: bounded history window, cumulative coverage and
/// atomic per-turn persistence. Turns within one conversation are
/// serialized by a per-conversation lock; independent conversations run in
/// parallel.
pub struct ChatController {
    store: Arc<ConversationStore>,
    retriever: Arc<Retriever>,
    generator: Arc<dyn GeneratorProvider>,
    models: ModelsConfig,
    config: ChatConfig,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ChatController {
    pub fn new(
        store: Arc<ConversationStore>,
        retriever: Arc<Retriever>,
        generator: Arc<dyn GeneratorProvider>,
        models: ModelsConfig,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            retriever,
            generator,
            models,
            config,
            locks: DashMap::new(),
        }
    }

    pub async fn chat(&self, req: ChatTurnRequest) -> Result<ChatTurnResponse, ApiError> {
        if req.message.trim().is_empty() {
            return Err(ApiError::InputInvalid("message must not be empty".to_string()));
        }

        let total_start = Instant::now();

        // At most one generation in flight per conversation; the lock covers
        // the whole load-generate-save window.
        let conversation_id = req.conversation_id.unwrap_or_else(Uuid::new_v4);
        let lock = self
            .locks
            .entry(conversation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let mut conversation = match req.conversation_id {
            Some(id) => self
                .store
                .load(id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("conversation {}", id)))?,
            None => {
                let mut conversation = Conversation::new(req.document_ids.clone());
                conversation.id = conversation_id;
                conversation
            }
        };

        if req.document_ids.is_some() {
            conversation.document_ids = req.document_ids.clone();
        }
        let doc_ids = conversation.document_ids.clone();

        let classification = IntentClassifier::classify(&req.message);
        let query = context_builder::augment_query(&req.message, &conversation.messages);
        debug!("Chat retrieval query: {}", query);

        let retrieval_start = Instant::now();
        let outcome = self
            .retriever
            .retrieve(RetrievalRequest {
                query,
                document_ids: doc_ids.clone(),
                strategy: classification.suggested_retrieval,
                target_pct: None,
                escalate: false,
            })
            .await?;
        let retrieval_ms =
            (retrieval_start.elapsed().as_millis() as u64).saturating_sub(outcome.embedding_ms);

        let history_turns = req.history_turns.unwrap_or(self.config.history_turns);
        let window = if req.include_history {
            context_builder::build_window(
                &conversation.messages,
                history_turns,
                self.config.max_history_chars,
            )
        } else {
            context_builder::HistoryWindow::empty()
        };

        let assembled = PromptAssembler::assemble(
            &classification,
            &req.message,
            &outcome.sources,
            &outcome.coverage,
            req.include_history.then_some(window.text.as_str()),
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

        let content = sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        // The turn's retrieval set, not just the cited subset; cumulative
        // coverage is a union over what retrieval surfaced.
        let assistant = ChatMessage::assistant(content, outcome.sources.clone(), sections);

        // User and assistant messages land in one persist; a failed turn
        // leaves the conversation untouched.
        conversation.messages.push(ChatMessage::user(req.message.clone()));
        conversation.messages.push(assistant.clone());
        if conversation.title.is_empty() {
            conversation.title = derive_title(&req.message);
        }
        conversation.updated_at = Utc::now();

        let seen = conversation.seen_chunk_ids();
        let cumulative_coverage = self
            .retriever
            .coverage_for_chunk_ids(&seen, doc_ids.as_deref(), outcome.coverage.retrieval_type)
            .await;
        conversation.cumulative_coverage = Some(cumulative_coverage.clone());

        self.store.save(&conversation).await?;
        info!(
            conversation = %conversation.id,
            messages = conversation.messages.len(),
            "Chat turn persisted"
        );

        Ok(ChatTurnResponse {
            conversation_id: conversation.id,
            message: assistant,
            cumulative_coverage,
            context_used: ContextUsed {
                history_messages_count: window.messages_count,
                history_truncated: window.truncated,
                sources_count: outcome.sources.len(),
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

    pub async fn delete(&self, id: Uuid) -> Result<bool, ApiError> {
        self.locks.remove(&id);
        self.store.delete(id).await
    }
}

fn derive_title(first_message: &str) -> String {
    first_message
        .trim()
        .chars()
        .take(TITLE_MAX_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}
