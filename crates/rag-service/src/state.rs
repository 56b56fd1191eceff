use std::sync::Arc;

use crate::config::Settings;
use crate::ingest::IngestWorkerPool;
use crate::services::{ChatController, Orchestrator};
use crate::storage::{ConversationStore, DocumentStore, VectorStore};

/// Application state shared across handlers.
pub struct AppState {
    pub settings: Settings,
    pub document_store: Arc<DocumentStore>,
    pub vector_store: Arc<VectorStore>,
    pub conversation_store: Arc<ConversationStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub chat_controller: Arc<ChatController>,
    pub ingest_pool: Arc<IngestWorkerPool>,
}
