use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;
use uuid::Uuid;

use crate::config::Settings;
use crate::handlers;
use crate::ingest::{IngestPipeline, IngestWorkerPool};
use crate::services::embedding::EmbeddingProvider;
use crate::services::generator::GeneratorProvider;
use crate::services::{ChatController, Orchestrator, Retriever};
use crate::state::AppState;
use crate::storage::{ConversationStore, DocumentStore, VectorStore};
use crate::utils::error::ApiError;

/// Open the stores, run startup reconciliation and wire the services.
/// Capability providers come in from the caller so tests can substitute
/// stubs.
pub async fn build_state(
    settings: Settings,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GeneratorProvider>,
) -> Result<Arc<AppState>, ApiError> {
    let data_dir = settings.storage.data_dir.clone();

    let document_store = Arc::new(DocumentStore::open(&data_dir).await?);
    let vector_store = Arc::new(VectorStore::open(&data_dir).await?);
    let conversation_store = Arc::new(ConversationStore::open(&data_dir).await?);

    let stale = document_store.reconcile_startup().await?;
    if !stale.is_empty() {
        info!("Marked {} document(s) stale_on_restart", stale.len());
    }
    let valid: HashSet<Uuid> = document_store.all_ids().await.into_iter().collect();
    vector_store.prune_orphans(&valid).await?;

    let retriever = Arc::new(Retriever::new(
        document_store.clone(),
        vector_store.clone(),
        embedder.clone(),
        settings.retrieval.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        retriever.clone(),
        generator.clone(),
        settings.models.clone(),
    ));

    let chat_controller = Arc::new(ChatController::new(
        conversation_store.clone(),
        retriever.clone(),
        generator,
        settings.models.clone(),
        settings.chat.clone(),
    ));

    let pipeline = Arc::new(IngestPipeline::new(
        document_store.clone(),
        vector_store.clone(),
        embedder,
        &settings.ingest,
    ));
    let ingest_pool = Arc::new(IngestWorkerPool::spawn(
        pipeline,
        settings.ingest.worker_count,
    ));

    Ok(Arc::new(AppState {
        settings,
        document_store,
        vector_store,
        conversation_store,
        orchestrator,
        chat_controller,
        ingest_pool,
    }))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body = state.settings.server.max_upload_bytes + 1024 * 1024;

    Router::new()
        .route(
            "/api/documents",
            post(handlers::documents::upload_document).get(handlers::documents::list_documents),
        )
        .route(
            "/api/documents/{id}",
            get(handlers::documents::get_document).delete(handlers::documents::delete_document),
        )
        .route(
            "/api/documents/{id}/chunks",
            get(handlers::documents::list_chunks),
        )
        .route("/api/generate", post(handlers::generate::generate))
        .route(
            "/api/generate/section",
            post(handlers::generate::regenerate_section),
        )
        .route(
            "/api/chat",
            post(handlers::chat::chat_turn).get(handlers::chat::list_conversations),
        )
        .route(
            "/api/chat/{id}",
            get(handlers::chat::get_conversation)
                .delete(handlers::chat::delete_conversation)
                .patch(handlers::chat::patch_conversation),
        )
        .route("/api/health", get(handlers::health::health_check))
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}
