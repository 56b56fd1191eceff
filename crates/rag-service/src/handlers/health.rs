use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;
use crate::storage::VectorStoreStats;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    vector_store: VectorStoreStats,
    documents: HashMap<&'static str, usize>,
    ingest_backlog: usize,
}

/// GET /api/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        vector_store: state.vector_store.stats().await,
        documents: state.document_store.status_counts().await,
        ingest_backlog: state.ingest_pool.backlog().await,
    })
}
