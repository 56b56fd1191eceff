use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::info;

use crate::services::orchestrator::{
    GenerateRequest, GenerateResponse, RegenerateRequest, RegenerateResponse,
};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// POST /api/generate
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    info!(
        escalate = request.escalate_coverage,
        docs = request.document_ids.as_ref().map(Vec::len).unwrap_or(0),
        "Generate request"
    );
    let response = state.orchestrator.generate(request).await?;
    Ok(Json(response))
}

/// POST /api/generate/section
pub async fn regenerate_section(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegenerateRequest>,
) -> Result<Json<RegenerateResponse>, ApiError> {
    info!(section = %request.section_id, "Section regenerate request");
    let response = state.orchestrator.regenerate(request).await?;
    Ok(Json(response))
}
