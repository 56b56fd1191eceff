use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::chat::{Conversation, ConversationSummary};
use crate::services::conversation::{ChatTurnRequest, ChatTurnResponse};
use crate::state::AppState;
use crate::utils::error::ApiError;

const TITLE_LIMIT: usize = 120;

#[derive(Debug, Serialize)]
pub struct DeleteConversationResponse {
    pub status: &'static str,
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PatchConversationRequest {
    pub title: String,
}

/// POST /api/chat — one turn; creates the conversation on first use.
pub async fn chat_turn(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatTurnRequest>,
) -> Result<Json<ChatTurnResponse>, ApiError> {
    info!(
        conversation = ?request.conversation_id,
        "Chat turn request"
    );
    let response = state.chat_controller.chat(request).await?;
    Ok(Json(response))
}

/// GET /api/chat
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(state.conversation_store.list().await))
}

/// GET /api/chat/{id}
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Conversation>, ApiError> {
    state
        .conversation_store
        .load(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("conversation {}", id)))
}

/// DELETE /api/chat/{id} — idempotent.
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteConversationResponse>, ApiError> {
    state.chat_controller.delete(id).await?;
    Ok(Json(DeleteConversationResponse {
        status: "deleted",
        id,
    }))
}

/// PATCH /api/chat/{id}
pub async fn patch_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<PatchConversationRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let title = request.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::InputInvalid("title must not be empty".to_string()));
    }
    if title.chars().count() > TITLE_LIMIT {
        return Err(ApiError::InputInvalid(format!(
            "title must be at most {} characters",
            TITLE_LIMIT
        )));
    }

    let conversation = state.conversation_store.rename(id, title).await?;
    Ok(Json(conversation))
}
