use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InputInvalid(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("Transient failure: {0}")]
    Transient(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::InputInvalid(msg) => {
                tracing::warn!("Invalid input: {}", msg);
                (StatusCode::BAD_REQUEST, "InputInvalid", msg)
            }
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::EmbeddingFailed(msg) => {
                tracing::error!("Embedding failed: {}", msg);
                (StatusCode::BAD_GATEWAY, "EmbeddingFailed", msg)
            }
            ApiError::RetrievalFailed(msg) => {
                tracing::error!("Retrieval failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "RetrievalFailed", msg)
            }
            ApiError::GenerationFailed(msg) => {
                tracing::error!("Generation failed: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "GenerationFailed", msg)
            }
            ApiError::PersistenceFailed(msg) => {
                tracing::error!("Persistence failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "PersistenceFailed", msg)
            }
            ApiError::Transient(msg) => {
                tracing::warn!("Transient failure surfaced: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Transient", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::PersistenceFailed(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::PersistenceFailed(e.to_string())
    }
}
