use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ingest::IngestTask;
use crate::models::document::{Chunk, Document, DocumentSummary, DocumentType};
use crate::state::AppState;
use crate::utils::error::ApiError;

#[derive(Debug, Serialize)]
pub struct ListDocumentsResponse {
    pub documents: Vec<DocumentSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ChunksResponse {
    pub chunks: Vec<Chunk>,
}

/// POST /api/documents — multipart upload. Returns immediately with the
/// document pending; ingestion happens on the worker pool.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Document>, ApiError> {
    let mut title: Option<String> = None;
    let mut filename: Option<String> = None;
    let mut file_data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InputInvalid(format!("failed to read field: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::InputInvalid(format!("invalid title: {}", e)))?,
                );
            }
            "author" => {
                // Accepted for interface compatibility; not part of the
                // document record.
                let _ = field.text().await;
            }
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                file_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::InputInvalid(format!("failed to read file: {}", e)))?
                        .to_vec(),
                );
            }
            other => {
                warn!("Ignoring unknown upload field: {}", other);
            }
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::InputInvalid("file required".to_string()))?;
    let filename = filename.ok_or_else(|| ApiError::InputInvalid("filename required".to_string()))?;

    if file_data.is_empty() {
        return Err(ApiError::InputInvalid("uploaded file is empty".to_string()));
    }
    if file_data.len() > state.settings.server.max_upload_bytes {
        return Err(ApiError::InputInvalid(format!(
            "file exceeds maximum upload size of {} bytes",
            state.settings.server.max_upload_bytes
        )));
    }

    let doc_type = DocumentType::from_filename(&filename).ok_or_else(|| {
        ApiError::InputInvalid(format!(
            "unsupported file type for '{}'; expected pdf, docx or txt",
            filename
        ))
    })?;

    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename.as_str())
        .to_string();
    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or(stem);

    info!("Upload accepted: {} ({} bytes)", filename, file_data.len());

    let document = state
        .document_store
        .create(Document::new(title, filename, doc_type))
        .await?;

    state
        .ingest_pool
        .submit(IngestTask {
            document_id: document.id,
            doc_type,
            data: file_data,
        })
        .await;

    Ok(Json(document))
}

/// GET /api/documents
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListDocumentsResponse>, ApiError> {
    let documents = state.document_store.list().await;
    let total = documents.len();
    Ok(Json(ListDocumentsResponse { documents, total }))
}

/// GET /api/documents/{id}
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, ApiError> {
    state
        .document_store
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("document {}", id)))
}

/// DELETE /api/documents/{id} — cascades to chunks and vectors.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if state.document_store.get(id).await.is_none() {
        return Err(ApiError::NotFound(format!("document {}", id)));
    }

    let removed_chunks = state.vector_store.remove_document(id).await?;
    state.document_store.delete(id).await?;
    info!("Deleted document {} and {} chunk(s)", id, removed_chunks);

    Ok(Json(DeleteResponse {
        status: "deleted",
        id,
    }))
}

/// GET /api/documents/{id}/chunks
pub async fn list_chunks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChunksResponse>, ApiError> {
    if state.document_store.get(id).await.is_none() {
        return Err(ApiError::NotFound(format!("document {}", id)));
    }
    let chunks = state.vector_store.chunks_for_document(id).await;
    Ok(Json(ChunksResponse { chunks }))
}
