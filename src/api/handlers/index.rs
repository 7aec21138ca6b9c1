//! Document indexing handler
use axum::extract::State;
use axum::Json;
use tracing::info;

use super::error_response;
use super::ApiResult;
use super::AppState;
use crate::api::types::ApiResponse;
use crate::ingest::IndexSummary;
use crate::models::ProcessedDocument;
use crate::payload::store_if_oversized;
use crate::payload::Delivered;

/// Index a processed document (POST /api/index/document)
///
/// Large summaries come back as a payload reference.
pub async fn index_document(
    State(state): State<AppState>,
    Json(document): Json<ProcessedDocument>,
) -> ApiResult<Delivered<IndexSummary>> {
    info!("POST /api/index/document: {}", document.document_id);

    let summary = match state.indexer.index(&document).await {
        Ok(summary) => summary,
        Err(e) => return Err(error_response(&e)),
    };

    match store_if_oversized(
        state.blobs.as_ref(),
        &state.payload_bucket,
        summary,
        state.overflow_threshold_bytes,
    )
    .await
    {
        Ok(delivered) => Ok(Json(ApiResponse::success(delivered))),
        Err(e) => Err(error_response(&e)),
    }
}
