//! Upload ingestion and knowledge-base setup handlers
use axum::extract::State;
use axum::Json;
use serde_json::Value;
use tracing::info;

use super::error_response;
use super::ApiResult;
use super::AppState;
use crate::api::types::ApiResponse;
use crate::api::types::KnowledgeBaseInitResponse;
use crate::ingest::initialize_knowledge_base;
use crate::ingest::IngestReport;
use crate::models::KnowledgeBaseConfig;
use crate::payload::store_if_oversized;
use crate::payload::Delivered;

fn str_field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body.get(name).and_then(Value::as_str)
}

/// Ingest an upload (POST /api/ingest)
///
/// A body with `bucket`/`key` runs the full pipeline on that object; any
/// other body is read as a step event naming an already processed document.
pub async fn ingest(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Delivered<IngestReport>> {
    let bucket = str_field(&body, "bucket");
    let key = str_field(&body, "key");

    let report = if bucket.is_some() || key.is_some() {
        let (bucket, key) = (bucket.unwrap_or_default(), key.unwrap_or_default());
        info!("POST /api/ingest: s3://{}/{}", bucket, key);
        state.ingestor.ingest_object(bucket, key).await
    } else {
        info!("POST /api/ingest: step event");
        state.ingestor.ingest_event(&body).await
    };
    let report = match report {
        Ok(report) => report,
        Err(e) => return Err(error_response(&e)),
    };

    match store_if_oversized(
        state.blobs.as_ref(),
        &state.payload_bucket,
        report,
        state.overflow_threshold_bytes,
    )
    .await
    {
        Ok(delivered) => Ok(Json(ApiResponse::success(delivered))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Store knowledge-base identifiers (POST /api/knowledge-base/init)
pub async fn init_knowledge_base(
    State(state): State<AppState>,
    Json(config): Json<KnowledgeBaseConfig>,
) -> ApiResult<KnowledgeBaseInitResponse> {
    info!("POST /api/knowledge-base/init: {}", config.knowledge_base_id);

    match initialize_knowledge_base(state.index_store.as_ref(), &config).await {
        Ok(created) => Ok(Json(ApiResponse::success(KnowledgeBaseInitResponse {
            knowledge_base_id: config.knowledge_base_id,
            data_source_id: config.data_source_id,
            created,
        }))),
        Err(e) => Err(error_response(&e)),
    }
}
