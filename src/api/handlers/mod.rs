//! API request handlers
use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use tracing::error;
use tracing::warn;

use crate::api::types::ApiResponse;
use crate::api::types::HealthResponse;
use crate::capabilities::Capabilities;
use crate::capabilities::Collaborators;
use crate::capabilities::SearchBackend;
use crate::config::AppConfig;
use crate::errors::DocRagError;
use crate::ingest::DocumentIndexer;
use crate::ingest::DocumentIngestor;
use crate::ingest::IngestOptions;
use crate::rag::AnswerOptions;
use crate::rag::AnswerService;
use crate::rag::AssemblerOptions;
use crate::storage::BlobStore;
use crate::storage::IndexStore;

pub mod index;
pub mod ingest;
pub mod query;

pub use index::index_document;
pub use ingest::ingest;
pub use ingest::init_knowledge_base;
pub use query::query;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub answer_service: Arc<AnswerService>,
    pub indexer: Arc<DocumentIndexer>,
    pub ingestor: Arc<DocumentIngestor>,
    pub index_store: Arc<dyn IndexStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub capabilities: Arc<Capabilities>,
    pub payload_bucket: String,
    pub overflow_threshold_bytes: usize,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        capabilities: Capabilities,
        collaborators: Collaborators,
    ) -> Self {
        let indexer = DocumentIndexer::new(collaborators.index_store.clone());
        let ingestor = DocumentIngestor::new(
            &collaborators,
            capabilities.knowledge_base.clone(),
            IngestOptions::from_config(config),
        );
        let index_store = collaborators.index_store.clone();
        let blobs = collaborators.blobs.clone();
        let answer_service = AnswerService::new(
            collaborators,
            &capabilities,
            AssemblerOptions::from_config(config),
            AnswerOptions::from_config(config),
        );

        Self {
            answer_service: Arc::new(answer_service),
            indexer: Arc::new(indexer),
            ingestor: Arc::new(ingestor),
            index_store,
            blobs,
            capabilities: Arc::new(capabilities),
            payload_bucket: config.storage.payload_bucket.clone(),
            overflow_threshold_bytes: config.payload.overflow_threshold_bytes,
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<T>>)>;

/// 400 for caller mistakes, 500 for everything else
pub fn error_response<T>(err: &DocRagError) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = if err.is_client_error() {
        warn!("Rejected request: {}", err);
        StatusCode::BAD_REQUEST
    } else {
        error!("Request failed: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ApiResponse::error(err.to_string())))
}

/// Health check handler
pub async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<ApiResponse<HealthResponse>> {
    let capabilities = &state.capabilities;
    let search = match &capabilities.search {
        SearchBackend::Keyword => "keyword",
        SearchBackend::Vector { .. } => "vector",
    };

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generator: format!("{:?}", capabilities.generator).to_lowercase(),
        search: search.to_string(),
        storage: format!("{:?}", capabilities.storage).to_lowercase(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let (status, Json(body)) =
            error_response::<()>(&DocRagError::InvalidInput("Missing query parameter".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert_eq!(
            body.error.as_deref(),
            Some("Invalid input: Missing query parameter")
        );

        let (status, _) = error_response::<()>(&DocRagError::MissingConfiguration(
            "Knowledge base ID not found in configuration".to_string(),
        ));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
