//! API route definitions

use axum::routing::get;
use axum::routing::post;
use axum::Router;

use super::handlers::AppState;
use super::handlers::{
    self,
};

/// Create RESTful API router
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Question answering
        .route("/query", post(handlers::query))
        // Ingestion
        .route("/index/document", post(handlers::index_document))
        .route("/ingest", post(handlers::ingest))
        .route("/knowledge-base/init", post(handlers::init_knowledge_base))
        .with_state(state)
}
