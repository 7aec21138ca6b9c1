//! Question-answering handler
use axum::extract::State;
use axum::Json;
use tracing::info;

use super::error_response;
use super::ApiResult;
use super::AppState;
use crate::api::types::ApiResponse;
use crate::models::QueryRequest;
use crate::models::QueryResponse;

/// Answer a query (POST /api/query)
///
/// A missing or unparsable body is treated as a missing query.
pub async fn query(
    State(state): State<AppState>,
    request: Option<Json<QueryRequest>>,
) -> ApiResult<QueryResponse> {
    let query = request.map(|Json(req)| req.query).unwrap_or_default();
    info!("POST /api/query: {}", query);

    match state.answer_service.answer(&query).await {
        Ok(response) => Ok(Json(ApiResponse::success(response))),
        Err(e) => Err(error_response(&e)),
    }
}
