use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;

use super::{check_top_k, fail, internal, pipeline_error, ApiError};
use crate::evaluation::hallucination::detect_hallucination;
use crate::models::{QueryRequest, QueryResponse, SearchHit, SearchParams};
use crate::state::AppState;

/// POST /api/v1/query - hybrid search plus a generated answer.
///
/// `confidence` is the share of answer sentences supported by the retrieved
/// chunks.
pub async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(fail(&state, StatusCode::BAD_REQUEST, "Query is required"));
    }
    check_top_k(&state, req.top_k)?;

    let answer = crate::rag::query(&state, &query, req.top_k)
        .await
        .map_err(|e| pipeline_error(&state, e))?;

    let sources: Vec<&str> = answer
        .retrieved_documents
        .iter()
        .map(|h| h.content.as_str())
        .collect();
    let confidence = detect_hallucination(&answer.response, &sources).confidence;

    crate::rag::log_answer(&state, &answer, req.user_id.as_deref());

    Ok(Json(QueryResponse {
        query,
        answer: answer.response,
        sources: req.include_sources.then_some(answer.retrieved_documents),
        confidence,
        timestamp: Utc::now(),
    }))
}

/// GET /api/v1/search?query=&top_k= - hybrid retrieval only.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let query = params.query.trim().to_string();
    if query.is_empty() {
        return Err(fail(&state, StatusCode::BAD_REQUEST, "Query is required"));
    }
    check_top_k(&state, params.top_k)?;

    let results = crate::rag::retrieve(&state, &query, params.top_k)
        .await
        .map_err(|e| internal(&state, "Search failed", e))?;
    state.metrics.log_rag_retrieval(&query, results.len());

    Ok(Json(results))
}
