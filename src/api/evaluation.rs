use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_top_k, fail, internal, pipeline_error, ApiError};
use crate::evaluation::hallucination::{detect_hallucination, HallucinationMetrics};
use crate::evaluation::log::{Alert, EvaluationRecord, EvaluationSummary};
use crate::evaluation::relevance::{evaluate_relevance, RelevanceMetrics};
use crate::evaluation::PipelineEvaluation;
use crate::models::{default_top_k, QueryRequest, RetrievedDocument};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RelevanceRequest {
    pub query: String,
    #[serde(default)]
    pub retrieved_docs: Vec<RetrievedDocument>,
    /// Ids of the documents known to be relevant
    #[serde(default)]
    pub ground_truth: Option<Vec<String>>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize)]
pub struct HallucinationRequest {
    pub response: String,
    #[serde(default)]
    pub retrieved_docs: Vec<RetrievedDocument>,
}

/// POST /api/v1/evaluation/rag - run the pipeline and score it.
pub async fn evaluate_rag(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<PipelineEvaluation>, ApiError> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(fail(&state, StatusCode::BAD_REQUEST, "Query is required"));
    }
    check_top_k(&state, req.top_k)?;

    let evaluation = crate::evaluation::evaluate_pipeline(
        &state,
        &query,
        req.top_k,
        req.query_id,
        req.user_id.as_deref(),
    )
    .await
    .map_err(|e| pipeline_error(&state, e))?;
    Ok(Json(evaluation))
}

/// POST /api/v1/evaluation/rag-relevance
pub async fn rag_relevance(
    State(state): State<AppState>,
    Json(req): Json<RelevanceRequest>,
) -> Result<Json<RelevanceMetrics>, ApiError> {
    check_top_k(&state, req.top_k)?;
    Ok(Json(evaluate_relevance(
        &req.query,
        &req.retrieved_docs,
        req.ground_truth.as_deref(),
        req.top_k,
    )))
}

/// POST /api/v1/evaluation/hallucination
pub async fn hallucination(Json(req): Json<HallucinationRequest>) -> Json<HallucinationMetrics> {
    let sources: Vec<&str> = req
        .retrieved_docs
        .iter()
        .map(|d| d.content.as_str())
        .collect();
    Json(detect_hallucination(&req.response, &sources))
}

/// GET /api/v1/evaluation/summary
pub async fn summary(State(state): State<AppState>) -> Json<EvaluationSummary> {
    Json(state.evaluations.summary())
}

/// GET /api/v1/evaluation/logs
pub async fn logs(State(state): State<AppState>) -> Json<Value> {
    let logs: Vec<EvaluationRecord> = state.evaluations.records();
    Json(json!({ "total": logs.len(), "logs": logs }))
}

/// GET /api/v1/evaluation/alerts
pub async fn alerts(State(state): State<AppState>) -> Json<Vec<Alert>> {
    Json(state.evaluations.alerts())
}

/// POST /api/v1/evaluation/reset
pub async fn reset(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .evaluations
        .reset()
        .map_err(|e| internal(&state, "Failed to reset evaluation log", e))?;
    Ok(Json(json!({ "status": "reset" })))
}
