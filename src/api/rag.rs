use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::{check_top_k, fail, pipeline_error, ApiError};
use crate::models::{BatchQueryRequest, QueryRequest};
use crate::rag::{RagResponse, RagStats};
use crate::state::AppState;

const MAX_BATCH_QUERIES: usize = 50;

/// One entry of a batch: the pipeline response, or why it failed.
#[derive(Serialize)]
pub struct BatchItem {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RagResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/v1/rag/query
pub async fn rag_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<RagResponse>, ApiError> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(fail(&state, StatusCode::BAD_REQUEST, "Query is required"));
    }
    check_top_k(&state, req.top_k)?;

    let response = crate::rag::query(&state, &query, req.top_k)
        .await
        .map_err(|e| pipeline_error(&state, e))?;
    crate::rag::log_answer(&state, &response, req.user_id.as_deref());
    Ok(Json(response))
}

/// POST /api/v1/rag/batch - queries run one after another; a failing query
/// does not abort the rest.
pub async fn rag_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchQueryRequest>,
) -> Result<Json<Vec<BatchItem>>, ApiError> {
    if req.queries.is_empty() {
        return Err(fail(&state, StatusCode::BAD_REQUEST, "Queries must be a non-empty list"));
    }
    if req.queries.len() > MAX_BATCH_QUERIES {
        return Err(fail(
            &state,
            StatusCode::BAD_REQUEST,
            format!("At most {MAX_BATCH_QUERIES} queries per batch"),
        ));
    }
    check_top_k(&state, req.top_k)?;

    let mut items = Vec::with_capacity(req.queries.len());
    for raw in &req.queries {
        let query = raw.trim().to_string();
        if query.is_empty() {
            items.push(BatchItem {
                query,
                result: None,
                error: Some("Query is required".to_string()),
            });
            continue;
        }

        match crate::rag::query(&state, &query, req.top_k).await {
            Ok(response) => {
                crate::rag::log_answer(&state, &response, req.user_id.as_deref());
                items.push(BatchItem {
                    query,
                    result: Some(response),
                    error: None,
                });
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("Batch query '{query}' failed: {message}");
                state.metrics.log_error("rag_batch_item", &message, None);
                items.push(BatchItem {
                    query,
                    result: None,
                    error: Some(message),
                });
            }
        }
    }

    Ok(Json(items))
}

/// GET /api/v1/rag/stats
pub async fn rag_stats(State(state): State<AppState>) -> Json<RagStats> {
    Json(crate::rag::stats(&state))
}
