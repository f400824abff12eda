use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;
use crate::telemetry::metrics::{HistoryEntry, MetricsSummary};

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// GET /api/v1/logging/metrics
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.metrics.summary())
}

/// GET /api/v1/logging/metrics/history?limit= - oldest first.
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<HistoryEntry>> {
    Json(state.metrics.history(params.limit))
}

/// POST /api/v1/logging/metrics/reset
pub async fn reset(State(state): State<AppState>) -> Json<Value> {
    state.metrics.reset();
    Json(json!({ "status": "reset" }))
}

/// GET /api/v1/logging/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "logging",
        "timestamp": Utc::now(),
    }))
}
