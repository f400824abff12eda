//! Axum HTTP handlers. Every route lives under `/api/v1`, except the
//! frontend at `/` and the bare `/health` check.

pub mod caption;
pub mod content;
pub mod evaluation;
pub mod logging;
pub mod query;
pub mod rag;

use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub type ApiError = (StatusCode, String);

/// Build the application router.
pub fn router(state: AppState) -> Router {
    // Multipart bodies carry the whole file; leave headroom over the size check
    let body_limit = state.config.max_file_size.saturating_add(1024 * 1024);

    let api = Router::new()
        .route("/upload", post(content::upload))
        .route("/metadata/{file_id}", get(content::get_metadata))
        .route("/content", get(content::list_content))
        .route(
            "/content/{file_id}",
            axum::routing::patch(content::update_content).delete(content::delete_content),
        )
        .route("/query", post(query::query))
        .route("/search", get(query::search))
        .route("/rag/query", post(rag::rag_query))
        .route("/rag/batch", post(rag::rag_batch))
        .route("/rag/stats", get(rag::rag_stats))
        .route("/blip2/image/caption", post(caption::caption))
        .route("/blip2/image/question", post(caption::question))
        .route("/blip2/image/describe", post(caption::describe))
        .route("/evaluation/rag", post(evaluation::evaluate_rag))
        .route("/evaluation/rag-relevance", post(evaluation::rag_relevance))
        .route("/evaluation/hallucination", post(evaluation::hallucination))
        .route("/evaluation/summary", get(evaluation::summary))
        .route("/evaluation/logs", get(evaluation::logs))
        .route("/evaluation/alerts", get(evaluation::alerts))
        .route("/evaluation/reset", post(evaluation::reset))
        .route("/logging/metrics", get(logging::metrics))
        .route("/logging/metrics/history", get(logging::history))
        .route("/logging/metrics/reset", post(logging::reset))
        .route("/logging/health", get(logging::health));

    Router::new()
        .route("/", get(serve_index))
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Log a failed request, count it in the metrics and build the response.
pub fn fail(state: &AppState, status: StatusCode, message: impl Into<String>) -> ApiError {
    let message = message.into();
    if status.is_server_error() {
        tracing::error!("{status}: {message}");
    } else {
        tracing::warn!("{status}: {message}");
    }
    state
        .metrics
        .log_error(&format!("http_{}", status.as_u16()), &message, None);
    (status, message)
}

/// 400 unless `top_k` is within the accepted range.
pub fn check_top_k(state: &AppState, top_k: usize) -> Result<(), ApiError> {
    crate::models::validate_top_k(top_k).map_err(|msg| fail(state, StatusCode::BAD_REQUEST, msg))
}

/// Map an internal failure to a 500.
pub fn internal(state: &AppState, context: &str, err: anyhow::Error) -> ApiError {
    fail(
        state,
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("{context}: {err:#}"),
    )
}

pub(crate) fn pipeline_error(state: &AppState, err: crate::rag::PipelineError) -> ApiError {
    let status = match err {
        crate::rag::PipelineError::Generation(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    fail(state, status, err.to_string())
}
