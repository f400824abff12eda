//! Retrieval-augmented generation: hybrid retrieval, context assembly and
//! a single completion call.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{SearchHit, MAX_TOP_K};
use crate::search::hybrid::rrf_fusion;
use crate::state::AppState;
use crate::telemetry::metrics::DocumentRef;

pub const SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant that answers questions based on provided context.";

/// Full pipeline output for one query.
#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub query: String,
    pub response: String,
    pub retrieved_documents: Vec<SearchHit>,
    pub context_used: String,
    /// Seconds spent in retrieval plus generation
    pub processing_time: f64,
    pub timestamp: DateTime<Utc>,
}

/// A failed pipeline stage. Generation failures come from the upstream
/// completion service.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),
    #[error("Generation failed: {0:#}")]
    Generation(anyhow::Error),
    #[error("Storage failed: {0:#}")]
    Storage(anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct RagStats {
    pub total_vectors: usize,
    pub dimension: Option<usize>,
    pub keyword_documents: u64,
    pub files: HashMap<Uuid, usize>,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub chat_model: String,
}

/// Hybrid retrieval: BM25 and vector search fused with RRF.
///
/// A failing embedding call degrades to keyword-only results. `top_k` is
/// clamped to `1..=MAX_TOP_K`.
pub async fn retrieve(state: &AppState, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
    let top_k = top_k.clamp(1, MAX_TOP_K);
    let fetch_limit = top_k.saturating_mul(3);

    let keyword = state.keyword.clone();
    let q = query.to_string();
    let keyword_hits =
        tokio::task::spawn_blocking(move || keyword.search(&q, fetch_limit)).await??;

    let vector_hits =
        match crate::llm::embeddings::embed_single(&state.http_client, &state.config.llm, query)
            .await
        {
            Ok(query_embedding) => state.vectors.search(&query_embedding, fetch_limit),
            Err(e) => {
                tracing::warn!("Vector search skipped: {e:#}");
                Vec::new()
            }
        };

    let results = rrf_fusion(&keyword_hits, &vector_hits, top_k);
    tracing::info!(
        "Retrieved {} results ({} keyword, {} vector) for query: {}",
        results.len(),
        keyword_hits.len(),
        vector_hits.len(),
        preview(query, 50)
    );
    Ok(results)
}

/// Build the prompt context: the query, then numbered documents until the
/// character window would overflow.
pub fn augment_context(query: &str, results: &[SearchHit], window: usize) -> String {
    if results.is_empty() {
        return format!("Query: {query}\n\nNo relevant documents found.");
    }

    let mut parts = vec![format!("Query: {query}"), "Relevant Documents:".to_string()];
    let mut total_chars = 0usize;

    for (i, result) in results.iter().enumerate() {
        let doc_text = format!("\nDocument {}: {}", i + 1, result.content);
        let len = doc_text.chars().count();
        if total_chars + len > window {
            tracing::debug!("Context window limit reached, stopping at {} documents", i);
            break;
        }
        total_chars += len;
        parts.push(doc_text);
    }

    parts.join("\n")
}

pub async fn generate(state: &AppState, query: &str, context: &str) -> Result<String> {
    let prompt = format!(
        "Context:\n{context}\n\nQuestion: {query}\n\n\
         Please provide a comprehensive answer based on the provided context. \
         If the context doesn't contain relevant information, please indicate so."
    );
    crate::llm::completion::complete(&state.http_client, &state.config.llm, SYSTEM_PROMPT, &prompt)
        .await
}

/// Retrieve, augment, generate.
pub async fn query(
    state: &AppState,
    query: &str,
    top_k: usize,
) -> std::result::Result<RagResponse, PipelineError> {
    let start = std::time::Instant::now();

    let results = retrieve(state, query, top_k)
        .await
        .map_err(PipelineError::Retrieval)?;
    state.metrics.log_rag_retrieval(query, results.len());

    let context = augment_context(query, &results, state.config.context_window);
    let response = generate(state, query, &context)
        .await
        .map_err(PipelineError::Generation)?;

    Ok(RagResponse {
        query: query.to_string(),
        response,
        retrieved_documents: results,
        context_used: context,
        processing_time: start.elapsed().as_secs_f64(),
        timestamp: Utc::now(),
    })
}

/// Record an answered query in the request history.
pub fn log_answer(state: &AppState, response: &RagResponse, user_id: Option<&str>) {
    let documents = response
        .retrieved_documents
        .iter()
        .map(|hit| DocumentRef {
            id: hit.chunk_id(),
            score: hit.score,
        })
        .collect();
    state.metrics.log_query(
        &response.query,
        &response.response,
        response.processing_time,
        documents,
        user_id,
    );
}

pub fn stats(state: &AppState) -> RagStats {
    RagStats {
        total_vectors: state.vectors.entry_count(),
        dimension: state.vectors.dimension(),
        keyword_documents: state.keyword.num_docs(),
        files: state.vectors.file_counts(),
        embedding_provider: state.config.llm.provider.clone(),
        embedding_model: state.config.llm.embedding_model.clone(),
        chat_model: state.config.llm.chat_model.clone(),
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;

    fn hit(content: &str) -> SearchHit {
        SearchHit {
            file_id: Uuid::new_v4(),
            filename: "f.txt".to_string(),
            content_type: ContentType::Document,
            chunk_index: 0,
            content: content.to_string(),
            keyword_score: 0.0,
            vector_score: 0.0,
            score: 0.0,
        }
    }

    #[test]
    fn test_augment_context_empty() {
        assert_eq!(
            augment_context("what?", &[], 2000),
            "Query: what?\n\nNo relevant documents found."
        );
    }

    #[test]
    fn test_augment_context_format() {
        let ctx = augment_context("q", &[hit("alpha"), hit("beta")], 2000);
        assert_eq!(
            ctx,
            "Query: q\nRelevant Documents:\n\nDocument 1: alpha\n\nDocument 2: beta"
        );
    }

    #[test]
    fn test_augment_context_window() {
        // "\nDocument 1: " is 13 chars
        let ctx = augment_context("q", &[hit(&"a".repeat(20)), hit(&"b".repeat(20))], 40);
        assert!(ctx.contains("Document 1"));
        assert!(!ctx.contains("Document 2"));
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
    }

    #[test]
    fn test_pipeline_error_display() {
        let e = PipelineError::Generation(anyhow::anyhow!("503 upstream"));
        assert_eq!(e.to_string(), "Generation failed: 503 upstream");

        let e = PipelineError::Retrieval(
            anyhow::anyhow!("index locked").context("Keyword search failed"),
        );
        assert_eq!(
            e.to_string(),
            "Retrieval failed: Keyword search failed: index locked"
        );
    }
}
