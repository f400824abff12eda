//! Retrieval and answer quality scoring.
//!
//! - [`relevance`]: precision, recall, F1, MRR and NDCG of a ranked list
//! - [`hallucination`]: support and contradiction of response sentences
//! - [`log`]: the append-only record of evaluations, summaries and alerts

pub mod hallucination;
pub mod log;
pub mod relevance;

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;

use crate::models::RetrievedDocument;
use crate::rag::PipelineError;
use crate::state::AppState;
use hallucination::detect_hallucination;
use log::{Alert, EvaluationRecord};
use relevance::evaluate_relevance;

/// Distinct lowercase word tokens. Punctuation at word edges is stripped;
/// inner apostrophes are kept so contractions like "isn't" survive.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.replace('\u{2019}', "'")
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineEvaluation {
    pub record: EvaluationRecord,
    pub retrieved_docs: Vec<RetrievedDocument>,
    pub alerts: Vec<Alert>,
}

/// Run the RAG pipeline for `query`, score retrieval and answer, and log
/// the result. `query_id` links the record to the caller's query; `user_id`
/// lands in the record metadata.
pub async fn evaluate_pipeline(
    state: &AppState,
    query: &str,
    top_k: usize,
    query_id: Option<String>,
    user_id: Option<&str>,
) -> Result<PipelineEvaluation, PipelineError> {
    let answer = crate::rag::query(state, query, top_k).await?;

    let docs: Vec<RetrievedDocument> = answer
        .retrieved_documents
        .iter()
        .map(RetrievedDocument::from)
        .collect();
    let sources: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();

    let rag_metrics = evaluate_relevance(query, &docs, None, top_k);
    let hallucination_metrics = detect_hallucination(&answer.response, &sources);

    let mut metadata = serde_json::Map::new();
    metadata.insert(
        "processing_time".to_string(),
        serde_json::json!(answer.processing_time),
    );
    if let Some(user_id) = user_id {
        metadata.insert("user_id".to_string(), serde_json::json!(user_id));
    }

    let record = EvaluationRecord {
        id: uuid::Uuid::new_v4().to_string(),
        query_id,
        query: query.to_string(),
        response: answer.response,
        retrieved_doc_count: docs.len(),
        rag_metrics,
        hallucination_metrics,
        metadata,
        timestamp: Utc::now(),
    };

    let alerts = state
        .evaluations
        .append(record.clone())
        .map_err(PipelineError::Storage)?;
    state.metrics.log_evaluation(&record.id, query);

    Ok(PipelineEvaluation {
        record,
        retrieved_docs: docs,
        alerts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("Hello, WORLD! isn\u{2019}t (it) -- fine?");
        let expected: HashSet<String> = ["hello", "world", "isn't", "it", "fine"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_tokenize_dedupes() {
        assert_eq!(tokenize("a a A").len(), 1);
        assert!(tokenize(" ... ").is_empty());
    }
}
