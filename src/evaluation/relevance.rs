use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::tokenize;
use crate::models::RetrievedDocument;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RelevanceMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub mrr: f64,
    pub ndcg: f64,
    pub relevant_retrieved: usize,
    pub total_retrieved: usize,
    pub total_relevant: usize,
}

/// Score a ranked retrieval.
///
/// Only the first `top_k` documents count as retrieved. A document is
/// relevant when its id is in `ground_truth` (if given), else when its
/// `relevant` label says so, else when it shares a token with the query.
/// Documents are identified by id, or by content when they have none; a
/// repeated document earns no further credit.
pub fn evaluate_relevance(
    query: &str,
    documents: &[RetrievedDocument],
    ground_truth: Option<&[String]>,
    top_k: usize,
) -> RelevanceMetrics {
    let query_tokens = tokenize(query);
    let truth: Option<HashSet<&str>> =
        ground_truth.map(|ids| ids.iter().map(String::as_str).collect());

    let is_relevant = |doc: &RetrievedDocument| -> bool {
        if let Some(truth) = &truth {
            return doc.id.as_deref().is_some_and(|id| truth.contains(id));
        }
        if let Some(label) = doc.relevant {
            return label;
        }
        let doc_tokens = tokenize(&doc.content);
        !query_tokens.is_disjoint(&doc_tokens)
    };

    let total_relevant = match &truth {
        Some(truth) => truth.len(),
        None => {
            let mut seen = HashSet::new();
            documents
                .iter()
                .filter(|d| is_relevant(d))
                .filter(|d| seen.insert(identity(d)))
                .count()
        }
    };

    let window = &documents[..top_k.min(documents.len())];
    let total_retrieved = window.len();

    let mut seen = HashSet::new();
    let mut relevant_retrieved = 0usize;
    let mut first_relevant_rank: Option<usize> = None;
    let mut dcg = 0.0f64;

    for (i, doc) in window.iter().enumerate() {
        if !is_relevant(doc) || !seen.insert(identity(doc)) {
            continue;
        }
        relevant_retrieved += 1;
        first_relevant_rank.get_or_insert(i + 1);
        dcg += 1.0 / ((i + 2) as f64).log2();
    }

    let ideal_hits = total_relevant.min(total_retrieved);
    let idcg: f64 = (0..ideal_hits).map(|i| 1.0 / ((i + 2) as f64).log2()).sum();

    let precision = ratio(relevant_retrieved, total_retrieved);
    let recall = ratio(relevant_retrieved, total_relevant);

    RelevanceMetrics {
        precision,
        recall,
        f1_score: f1(precision, recall),
        mrr: first_relevant_rank.map_or(0.0, |r| 1.0 / r as f64),
        ndcg: if idcg > 0.0 { (dcg / idcg).min(1.0) } else { 0.0 },
        relevant_retrieved,
        total_retrieved,
        total_relevant,
    }
}

pub fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn identity(doc: &RetrievedDocument) -> &str {
    doc.id.as_deref().unwrap_or(&doc.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str) -> RetrievedDocument {
        RetrievedDocument {
            id: Some(id.to_string()),
            content: content.to_string(),
            score: None,
            relevant: None,
        }
    }

    fn labelled(id: &str, relevant: bool) -> RetrievedDocument {
        RetrievedDocument {
            relevant: Some(relevant),
            ..doc(id, "irrelevant words")
        }
    }

    #[test]
    fn test_empty_inputs_are_zero() {
        let m = evaluate_relevance("anything", &[], None, 5);
        assert_eq!(m, RelevanceMetrics::default());

        let m = evaluate_relevance("anything", &[], Some(&[]), 5);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
    }

    #[test]
    fn test_keyword_heuristic() {
        let docs = vec![
            doc("1", "Solar energy is renewable."),
            doc("2", "Bananas are yellow."),
        ];
        let m = evaluate_relevance("solar power", &docs, None, 5);
        assert_eq!(m.relevant_retrieved, 1);
        assert_eq!(m.total_retrieved, 2);
        assert_eq!(m.total_relevant, 1);
        assert!((m.precision - 0.5).abs() < 1e-9);
        assert!((m.recall - 1.0).abs() < 1e-9);
        assert!((m.mrr - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_heuristic_ignores_case_and_punctuation() {
        let docs = vec![doc("1", "SOLAR, obviously!")];
        let m = evaluate_relevance("solar?", &docs, None, 5);
        assert_eq!(m.relevant_retrieved, 1);
    }

    #[test]
    fn test_ground_truth_overrides_labels() {
        let docs = vec![labelled("a", false), labelled("b", true), labelled("c", true)];
        let truth = vec!["a".to_string(), "z".to_string()];
        let m = evaluate_relevance("q", &docs, Some(&truth), 3);
        assert_eq!(m.relevant_retrieved, 1);
        assert_eq!(m.total_relevant, 2);
        assert!((m.precision - 1.0 / 3.0).abs() < 1e-9);
        assert!((m.recall - 0.5).abs() < 1e-9);
        assert!((m.mrr - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_k_window() {
        let docs = vec![labelled("a", false), labelled("b", false), labelled("c", true)];
        let m = evaluate_relevance("q", &docs, None, 2);
        assert_eq!(m.total_retrieved, 2);
        assert_eq!(m.relevant_retrieved, 0);
        assert_eq!(m.total_relevant, 1);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.mrr, 0.0);
        assert_eq!(m.ndcg, 0.0);
    }

    #[test]
    fn test_duplicate_ids_counted_once() {
        let docs = vec![labelled("a", true), labelled("a", true), labelled("b", false)];
        let m = evaluate_relevance("q", &docs, None, 3);
        assert_eq!(m.relevant_retrieved, 1);
        assert_eq!(m.total_relevant, 1);
        assert!((m.recall - 1.0).abs() < 1e-9);
        assert!((m.precision - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_mrr_and_ndcg_second_position() {
        let docs = vec![labelled("a", false), labelled("b", true)];
        let m = evaluate_relevance("q", &docs, None, 2);
        assert!((m.mrr - 0.5).abs() < 1e-9);
        // DCG = 1/log2(3), IDCG = 1/log2(2) = 1
        assert!((m.ndcg - 1.0 / 3f64.log2()).abs() < 1e-9);
    }

    #[test]
    fn test_perfect_ranking_ndcg_is_one() {
        let docs = vec![labelled("a", true), labelled("b", true), labelled("c", false)];
        let m = evaluate_relevance("q", &docs, None, 3);
        assert!((m.ndcg - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_f1() {
        assert_eq!(f1(0.0, 0.0), 0.0);
        assert!((f1(0.5, 1.0) - 2.0 / 3.0).abs() < 1e-12);
        assert!((f1(1.0, 1.0) - 1.0).abs() < 1e-12);
    }
}
