use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::tokenize;

/// Minimum share of a sentence's distinct tokens found in one source for the
/// sentence to count as supported.
const SUPPORT_OVERLAP: f64 = 0.5;

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "cannot", "none", "nor", "neither", "nobody", "nothing", "nowhere",
    "without",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HallucinationMetrics {
    pub hallucination_score: f64,
    pub supported_sentences: usize,
    pub contradicted_sentences: usize,
    pub total_sentences: usize,
    pub confidence: f64,
    pub factuality_score: f64,
}

/// Split on runs of `.`, `!` and `?`, trimming and dropping empty pieces.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Judge how much of `response` is backed by `sources`.
///
/// A sentence is supported when it appears verbatim (case-insensitive) in a
/// source, or when at least half its distinct tokens occur in one source.
/// A supported sentence whose negation polarity differs from its
/// best-matching source sentence is contradicted, and counts against the
/// response like an unsupported one.
pub fn detect_hallucination(response: &str, sources: &[&str]) -> HallucinationMetrics {
    let sentences = split_sentences(response);
    let total = sentences.len();

    if total == 0 {
        return HallucinationMetrics {
            hallucination_score: 0.0,
            supported_sentences: 0,
            contradicted_sentences: 0,
            total_sentences: 0,
            confidence: 1.0,
            factuality_score: 1.0,
        };
    }

    let prepared: Vec<PreparedSource> = sources.iter().map(|s| PreparedSource::new(s)).collect();

    let mut supported = 0usize;
    let mut contradicted = 0usize;
    let mut factuality_sum = 0.0f64;

    for sentence in sentences {
        let lower = sentence.to_lowercase();
        let tokens = tokenize(sentence);

        let best_ratio = prepared
            .iter()
            .map(|src| {
                if src.lower.contains(&lower) {
                    1.0
                } else {
                    overlap_ratio(&tokens, &src.tokens)
                }
            })
            .fold(0.0f64, f64::max);

        if prepared.is_empty() || best_ratio < SUPPORT_OVERLAP {
            factuality_sum += best_ratio;
            continue;
        }
        supported += 1;

        if contradicts(&tokens, &prepared) {
            contradicted += 1;
        } else {
            factuality_sum += best_ratio;
        }
    }

    let total_f = total as f64;
    HallucinationMetrics {
        hallucination_score: (total - supported + contradicted) as f64 / total_f,
        supported_sentences: supported,
        contradicted_sentences: contradicted,
        total_sentences: total,
        confidence: (supported - contradicted) as f64 / total_f,
        factuality_score: factuality_sum / total_f,
    }
}

struct PreparedSource {
    lower: String,
    tokens: HashSet<String>,
    sentences: Vec<HashSet<String>>,
}

impl PreparedSource {
    fn new(text: &str) -> Self {
        Self {
            lower: text.to_lowercase(),
            tokens: tokenize(text),
            sentences: split_sentences(text).into_iter().map(tokenize).collect(),
        }
    }
}

/// Share of `sentence` tokens present in `source`. A sentence with no
/// tokens is trivially covered.
fn overlap_ratio(sentence: &HashSet<String>, source: &HashSet<String>) -> f64 {
    if sentence.is_empty() {
        return 1.0;
    }
    sentence.intersection(source).count() as f64 / sentence.len() as f64
}

fn is_negated(tokens: &HashSet<String>) -> bool {
    tokens
        .iter()
        .any(|t| NEGATIONS.contains(&t.as_str()) || t.ends_with("n't"))
}

// Compare polarity with the single closest source sentence across all sources.
fn contradicts(sentence: &HashSet<String>, sources: &[PreparedSource]) -> bool {
    let mut best: Option<(f64, &HashSet<String>)> = None;
    for candidate in sources.iter().flat_map(|s| s.sentences.iter()) {
        let ratio = overlap_ratio(sentence, candidate);
        if best.map_or(true, |(r, _)| ratio > r) {
            best = Some((ratio, candidate));
        }
    }

    match best {
        Some((_, closest)) => is_negated(sentence) != is_negated(closest),
        None => false,
    }
}
