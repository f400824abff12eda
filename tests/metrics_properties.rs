//! Property tests for the scoring functions behind the evaluation endpoints.

use proptest::prelude::*;

use content_analytics::chunking::chunk_text;
use content_analytics::evaluation::hallucination::detect_hallucination;
use content_analytics::evaluation::relevance::{evaluate_relevance, f1};
use content_analytics::models::RetrievedDocument;
use content_analytics::stats::percentile;

fn arb_documents() -> impl Strategy<Value = Vec<RetrievedDocument>> {
    prop::collection::vec(
        ("[a-e]", "[a-z]{1,8}( [a-z]{1,8}){0,4}", any::<Option<bool>>()),
        0..12,
    )
    .prop_map(|docs| {
        docs.into_iter()
            .map(|(id, content, relevant)| RetrievedDocument {
                id: Some(id),
                content,
                score: None,
                relevant,
            })
            .collect()
    })
}

fn arb_ground_truth() -> impl Strategy<Value = Option<Vec<String>>> {
    prop::option::of(prop::collection::vec("[a-g]", 0..5))
}

proptest! {
    #[test]
    fn prop_relevance_scores_stay_in_unit_range(
        query in "[a-z]{1,8}( [a-z]{1,8}){0,3}",
        docs in arb_documents(),
        truth in arb_ground_truth(),
        top_k in 1usize..15,
    ) {
        let m = evaluate_relevance(&query, &docs, truth.as_deref(), top_k);
        for value in [m.precision, m.recall, m.f1_score, m.mrr, m.ndcg] {
            prop_assert!((0.0..=1.0).contains(&value), "{m:?}");
        }
        prop_assert!(m.total_retrieved <= top_k);
        prop_assert!(m.relevant_retrieved <= m.total_retrieved);
    }

    #[test]
    fn prop_f1_is_harmonic_mean(
        query in "[a-z]{1,8}",
        docs in arb_documents(),
        truth in arb_ground_truth(),
        top_k in 1usize..15,
    ) {
        let m = evaluate_relevance(&query, &docs, truth.as_deref(), top_k);
        let expected = if m.precision + m.recall == 0.0 {
            0.0
        } else {
            2.0 * m.precision * m.recall / (m.precision + m.recall)
        };
        prop_assert!((m.f1_score - expected).abs() < 1e-9);
        prop_assert!((f1(m.precision, m.recall) - expected).abs() < 1e-9);
    }

    /// Each unsupported sentence added to a grounded answer raises the
    /// hallucination score.
    #[test]
    fn prop_hallucination_grows_with_unsupported_sentences(
        supported in 1usize..5,
        unsupported in 0usize..5,
    ) {
        let source = "The river flows north through the valley.";
        let grounded = "The river flows north through the valley.";
        let invented = "Quantum zebras compose symphonies on mars.";

        let make = |extra: usize| {
            let mut sentences = vec![grounded; supported];
            sentences.extend(std::iter::repeat(invented).take(extra));
            sentences.join(" ")
        };

        let fewer = detect_hallucination(&make(unsupported), &[source]);
        let more = detect_hallucination(&make(unsupported + 1), &[source]);
        prop_assert!(more.hallucination_score > fewer.hallucination_score);

        let expected = unsupported as f64 / (supported + unsupported) as f64;
        prop_assert!((fewer.hallucination_score - expected).abs() < 1e-9);
        prop_assert!((fewer.factuality_score - (1.0 - expected)).abs() < 1e-9);
    }

    #[test]
    fn prop_percentile_is_bounded_and_monotonic(
        mut values in prop::collection::vec(0.0f64..1000.0, 1..50),
        a in 0.0f64..100.0,
        b in 0.0f64..100.0,
    ) {
        values.sort_by(f64::total_cmp);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let p_lo = percentile(&values, lo);
        let p_hi = percentile(&values, hi);
        prop_assert!(p_lo <= p_hi + 1e-9);
        prop_assert!(p_lo >= values[0] - 1e-9);
        prop_assert!(p_hi <= values[values.len() - 1] + 1e-9);
    }

    #[test]
    fn prop_chunks_respect_budget(
        text in "([a-z]{1,12}[ .\n]{1,2}){0,80}",
        budget in 10usize..200,
    ) {
        for chunk in chunk_text(&text, budget) {
            prop_assert!(!chunk.trim().is_empty());
            prop_assert!(chunk.chars().count() <= budget, "{} > {budget}", chunk.chars().count());
        }
    }
}
