use std::collections::HashMap;
use uuid::Uuid;

use crate::models::SearchHit;
use crate::search::keyword::KeywordHit;
use crate::search::vector::VectorHit;

/// RRF constant
const RRF_K: f32 = 60.0;

/// Reciprocal Rank Fusion of keyword and vector result lists.
///
/// Each list contributes `1 / (k + rank)` (1-based rank) to a chunk's fused
/// score; chunks found by both retrievers accumulate both contributions. The
/// raw per-retriever scores are kept on the hit for display.
pub fn rrf_fusion(
    keyword_hits: &[KeywordHit],
    vector_hits: &[VectorHit],
    limit: usize,
) -> Vec<SearchHit> {
    // Key: (file_id, chunk_index)
    type Key = (Uuid, usize);
    let mut score_map: HashMap<Key, SearchHit> = HashMap::new();

    for (rank, hit) in keyword_hits.iter().enumerate() {
        let entry = score_map
            .entry((hit.file_id, hit.chunk_index))
            .or_insert_with(|| SearchHit {
                file_id: hit.file_id,
                filename: hit.filename.clone(),
                content_type: hit.content_type,
                chunk_index: hit.chunk_index,
                content: hit.content.clone(),
                keyword_score: 0.0,
                vector_score: 0.0,
                score: 0.0,
            });

        entry.keyword_score = entry.keyword_score.max(hit.score);
        entry.score += 1.0 / (RRF_K + rank as f32 + 1.0);
    }

    for (rank, hit) in vector_hits.iter().enumerate() {
        let entry = score_map
            .entry((hit.file_id, hit.chunk_index))
            .or_insert_with(|| SearchHit {
                file_id: hit.file_id,
                filename: hit.filename.clone(),
                content_type: hit.content_type,
                chunk_index: hit.chunk_index,
                content: hit.content.clone(),
                keyword_score: 0.0,
                vector_score: 0.0,
                score: 0.0,
            });

        entry.vector_score = entry.vector_score.max(hit.score);
        entry.score += 1.0 / (RRF_K + rank as f32 + 1.0);
    }

    let mut results: Vec<SearchHit> = score_map.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.vector_score.total_cmp(&a.vector_score))
    });
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;

    fn keyword_hit(id: Uuid, chunk: usize, score: f32) -> KeywordHit {
        KeywordHit {
            file_id: id,
            filename: "doc.txt".to_string(),
            content_type: ContentType::Document,
            chunk_index: chunk,
            content: format!("chunk {chunk}"),
            score,
        }
    }

    fn vector_hit(id: Uuid, chunk: usize, score: f32) -> VectorHit {
        VectorHit {
            file_id: id,
            filename: "doc.txt".to_string(),
            content_type: ContentType::Document,
            chunk_index: chunk,
            content: format!("chunk {chunk}"),
            score,
        }
    }

    #[test]
    fn test_empty_inputs() {
        assert!(rrf_fusion(&[], &[], 10).is_empty());
    }

    #[test]
    fn test_keyword_only_rank_order() {
        let id = Uuid::new_v4();
        let results = rrf_fusion(&[keyword_hit(id, 0, 5.0), keyword_hit(id, 1, 3.0)], &[], 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_index, 0);
        assert!((results[0].score - 1.0 / 61.0).abs() < 1e-6);
        assert!((results[1].score - 1.0 / 62.0).abs() < 1e-6);
    }

    #[test]
    fn test_found_by_both_ranks_first() {
        let id = Uuid::new_v4();
        // Chunk 0: rank 1 keyword, rank 2 vector. Chunk 1: keyword rank 2 only.
        // Chunk 2: vector rank 1 only.
        let results = rrf_fusion(
            &[keyword_hit(id, 0, 5.0), keyword_hit(id, 1, 3.0)],
            &[vector_hit(id, 2, 0.9), vector_hit(id, 0, 0.7)],
            10,
        );
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk_index, 0);
        assert!((results[0].score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-6);
        assert_eq!(results[0].keyword_score, 5.0);
        assert_eq!(results[0].vector_score, 0.7);
    }

    #[test]
    fn test_tie_broken_by_vector_score() {
        let id = Uuid::new_v4();
        let results = rrf_fusion(&[keyword_hit(id, 0, 5.0)], &[vector_hit(id, 1, 0.8)], 10);
        assert_eq!(results[0].chunk_index, 1);
    }

    #[test]
    fn test_limit_respected() {
        let id = Uuid::new_v4();
        let hits: Vec<_> = (0..20).map(|i| keyword_hit(id, i, 20.0 - i as f32)).collect();
        assert_eq!(rrf_fusion(&hits, &[], 5).len(), 5);
    }

    #[test]
    fn test_distinct_files_same_chunk_index_not_merged() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let results = rrf_fusion(&[keyword_hit(a, 0, 1.0)], &[vector_hit(b, 0, 0.5)], 10);
        assert_eq!(results.len(), 2);
    }
}
