use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::models::{ContentChunk, ContentType};

/// A stored vector entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    file_id: Uuid,
    filename: String,
    content_type: ContentType,
    chunk_index: usize,
    content: String,
    embedding: Vec<f32>,
}

/// In-memory vector store with disk persistence and cosine similarity search.
pub struct VectorStore {
    entries: RwLock<Vec<VectorEntry>>,
    persist_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub file_id: Uuid,
    pub filename: String,
    pub content_type: ContentType,
    pub chunk_index: usize,
    pub content: String,
    pub score: f32,
}

impl VectorStore {
    pub fn open_or_create(vector_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(vector_dir)?;
        let persist_path = vector_dir.join("vectors.json");

        let entries = if persist_path.exists() {
            let data =
                std::fs::read_to_string(&persist_path).context("Failed to read vector store")?;
            serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable vector store: {e}");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            persist_path,
        })
    }

    /// Add vectors for content chunks. `embeddings` must be parallel with `chunks`.
    pub fn add_chunks(&self, chunks: &[ContentChunk], embeddings: Vec<Vec<f32>>) -> Result<()> {
        if chunks.len() != embeddings.len() {
            anyhow::bail!(
                "Embedding count mismatch: {} chunks, {} embeddings",
                chunks.len(),
                embeddings.len()
            );
        }

        let mut entries = self.entries.write();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            entries.push(VectorEntry {
                file_id: chunk.file_id,
                filename: chunk.filename.clone(),
                content_type: chunk.content_type,
                chunk_index: chunk.chunk_index,
                content: chunk.content.clone(),
                embedding,
            });
        }

        self.persist(&entries)
    }

    /// Delete all vectors for an upload. Returns how many were removed.
    pub fn delete_file(&self, file_id: &Uuid) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| &e.file_id != file_id);
        let removed = before - entries.len();

        if removed > 0 {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    /// Search by cosine similarity against a query embedding.
    pub fn search(&self, query_embedding: &[f32], limit: usize) -> Vec<VectorHit> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();

        // Sort descending by score
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| VectorHit {
                file_id: e.file_id,
                filename: e.filename.clone(),
                content_type: e.content_type,
                chunk_index: e.chunk_index,
                content: e.content.clone(),
                score,
            })
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Get chunk counts grouped by file_id.
    pub fn file_counts(&self) -> HashMap<Uuid, usize> {
        let entries = self.entries.read();
        let mut counts = HashMap::new();
        for e in entries.iter() {
            *counts.entry(e.file_id).or_insert(0) += 1;
        }
        counts
    }

    /// Dimension of the stored vectors, if any are stored.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.read().first().map(|e| e.embedding.len())
    }

    // Write to a sibling temp file, then rename over the old one.
    fn persist(&self, entries: &[VectorEntry]) -> Result<()> {
        let data = serde_json::to_string(entries)?;
        let tmp = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp, data).context("Failed to write vector store")?;
        std::fs::rename(&tmp, &self.persist_path).context("Failed to replace vector store")?;
        Ok(())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(file_id: Uuid, index: usize, content: &str) -> ContentChunk {
        ContentChunk {
            file_id,
            filename: "notes.txt".to_string(),
            content_type: ContentType::Document,
            chunk_index: index,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open_or_create(dir.path()).unwrap();
        let id = Uuid::new_v4();

        store
            .add_chunks(
                &[chunk(id, 0, "east"), chunk(id, 1, "north")],
                vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .unwrap();

        let hits = store.search(&[0.1, 0.9], 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "north");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_mismatched_embeddings_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open_or_create(dir.path()).unwrap();
        let id = Uuid::new_v4();
        assert!(store.add_chunks(&[chunk(id, 0, "a")], vec![]).is_err());
        assert_eq!(store.entry_count(), 0);
    }

    #[test]
    fn test_persist_reload_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let keep = Uuid::new_v4();
        let drop = Uuid::new_v4();
        {
            let store = VectorStore::open_or_create(dir.path()).unwrap();
            store
                .add_chunks(&[chunk(keep, 0, "a"), chunk(keep, 1, "b")], vec![vec![1.0; 3]; 2])
                .unwrap();
            store
                .add_chunks(&[chunk(drop, 0, "c")], vec![vec![0.5; 3]])
                .unwrap();
        }

        let store = VectorStore::open_or_create(dir.path()).unwrap();
        assert_eq!(store.entry_count(), 3);
        assert_eq!(store.dimension(), Some(3));

        assert_eq!(store.delete_file(&drop).unwrap(), 1);
        assert_eq!(store.delete_file(&drop).unwrap(), 0);

        let counts = store.file_counts();
        assert_eq!(counts.get(&keep), Some(&2));
        assert!(!counts.contains_key(&drop));
    }
}
