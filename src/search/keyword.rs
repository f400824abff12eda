use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy};
use uuid::Uuid;

use crate::models::{ContentChunk, ContentType};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// BM25 keyword index over content chunks, built on tantivy.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    // tantivy allows one writer per index; uploads are processed concurrently
    writer: Mutex<IndexWriter>,
    f_file_id: Field,
    f_filename: Field,
    f_content_type: Field,
    f_chunk_index: Field,
    f_content: Field,
}

#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub file_id: Uuid,
    pub filename: String,
    pub content_type: ContentType,
    pub chunk_index: usize,
    pub content: String,
    pub score: f32,
}

impl KeywordIndex {
    /// Create or open a keyword index at the given directory.
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;

        let mut schema_builder = Schema::builder();
        schema_builder.add_text_field("file_id", STRING | STORED);
        schema_builder.add_text_field("filename", TEXT | STORED);
        schema_builder.add_text_field("content_type", STRING | STORED);
        schema_builder.add_u64_field("chunk_index", NumericOptions::default() | STORED);
        schema_builder.add_text_field("content", TEXT | STORED);
        let schema = schema_builder.build();

        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir).context("Failed to open existing tantivy index")?
        } else {
            Index::create_in_dir(index_dir, schema).context("Failed to create tantivy index")?
        };

        // Field handles come from the live schema so a reopened index resolves them too
        let schema = index.schema();
        let field = |name: &str| {
            schema
                .get_field(name)
                .with_context(|| format!("Keyword index is missing field '{name}'"))
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create reader")?;

        let writer: IndexWriter = index
            .writer(WRITER_HEAP_BYTES)
            .context("Failed to create index writer")?;

        Ok(Self {
            f_file_id: field("file_id")?,
            f_filename: field("filename")?,
            f_content_type: field("content_type")?,
            f_chunk_index: field("chunk_index")?,
            f_content: field("content")?,
            index,
            reader,
            writer: Mutex::new(writer),
        })
    }

    /// Index a batch of chunks and make them searchable.
    pub fn index_chunks(&self, chunks: &[ContentChunk]) -> Result<()> {
        let mut writer = self.writer.lock();

        for chunk in chunks {
            writer.add_document(doc!(
                self.f_file_id => chunk.file_id.to_string(),
                self.f_filename => chunk.filename.clone(),
                self.f_content_type => chunk.content_type.as_str().to_string(),
                self.f_chunk_index => chunk.chunk_index as u64,
                self.f_content => chunk.content.clone(),
            ))?;
        }

        writer.commit().context("Failed to commit index")?;
        self.reader.reload().context("Failed to reload reader")?;
        Ok(())
    }

    /// Delete all documents for a given upload.
    pub fn delete_file(&self, file_id: &Uuid) -> Result<()> {
        let mut writer = self.writer.lock();
        let term = tantivy::Term::from_field_text(self.f_file_id, &file_id.to_string());
        writer.delete_term(term);
        writer.commit().context("Failed to commit delete")?;
        self.reader.reload().context("Failed to reload reader")?;
        Ok(())
    }

    /// Search the index and return scored hits.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        if query_str.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser =
            QueryParser::for_index(&self.index, vec![self.f_content, self.f_filename]);
        // Lenient parsing: free text from users often contains query syntax characters
        let (query, errors) = query_parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            tracing::debug!("Lenient keyword query parse for {query_str:?}: {errors:?}");
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .context("Search failed")?;

        let mut hits = Vec::with_capacity(top_docs.len());

        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve document")?;

            let text = |f: Field| {
                doc.get_first(f)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };

            let file_id = match Uuid::parse_str(&text(self.f_file_id)) {
                Ok(id) => id,
                Err(_) => continue,
            };

            let content_type =
                ContentType::parse(&text(self.f_content_type)).unwrap_or(ContentType::Document);

            let chunk_index = doc
                .get_first(self.f_chunk_index)
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize;

            hits.push(KeywordHit {
                file_id,
                filename: text(self.f_filename),
                content_type,
                chunk_index,
                content: text(self.f_content),
                score,
            });
        }

        Ok(hits)
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}
