//! # content-analytics
//!
//! An HTTP service that ingests uploaded content (documents, images, audio,
//! video), extracts text from it, and answers questions over the corpus with
//! a retrieval-augmented generation pipeline. Every answer can be scored for
//! retrieval quality and hallucination, and request telemetry is kept for
//! the dashboard endpoints.
//!
//! ## Architecture
//!
//! ```text
//!   upload ──► store (sqlite, pending) ──► background task
//!                                              │
//!                       extract ◄──────────────┘
//!              (pdf/docx/text, caption, transcript)
//!                          │
//!                          ▼
//!                       chunk ──► embed ──► vector store
//!                          └─────────────► keyword index (tantivy)
//!
//!   query ──► keyword search ─┐
//!         └─► vector search ──┴─► RRF fusion ──► context ──► LLM ──► answer
//!                                                                  │
//!                                          relevance + hallucination scoring
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration and evaluation thresholds
//! - [`models`] - Shared data types: `ContentRecord`, `ContentChunk`, `SearchHit`, request/response types
//! - [`store`] - SQLite content metadata store
//! - [`extract`] - Text extraction per content type
//! - [`chunking`] - Sentence-aware text chunking
//! - [`ingest`] - Upload acceptance and background processing
//! - [`search::keyword`] - BM25 full-text index powered by tantivy
//! - [`search::vector`] - In-memory vector store with cosine similarity and disk persistence
//! - [`search::hybrid`] - Reciprocal Rank Fusion of keyword and vector hits
//! - [`llm`] - Embeddings, completion, transcription and image captioning clients
//! - [`rag`] - Retrieve, augment, generate
//! - [`evaluation`] - Relevance metrics, hallucination detection and the evaluation log
//! - [`telemetry`] - Log setup and request metrics
//! - [`stats`] - Percentiles and distributions
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod chunking;
pub mod config;
pub mod evaluation;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod rag;
pub mod search;
pub mod state;
pub mod stats;
pub mod store;
pub mod telemetry;
