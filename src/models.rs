use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broad media category of an uploaded file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Document,
    Image,
    Audio,
    Video,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Document => "document",
            ContentType::Image => "image",
            ContentType::Audio => "audio",
            ContentType::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(ContentType::Document),
            "image" => Some(ContentType::Image),
            "audio" => Some(ContentType::Audio),
            "video" => Some(ContentType::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessingStatus::Pending),
            "processing" => Some(ProcessingStatus::Processing),
            "completed" => Some(ProcessingStatus::Completed),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }
}

/// A stored upload and everything learned about it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: Uuid,
    pub filename: String,
    pub content_type: ContentType,
    pub mime_type: String,
    pub size: u64,
    pub upload_time: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
    pub extracted_text: Option<String>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A text chunk of an upload, ready for indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChunk {
    pub file_id: Uuid,
    pub filename: String,
    pub content_type: ContentType,
    pub chunk_index: usize,
    pub content: String,
}

/// A fused retrieval result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub file_id: Uuid,
    pub filename: String,
    pub content_type: ContentType,
    pub chunk_index: usize,
    pub content: String,
    pub keyword_score: f32,
    pub vector_score: f32,
    pub score: f32,
}

impl SearchHit {
    /// Stable identifier of the chunk behind this hit.
    pub fn chunk_id(&self) -> String {
        format!("{}:{}", self.file_id, self.chunk_index)
    }
}

/// Upload acknowledgement
#[derive(Debug, Clone, Serialize)]
pub struct FileUploadResponse {
    pub file_id: Uuid,
    pub filename: String,
    pub content_type: ContentType,
    pub size: u64,
    pub status: ProcessingStatus,
    pub upload_time: DateTime<Utc>,
    pub message: String,
}

/// Query / RAG request
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_true")]
    pub include_sources: bool,
    /// Caller identity recorded in the query log
    #[serde(default)]
    pub user_id: Option<String>,
    /// Caller's id for this query, carried into evaluation records
    #[serde(default)]
    pub query_id: Option<String>,
}

/// Largest `top_k` any endpoint accepts.
pub const MAX_TOP_K: usize = 100;

pub fn default_top_k() -> usize {
    5
}

/// `Err` with a client-facing message when `top_k` is outside `1..=MAX_TOP_K`.
pub fn validate_top_k(top_k: usize) -> Result<(), String> {
    if (1..=MAX_TOP_K).contains(&top_k) {
        Ok(())
    } else {
        Err(format!("top_k must be between 1 and {MAX_TOP_K}"))
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchQueryRequest {
    pub queries: Vec<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Answer with sources and a support-based confidence
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub answer: String,
    pub sources: Option<Vec<SearchHit>>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

/// Partial update of a content record's descriptive fields
#[derive(Debug, Clone, Deserialize)]
pub struct ContentUpdate {
    pub tags: Option<Vec<String>>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A retrieved document as judged by the evaluation endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub score: Option<f32>,
    /// Ground-truth relevance label, when the caller has one
    #[serde(default)]
    pub relevant: Option<bool>,
}

impl From<&SearchHit> for RetrievedDocument {
    fn from(hit: &SearchHit) -> Self {
        Self {
            id: Some(hit.chunk_id()),
            content: hit.content.clone(),
            score: Some(hit.score),
            relevant: None,
        }
    }
}
