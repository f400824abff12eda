//! Request counters, response-time samples and a bounded request history,
//! persisted to a JSON file after every event.
//!
//! Snapshots are serialized under the lock and written on a blocking
//! thread. Each carries a generation number so an older snapshot never
//! overwrites a newer one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::stats::Percentiles;

pub const HISTORY_LIMIT: usize = 100;
pub const RESPONSE_TIME_SAMPLES: usize = 1000;
const QUERY_PREVIEW_CHARS: usize = 100;
const RESPONSE_PREVIEW_CHARS: usize = 500;
const ERROR_PREVIEW_CHARS: usize = 200;

/// A retrieved chunk as the query log records it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRef {
    /// `<file_id>:<chunk_index>`
    pub id: String,
    pub score: f32,
}

/// One recorded request, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestEvent {
    Query {
        query: String,
        #[serde(default)]
        response: String,
        response_time: f64,
        result_count: usize,
        #[serde(default)]
        documents: Vec<DocumentRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    RagRetrieval {
        query: String,
        results_count: usize,
    },
    FileUpload {
        filename: String,
        file_size: u64,
        content_type: String,
    },
    Evaluation {
        evaluation_id: String,
        query: String,
    },
    Error {
        error_type: String,
        error_message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RequestEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetricsState {
    queries_processed: u64,
    total_response_time: f64,
    query_count: u64,
    rag_retrieval_count: u64,
    file_upload_count: u64,
    evaluation_count: u64,
    error_count: u64,
    request_history: VecDeque<HistoryEntry>,
    response_times: VecDeque<f64>,
    since: DateTime<Utc>,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self {
            queries_processed: 0,
            total_response_time: 0.0,
            query_count: 0,
            rag_retrieval_count: 0,
            file_upload_count: 0,
            evaluation_count: 0,
            error_count: 0,
            request_history: VecDeque::new(),
            response_times: VecDeque::new(),
            since: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub queries_processed: u64,
    pub average_response_time: f64,
    pub total_response_time: f64,
    pub query_count: u64,
    pub rag_retrieval_count: u64,
    pub file_upload_count: u64,
    pub evaluation_count: u64,
    pub error_count: u64,
    pub total_requests: u64,
    pub response_time_percentiles: Percentiles,
    pub since: DateTime<Utc>,
}

pub struct MetricsTracker {
    state: Mutex<MetricsState>,
    persist_path: Option<PathBuf>,
    generation: AtomicU64,
    /// Generation of the snapshot currently on disk
    written: Arc<Mutex<u64>>,
}

impl MetricsTracker {
    /// Load persisted metrics from `path` if present; a missing or unreadable
    /// file starts from zero.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let state = match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!("Could not load metrics file {}: {e}", path.display());
                MetricsState::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MetricsState::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        Ok(Self {
            state: Mutex::new(state),
            persist_path: Some(path.to_path_buf()),
            generation: AtomicU64::new(0),
            written: Arc::new(Mutex::new(0)),
        })
    }

    /// A tracker that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(MetricsState::default()),
            persist_path: None,
            generation: AtomicU64::new(0),
            written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn log_query(
        &self,
        query: &str,
        response: &str,
        response_time: f64,
        documents: Vec<DocumentRef>,
        user_id: Option<&str>,
    ) {
        self.record(|s| {
            s.queries_processed += 1;
            s.query_count += 1;
            s.total_response_time += response_time;
            s.response_times.push_back(response_time);
            while s.response_times.len() > RESPONSE_TIME_SAMPLES {
                s.response_times.pop_front();
            }
            RequestEvent::Query {
                query: truncate(query, QUERY_PREVIEW_CHARS),
                response: truncate(response, RESPONSE_PREVIEW_CHARS),
                response_time,
                result_count: documents.len(),
                documents,
                user_id: user_id.map(str::to_string),
            }
        });
    }

    pub fn log_rag_retrieval(&self, query: &str, results_count: usize) {
        self.record(|s| {
            s.rag_retrieval_count += 1;
            RequestEvent::RagRetrieval {
                query: truncate(query, QUERY_PREVIEW_CHARS),
                results_count,
            }
        });
    }

    pub fn log_file_upload(&self, filename: &str, file_size: u64, content_type: &str) {
        self.record(|s| {
            s.file_upload_count += 1;
            RequestEvent::FileUpload {
                filename: filename.to_string(),
                file_size,
                content_type: content_type.to_string(),
            }
        });
    }

    pub fn log_evaluation(&self, evaluation_id: &str, query: &str) {
        self.record(|s| {
            s.evaluation_count += 1;
            RequestEvent::Evaluation {
                evaluation_id: evaluation_id.to_string(),
                query: truncate(query, QUERY_PREVIEW_CHARS),
            }
        });
    }

    pub fn log_error(
        &self,
        error_type: &str,
        error_message: &str,
        context: Option<serde_json::Value>,
    ) {
        self.record(|s| {
            s.error_count += 1;
            RequestEvent::Error {
                error_type: error_type.to_string(),
                error_message: truncate(error_message, ERROR_PREVIEW_CHARS),
                context,
            }
        });
    }

    pub fn summary(&self) -> MetricsSummary {
        let s = self.state.lock();

        let average_response_time = if s.query_count == 0 {
            0.0
        } else {
            s.total_response_time / s.query_count as f64
        };

        let mut sorted: Vec<f64> = s.response_times.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        MetricsSummary {
            queries_processed: s.queries_processed,
            average_response_time,
            total_response_time: s.total_response_time,
            query_count: s.query_count,
            rag_retrieval_count: s.rag_retrieval_count,
            file_upload_count: s.file_upload_count,
            evaluation_count: s.evaluation_count,
            error_count: s.error_count,
            total_requests: s.query_count
                + s.rag_retrieval_count
                + s.file_upload_count
                + s.evaluation_count,
            response_time_percentiles: Percentiles::from_sorted(&sorted),
            since: s.since,
        }
    }

    /// Most recent events, oldest first.
    pub fn history(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        let s = self.state.lock();
        let limit = limit.unwrap_or(HISTORY_LIMIT).min(s.request_history.len());
        s.request_history
            .iter()
            .skip(s.request_history.len() - limit)
            .cloned()
            .collect()
    }

    pub fn reset(&self) {
        let mut s = self.state.lock();
        *s = MetricsState::default();
        self.persist(&s);
        tracing::info!("Metrics reset");
    }

    fn record(&self, update: impl FnOnce(&mut MetricsState) -> RequestEvent) {
        let mut s = self.state.lock();
        let event = update(&mut s);
        s.request_history.push_back(HistoryEntry {
            timestamp: Utc::now(),
            event,
        });
        while s.request_history.len() > HISTORY_LIMIT {
            s.request_history.pop_front();
        }
        self.persist(&s);
    }

    // Called with the state lock held. Persistence failures are logged,
    // never surfaced to the request.
    fn persist(&self, state: &MetricsState) {
        let Some(path) = self.persist_path.clone() else {
            return;
        };
        let data = match serde_json::to_string(state) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Could not serialize metrics: {e}");
                return;
            }
        };
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let written = self.written.clone();

        let write = move || {
            let mut last = written.lock();
            if *last > generation {
                return;
            }
            let tmp = path.with_extension("json.tmp");
            let result = std::fs::write(&tmp, data).and_then(|()| std::fs::rename(&tmp, &path));
            match result {
                Ok(()) => *last = generation,
                Err(e) => tracing::error!("Could not save metrics file {}: {e}", path.display()),
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(n: usize) -> Vec<DocumentRef> {
        (0..n)
            .map(|i| DocumentRef {
                id: format!("f:{i}"),
                score: 1.0 / (i + 1) as f32,
            })
            .collect()
    }

    #[test]
    fn test_counts_and_average() {
        let m = MetricsTracker::in_memory();
        m.log_query("a", "ans", 1.0, docs(3), None);
        m.log_query("b", "ans", 3.0, docs(1), None);
        m.log_rag_retrieval("a", 3);
        m.log_file_upload("x.pdf", 10, "document");
        m.log_evaluation("id-1", "a");
        m.log_error("http_500", "boom", None);

        let s = m.summary();
        assert_eq!(s.queries_processed, 2);
        assert_eq!(s.query_count, 2);
        assert!((s.average_response_time - 2.0).abs() < 1e-9);
        assert_eq!(s.rag_retrieval_count, 1);
        assert_eq!(s.file_upload_count, 1);
        assert_eq!(s.evaluation_count, 1);
        assert_eq!(s.error_count, 1);
        assert_eq!(s.total_requests, 5);
        assert!((s.response_time_percentiles.p50 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_history_is_bounded() {
        let m = MetricsTracker::in_memory();
        for i in 0..(HISTORY_LIMIT + 20) {
            m.log_rag_retrieval(&format!("q{i}"), i);
        }
        let history = m.history(None);
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(
            history.last().unwrap().event,
            RequestEvent::RagRetrieval {
                query: format!("q{}", HISTORY_LIMIT + 19),
                results_count: HISTORY_LIMIT + 19,
            }
        );
        assert_eq!(m.history(Some(5)).len(), 5);
        assert_eq!(m.summary().rag_retrieval_count, (HISTORY_LIMIT + 20) as u64);
    }

    #[test]
    fn test_long_query_and_error_truncated() {
        let m = MetricsTracker::in_memory();
        m.log_query(&"q".repeat(150), &"r".repeat(600), 0.1, Vec::new(), None);
        m.log_error("e", &"x".repeat(300), None);

        let history = m.history(None);
        match &history[0].event {
            RequestEvent::Query {
                query, response, ..
            } => {
                assert_eq!(query.len(), 103);
                assert_eq!(response.len(), 503);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &history[1].event {
            RequestEvent::Error { error_message, .. } => assert_eq!(error_message.len(), 203),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let m = MetricsTracker::in_memory();
        m.log_query("a", "ans", 1.0, docs(1), None);
        m.reset();
        let s = m.summary();
        assert_eq!(s.total_requests, 0);
        assert_eq!(s.average_response_time, 0.0);
        assert!(m.history(None).is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("metrics.json");
        {
            let m = MetricsTracker::open(&path).unwrap();
            m.log_file_upload("a.txt", 5, "document");
            m.log_query("q", "ans", 0.5, docs(2), Some("u-1"));
        }
        let m = MetricsTracker::open(&path).unwrap();
        let s = m.summary();
        assert_eq!(s.file_upload_count, 1);
        assert_eq!(s.query_count, 1);
        let history = m.history(None);
        assert_eq!(history.len(), 2);
        match &history[1].event {
            RequestEvent::Query {
                documents, user_id, ..
            } => {
                assert_eq!(documents.len(), 2);
                assert_eq!(user_id.as_deref(), Some("u-1"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_query_entry_json_shape() {
        let m = MetricsTracker::in_memory();
        m.log_query("what is rust", "A language.", 0.25, docs(2), Some("alice"));

        let json = serde_json::to_value(&m.history(None)[0]).unwrap();
        assert_eq!(json["type"], "query");
        assert_eq!(json["query"], "what is rust");
        assert_eq!(json["response"], "A language.");
        assert_eq!(json["result_count"], 2);
        assert_eq!(json["documents"][0]["id"], "f:0");
        assert_eq!(json["documents"][1]["score"], 0.5);
        assert_eq!(json["user_id"], "alice");
    }

    #[test]
    fn test_older_query_entries_still_load() {
        let json = r#"{"timestamp":"2024-01-01T00:00:00Z","type":"query","query":"q","response_time":0.1,"result_count":0}"#;
        let entry: HistoryEntry = serde_json::from_str(json).unwrap();
        match entry.event {
            RequestEvent::Query {
                response, documents, user_id, ..
            } => {
                assert!(response.is_empty());
                assert!(documents.is_empty());
                assert!(user_id.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_background_writes_settle_on_latest_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let m = MetricsTracker::open(&path).unwrap();
        for i in 0..50 {
            m.log_rag_retrieval(&format!("q{i}"), i);
        }

        let mut on_disk = 0;
        for _ in 0..200 {
            on_disk = MetricsTracker::open(&path).unwrap().summary().rag_retrieval_count;
            if on_disk == 50 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(on_disk, 50);
    }

    #[test]
    fn test_history_entry_json_shape() {
        let entry = HistoryEntry {
            timestamp: Utc::now(),
            event: RequestEvent::FileUpload {
                filename: "a.png".to_string(),
                file_size: 9,
                content_type: "image".to_string(),
            },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "file_upload");
        assert_eq!(json["filename"], "a.png");
        assert!(json.get("timestamp").is_some());
    }
}
