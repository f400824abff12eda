use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::hallucination::HallucinationMetrics;
use super::relevance::RelevanceMetrics;
use crate::config::EvaluationThresholds;
use crate::stats::Distribution;

pub const ALERT_LIMIT: usize = 100;

/// One evaluated query/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: String,
    #[serde(default)]
    pub query_id: Option<String>,
    pub query: String,
    pub response: String,
    pub retrieved_doc_count: usize,
    pub rag_metrics: RelevanceMetrics,
    pub hallucination_metrics: HallucinationMetrics,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// A threshold breach raised when a record is logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub evaluation_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub total_evaluations: usize,
    pub precision: Distribution,
    pub recall: Distribution,
    pub f1_score: Distribution,
    pub mrr: Distribution,
    pub ndcg: Distribution,
    pub hallucination_score: Distribution,
    pub confidence: Distribution,
    pub factuality_score: Distribution,
}

/// Append-only evaluation log backed by a JSON Lines file.
pub struct EvaluationLog {
    records: RwLock<Vec<EvaluationRecord>>,
    alerts: Mutex<VecDeque<Alert>>,
    thresholds: EvaluationThresholds,
    // Serializes appends so file order matches in-memory order
    file: Mutex<Option<PathBuf>>,
}

impl EvaluationLog {
    /// Reload records from `path`, skipping lines that do not parse.
    pub fn open(path: &Path, thresholds: EvaluationThresholds) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut records = Vec::new();
        match std::fs::read_to_string(path) {
            Ok(data) => {
                for (lineno, line) in data.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<EvaluationRecord>(line) {
                        Ok(r) => records.push(r),
                        Err(e) => tracing::warn!(
                            "Skipping malformed evaluation record at {}:{}: {e}",
                            path.display(),
                            lineno + 1
                        ),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        }

        tracing::info!("Loaded {} evaluation records", records.len());

        Ok(Self {
            records: RwLock::new(records),
            alerts: Mutex::new(VecDeque::new()),
            thresholds,
            file: Mutex::new(Some(path.to_path_buf())),
        })
    }

    pub fn in_memory(thresholds: EvaluationThresholds) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            alerts: Mutex::new(VecDeque::new()),
            thresholds,
            file: Mutex::new(None),
        }
    }

    /// Persist and keep `record`, returning the alerts it raised.
    pub fn append(&self, record: EvaluationRecord) -> Result<Vec<Alert>> {
        let file = self.file.lock();
        if let Some(path) = file.as_ref() {
            let line = serde_json::to_string(&record)?;
            let mut f = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            writeln!(f, "{line}").context("Failed to append evaluation record")?;
        }

        let raised = check_thresholds(&record, &self.thresholds);
        if !raised.is_empty() {
            let mut alerts = self.alerts.lock();
            for alert in &raised {
                tracing::warn!(
                    evaluation_id = %alert.evaluation_id,
                    metric = %alert.metric,
                    value = alert.value,
                    threshold = alert.threshold,
                    "Evaluation threshold breached"
                );
                alerts.push_back(alert.clone());
            }
            while alerts.len() > ALERT_LIMIT {
                alerts.pop_front();
            }
        }

        self.records.write().push(record);
        Ok(raised)
    }

    pub fn records(&self) -> Vec<EvaluationRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().iter().cloned().collect()
    }

    pub fn summary(&self) -> EvaluationSummary {
        let records = self.records.read();
        let dist = |f: fn(&EvaluationRecord) -> f64| Distribution::from_values(records.iter().map(f));

        EvaluationSummary {
            total_evaluations: records.len(),
            precision: dist(|r| r.rag_metrics.precision),
            recall: dist(|r| r.rag_metrics.recall),
            f1_score: dist(|r| r.rag_metrics.f1_score),
            mrr: dist(|r| r.rag_metrics.mrr),
            ndcg: dist(|r| r.rag_metrics.ndcg),
            hallucination_score: dist(|r| r.hallucination_metrics.hallucination_score),
            confidence: dist(|r| r.hallucination_metrics.confidence),
            factuality_score: dist(|r| r.hallucination_metrics.factuality_score),
        }
    }

    /// Drop all records and alerts, truncating the backing file.
    pub fn reset(&self) -> Result<()> {
        let file = self.file.lock();
        if let Some(path) = file.as_ref() {
            std::fs::write(path, b"")
                .with_context(|| format!("Failed to truncate {}", path.display()))?;
        }
        self.records.write().clear();
        self.alerts.lock().clear();
        tracing::info!("Evaluation log reset");
        Ok(())
    }
}

fn check_thresholds(record: &EvaluationRecord, t: &EvaluationThresholds) -> Vec<Alert> {
    let rag = &record.rag_metrics;
    let hal = &record.hallucination_metrics;

    // (metric, value, threshold, breached)
    let checks = [
        ("precision", rag.precision, t.min_precision, rag.precision < t.min_precision),
        ("recall", rag.recall, t.min_recall, rag.recall < t.min_recall),
        (
            "hallucination_score",
            hal.hallucination_score,
            t.max_hallucination,
            hal.hallucination_score > t.max_hallucination,
        ),
        ("confidence", hal.confidence, t.min_confidence, hal.confidence < t.min_confidence),
    ];

    checks
        .into_iter()
        .filter(|(_, _, _, breached)| *breached)
        .map(|(metric, value, threshold, _)| Alert {
            metric: metric.to_string(),
            value,
            threshold,
            evaluation_id: record.id.clone(),
            timestamp: Utc::now(),
        })
        .collect()
}
