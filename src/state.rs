use std::sync::Arc;

use crate::config::Config;
use crate::evaluation::log::EvaluationLog;
use crate::search::keyword::KeywordIndex;
use crate::search::vector::VectorStore;
use crate::store::ContentStore;
use crate::telemetry::metrics::MetricsTracker;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<ContentStore>,
    pub keyword: Arc<KeywordIndex>,
    pub vectors: Arc<VectorStore>,
    pub evaluations: Arc<EvaluationLog>,
    pub metrics: Arc<MetricsTracker>,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Ensure data directories exist
        std::fs::create_dir_all(config.upload_dir())?;
        std::fs::create_dir_all(config.index_dir())?;
        std::fs::create_dir_all(config.vector_dir())?;
        std::fs::create_dir_all(config.log_dir())?;

        let store = ContentStore::connect(&config.db_path()).await?;
        let keyword = KeywordIndex::open_or_create(&config.index_dir())?;
        let vectors = VectorStore::open_or_create(&config.vector_dir())?;
        let evaluations = EvaluationLog::open(&config.evaluation_log_path(), config.thresholds)?;
        let metrics = MetricsTracker::open(&config.metrics_path())?;

        tracing::info!(
            "Loaded {} vectors, {} keyword documents",
            vectors.entry_count(),
            keyword.num_docs()
        );

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            keyword: Arc::new(keyword),
            vectors: Arc::new(vectors),
            evaluations: Arc::new(evaluations),
            metrics: Arc::new(metrics),
            http_client: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
        })
    }
}
