use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where uploads, indexes, the metadata database and logs are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Completion + embedding provider configuration
    pub llm: LlmConfig,
    /// Speech-to-text service (Whisper, OpenAI-compatible)
    pub transcription: TranscriptionConfig,
    /// Image captioning service (BLIP-2, Hugging Face inference style)
    pub caption: CaptionConfig,
    /// Text recognition for images (external tesseract-compatible command)
    pub ocr: OcrConfig,
    /// Static thresholds that raise evaluation alerts
    pub thresholds: EvaluationThresholds,
    /// Maximum accepted upload size in bytes
    pub max_file_size: usize,
    /// Character budget per text chunk
    pub chunk_size: usize,
    /// Character budget for the RAG context block
    pub context_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai", "ollama", or "placeholder" (no network, deterministic vectors)
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for completions
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Base URL of an OpenAI-compatible `/v1/audio/transcriptions` API.
    /// Falls back to the LLM base URL when unset.
    pub base_url: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    /// Full URL of the captioning model endpoint. Captioning is disabled when None.
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub enabled: bool,
    /// Invoked as `<command> <image> stdout -l <language>`
    pub command: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvaluationThresholds {
    pub min_precision: f64,
    pub min_recall: f64,
    pub max_hallucination: f64,
    pub min_confidence: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            llm: LlmConfig::default(),
            transcription: TranscriptionConfig::default(),
            caption: CaptionConfig::default(),
            ocr: OcrConfig::default(),
            thresholds: EvaluationThresholds::default(),
            max_file_size: 50 * 1024 * 1024,
            chunk_size: 512,
            context_window: 2000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com".to_string(),
            chat_model: "gpt-4-turbo".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_key: None,
            embedding_dim: 1536,
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "whisper-1".to_string(),
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "Salesforce/blip2-opt-2.7b".to_string(),
            api_key: None,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "tesseract".to_string(),
            language: "eng".to_string(),
        }
    }
}

impl Default for EvaluationThresholds {
    fn default() -> Self {
        Self {
            min_precision: 0.5,
            min_recall: 0.3,
            max_hallucination: 0.5,
            min_confidence: 0.5,
        }
    }
}

impl Config {
    /// Build the configuration from process environment (after loading `.env`).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Unparseable
    /// numeric values keep their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = get("CONTENT_ANALYTICS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = get("CONTENT_ANALYTICS_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(v) = get("CONTENT_ANALYTICS_MAX_FILE_SIZE").and_then(|v| v.parse().ok()) {
            config.max_file_size = v;
        }
        if let Some(v) = get("CONTENT_ANALYTICS_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            config.chunk_size = v;
        }
        if let Some(v) = get("CONTENT_ANALYTICS_CONTEXT_WINDOW").and_then(|v| v.parse().ok()) {
            config.context_window = v;
        }

        match get("LLM_PROVIDER") {
            Some(provider) => config.llm.provider = provider,
            // No provider chosen and no key to reach the default one
            None if get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")).is_none() => {
                config.llm.provider = "placeholder".to_string();
            }
            None => {}
        }
        if let Some(url) = get("LLM_BASE_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Some(model) = get("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        config.llm.api_key = get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY"));
        if let Some(v) = get("LLM_EMBEDDING_DIM").and_then(|v| v.parse().ok()) {
            config.llm.embedding_dim = v;
        }
        if let Some(v) = get("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            config.llm.max_tokens = v;
        }
        if let Some(v) = get("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            config.llm.temperature = v;
        }

        if let Some(url) = get("TRANSCRIPTION_BASE_URL") {
            config.transcription.base_url = Some(url.trim_end_matches('/').to_string());
        }
        if let Some(model) = get("TRANSCRIPTION_MODEL") {
            config.transcription.model = model;
        }

        if let Some(url) = get("CAPTION_BASE_URL") {
            config.caption.base_url = Some(url);
        }
        if let Some(model) = get("CAPTION_MODEL") {
            config.caption.model = model;
        }
        config.caption.api_key = get("CAPTION_API_KEY");

        if let Some(v) = get("OCR_ENABLED").and_then(|v| v.parse().ok()) {
            config.ocr.enabled = v;
        }
        if let Some(command) = get("OCR_COMMAND") {
            config.ocr.command = command;
        }
        if let Some(language) = get("OCR_LANGUAGE") {
            config.ocr.language = language;
        }

        if let Some(v) = get("EVAL_MIN_PRECISION").and_then(|v| v.parse().ok()) {
            config.thresholds.min_precision = v;
        }
        if let Some(v) = get("EVAL_MIN_RECALL").and_then(|v| v.parse().ok()) {
            config.thresholds.min_recall = v;
        }
        if let Some(v) = get("EVAL_MAX_HALLUCINATION").and_then(|v| v.parse().ok()) {
            config.thresholds.max_hallucination = v;
        }
        if let Some(v) = get("EVAL_MIN_CONFIDENCE").and_then(|v| v.parse().ok()) {
            config.thresholds.min_confidence = v;
        }

        config
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("content.db")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.log_dir().join("metrics.json")
    }

    pub fn evaluation_log_path(&self) -> PathBuf {
        self.log_dir().join("evaluations.jsonl")
    }
}
