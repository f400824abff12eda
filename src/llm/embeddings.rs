use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::LlmConfig;

/// Texts are cut to this many characters before embedding; text-embedding-3
/// accepts 8 191 tokens and prose runs about four characters per token.
const MAX_EMBED_CHARS: usize = 8_000;

fn truncate_for_embedding(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Generate embeddings for a batch of texts using the configured provider.
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let truncated: Vec<String> = texts
        .iter()
        .map(|t| truncate_for_embedding(t).to_string())
        .collect();

    match config.provider.as_str() {
        "openai" => embed_remote(client, config, EmbedApi::OpenAi, &truncated).await,
        "ollama" => embed_remote(client, config, EmbedApi::Ollama, &truncated).await,
        "placeholder" => Ok(truncated
            .iter()
            .map(|t| placeholder_embedding(t, config.embedding_dim))
            .collect()),
        other => anyhow::bail!("Unknown LLM provider: {other}"),
    }
}

/// Generate embedding for a single text.
pub async fn embed_single(
    client: &reqwest::Client,
    config: &LlmConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let results = embed_batch(client, config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .context("No embedding returned")
}

// ─── Placeholder ─────────────────────────────────────────

/// Deterministic offline embedding: hashed bag of lowercase words, L2-normalized.
/// Texts sharing words get positive cosine similarity, so retrieval still
/// works without an embedding service.
pub fn placeholder_embedding(text: &str, dim: usize) -> Vec<f32> {
    let dim = dim.max(1);
    let mut v = vec![0.0f32; dim];

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let h = fnv1a(word.to_lowercase().as_bytes());
        let slot = (h % dim as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        v[slot] += sign;
    }

    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

// ─── Remote providers ────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum EmbedApi {
    OpenAi,
    Ollama,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl EmbedApi {
    fn name(self) -> &'static str {
        match self {
            EmbedApi::OpenAi => "OpenAI",
            EmbedApi::Ollama => "Ollama",
        }
    }

    fn url(self, base_url: &str) -> String {
        match self {
            EmbedApi::OpenAi => format!("{base_url}/v1/embeddings"),
            EmbedApi::Ollama => format!("{base_url}/api/embed"),
        }
    }

    fn batch_size(self) -> usize {
        match self {
            EmbedApi::OpenAi => 64,
            EmbedApi::Ollama => 32,
        }
    }

    fn request_body(self, model: &str, texts: &[String]) -> Value {
        match self {
            EmbedApi::OpenAi => json!({ "model": model, "input": texts }),
            EmbedApi::Ollama => json!({ "model": model, "input": texts, "truncate": true }),
        }
    }

    /// Vectors in input order.
    fn parse(self, body: Value) -> Result<Vec<Vec<f32>>> {
        match self {
            EmbedApi::OpenAi => {
                let mut resp: OpenAiEmbedResponse = serde_json::from_value(body)?;
                resp.data.sort_by_key(|d| d.index);
                Ok(resp.data.into_iter().map(|d| d.embedding).collect())
            }
            EmbedApi::Ollama => {
                let resp: OllamaEmbedResponse = serde_json::from_value(body)?;
                Ok(resp.embeddings)
            }
        }
    }
}

async fn embed_remote(
    client: &reqwest::Client,
    config: &LlmConfig,
    api: EmbedApi,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = api.url(&config.base_url);
    let name = api.name();
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(api.batch_size()) {
        let mut req = client
            .post(&url)
            .json(&api.request_body(&config.embedding_model, batch));
        if let Some(key) = config.api_key.as_deref() {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to call {name} embed API"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{name} embed API returned {status}: {body}");
        }

        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("Failed to read {name} embed response"))?;
        let batch_vectors = api
            .parse(body)
            .with_context(|| format!("Unexpected {name} embed response"))?;

        if batch_vectors.len() != batch.len() {
            anyhow::bail!(
                "{name} returned {} embeddings for {} texts",
                batch_vectors.len(),
                batch.len()
            );
        }
        vectors.extend(batch_vectors);
    }

    Ok(vectors)
}
