use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::{LlmConfig, TranscriptionConfig};

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribe an audio or video file through an OpenAI-compatible
/// `/v1/audio/transcriptions` endpoint (Whisper).
pub async fn transcribe(
    client: &reqwest::Client,
    config: &TranscriptionConfig,
    llm: &LlmConfig,
    filename: &str,
    mime_type: &str,
    bytes: Vec<u8>,
) -> Result<String> {
    let url = format!("{}/v1/audio/transcriptions", endpoint_base(config, llm)?);

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(filename.to_string())
        .mime_str(mime_type)
        .context("Invalid MIME type for transcription upload")?;
    let form = reqwest::multipart::Form::new()
        .text("model", config.model.clone())
        .text("response_format", "json")
        .part("file", part);

    let mut req = client.post(&url).multipart(form);
    if let Some(key) = llm.api_key.as_deref() {
        req = req.bearer_auth(key);
    }

    let resp = req
        .send()
        .await
        .context("Failed to call transcription API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Transcription API returned {status}: {body}");
    }

    let body: TranscriptionResponse = resp
        .json()
        .await
        .context("Failed to parse transcription response")?;

    tracing::debug!("Transcribed {filename}: {} chars", body.text.len());
    Ok(body.text.trim().to_string())
}

/// The transcription endpoint, else the LLM endpoint. The placeholder
/// provider has no server to fall back on.
fn endpoint_base<'a>(config: &'a TranscriptionConfig, llm: &'a LlmConfig) -> Result<&'a str> {
    match config.base_url.as_deref() {
        Some(url) => Ok(url),
        None if llm.provider == "placeholder" => {
            anyhow::bail!("Transcription service not configured (set TRANSCRIPTION_BASE_URL)")
        }
        None => Ok(&llm.base_url),
    }
}
