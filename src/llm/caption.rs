//! Image captioning and visual question answering against a hosted BLIP-2
//! endpoint in the Hugging Face inference style.

use anyhow::{Context, Result};
use base64::Engine;
use serde::Serialize;

use crate::config::CaptionConfig;

#[derive(Serialize)]
struct PromptedRequest<'a> {
    inputs: PromptedInputs<'a>,
}

#[derive(Serialize)]
struct PromptedInputs<'a> {
    image: String,
    text: &'a str,
}

/// Caption an image. With a `prompt` (a question or a text prefix) the
/// model conditions its output on it.
pub async fn caption_image(
    client: &reqwest::Client,
    config: &CaptionConfig,
    mime_type: &str,
    bytes: Vec<u8>,
    prompt: Option<&str>,
) -> Result<String> {
    let url = config
        .base_url
        .as_deref()
        .context("Captioning service not configured (set CAPTION_BASE_URL)")?;

    let mut req = client.post(url);
    if let Some(key) = config.api_key.as_deref() {
        req = req.bearer_auth(key);
    }

    let req = match prompt.map(str::trim).filter(|p| !p.is_empty()) {
        Some(text) => req.json(&PromptedRequest {
            inputs: PromptedInputs {
                image: base64::engine::general_purpose::STANDARD.encode(&bytes),
                text,
            },
        }),
        None => req.header("Content-Type", mime_type).body(bytes),
    };

    let resp = req
        .send()
        .await
        .context("Failed to call captioning service")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Captioning service returned {status}: {body}");
    }

    let body: serde_json::Value = resp
        .json()
        .await
        .context("Failed to parse captioning response")?;

    parse_generated_text(&body).context("Captioning response had no generated text")
}

/// Accepts `[{"generated_text": ..}]`, `{"generated_text": ..}` and the VQA
/// shape `[{"answer": ..}]`.
fn parse_generated_text(body: &serde_json::Value) -> Option<String> {
    let first = match body {
        serde_json::Value::Array(items) => items.first()?,
        other => other,
    };
    first
        .get("generated_text")
        .or_else(|| first.get("answer"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
}
