use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::LlmConfig;

/// Send one system + user exchange to the configured completion API and
/// return the assistant text, trimmed.
pub async fn complete(
    client: &reqwest::Client,
    config: &LlmConfig,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<String> {
    let content = match config.provider.as_str() {
        "openai" => call_chat(client, config, ChatApi::OpenAi, system_prompt, user_prompt).await?,
        "ollama" => call_chat(client, config, ChatApi::Ollama, system_prompt, user_prompt).await?,
        "placeholder" => extractive_answer(user_prompt),
        other => anyhow::bail!("Unknown LLM provider: {other}"),
    };

    Ok(content.trim().to_string())
}

/// Offline stand-in for a completion: echoes the first retrieved document
/// found in the prompt so the pipeline stays usable without an API key.
/// The document runs up to the next document marker or the question.
fn extractive_answer(user_prompt: &str) -> String {
    const FIRST: &str = "\nDocument 1: ";

    let first_doc = user_prompt.find(FIRST).and_then(|start| {
        let rest = &user_prompt[start + FIRST.len()..];
        let end = ["\nDocument 2: ", "\n\nQuestion: "]
            .iter()
            .filter_map(|marker| rest.find(marker))
            .min()
            .unwrap_or(rest.len());
        Some(rest[..end].trim()).filter(|s| !s.is_empty())
    });

    match first_doc {
        Some(doc) => doc.to_string(),
        None => "No relevant documents found.".to_string(),
    }
}

// ─── Remote providers ────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum ChatApi {
    OpenAi,
    Ollama,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

impl ChatApi {
    fn name(self) -> &'static str {
        match self {
            ChatApi::OpenAi => "OpenAI",
            ChatApi::Ollama => "Ollama",
        }
    }

    fn url(self, base_url: &str) -> String {
        match self {
            ChatApi::OpenAi => format!("{base_url}/v1/chat/completions"),
            ChatApi::Ollama => format!("{base_url}/api/chat"),
        }
    }

    fn request_body(self, config: &LlmConfig, system_prompt: &str, user_prompt: &str) -> Value {
        let messages = json!([
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_prompt },
        ]);
        match self {
            ChatApi::OpenAi => json!({
                "model": config.chat_model,
                "messages": messages,
                "temperature": config.temperature,
                "max_tokens": config.max_tokens,
            }),
            ChatApi::Ollama => json!({
                "model": config.chat_model,
                "messages": messages,
                "stream": false,
                "options": {
                    "temperature": config.temperature,
                    "num_predict": config.max_tokens,
                },
            }),
        }
    }

    /// Assistant text; a reply without content is empty.
    fn parse(self, body: Value) -> Result<String> {
        let message = match self {
            ChatApi::OpenAi => {
                let resp: OpenAiChatResponse = serde_json::from_value(body)?;
                resp.choices.into_iter().next().map(|c| c.message)
            }
            ChatApi::Ollama => {
                let resp: OllamaChatResponse = serde_json::from_value(body)?;
                Some(resp.message)
            }
        };
        Ok(message.and_then(|m| m.content).unwrap_or_default())
    }
}

async fn call_chat(
    client: &reqwest::Client,
    config: &LlmConfig,
    api: ChatApi,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<String> {
    let name = api.name();
    let mut req = client
        .post(api.url(&config.base_url))
        .json(&api.request_body(config, system_prompt, user_prompt));
    if let Some(key) = config.api_key.as_deref() {
        req = req.bearer_auth(key);
    }

    let resp = req
        .send()
        .await
        .with_context(|| format!("Failed to call {name} chat API"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("{name} chat API returned {status}: {body}");
    }

    let body: Value = resp
        .json()
        .await
        .with_context(|| format!("Failed to read {name} chat response"))?;
    api.parse(body)
        .with_context(|| format!("Unexpected {name} chat response"))
}
