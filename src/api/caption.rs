use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{fail, ApiError};
use crate::state::AppState;

const DESCRIBE_PROMPT: &str =
    "Describe this image in detail. Mention objects, colors, composition, and any text present.";

#[derive(Serialize)]
pub struct CaptionResponse {
    pub file_id: Uuid,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub caption: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct QuestionResponse {
    pub file_id: Uuid,
    pub filename: String,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

struct ImageForm {
    filename: String,
    mime_type: String,
    bytes: Vec<u8>,
    text: Option<String>,
}

/// Read an image part named `file` and an optional text part named `text_field`.
async fn read_image_form(
    state: &AppState,
    mut multipart: Multipart,
    text_field: &str,
) -> Result<ImageForm, ApiError> {
    let mut image: Option<(String, String, Vec<u8>)> = None;
    let mut text = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| fail(state, e.status(), format!("Invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("image").to_string();
                let mime_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| fail(state, e.status(), format!("Failed to read image: {e}")))?;
                image = Some((filename, mime_type, bytes.to_vec()));
            }
            Some(name) if name == text_field => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| fail(state, e.status(), format!("Invalid '{text_field}': {e}")))?;
                let value = value.trim().to_string();
                if !value.is_empty() {
                    text = Some(value);
                }
            }
            _ => {}
        }
    }

    let Some((filename, mime_type, bytes)) = image else {
        return Err(fail(state, StatusCode::BAD_REQUEST, "Missing 'file' field"));
    };
    if !mime_type.starts_with("image/") {
        return Err(fail(state, StatusCode::BAD_REQUEST, "File must be an image"));
    }
    if bytes.is_empty() {
        return Err(fail(state, StatusCode::BAD_REQUEST, "Uploaded image is empty"));
    }
    if bytes.len() > state.config.max_file_size {
        return Err(fail(
            state,
            StatusCode::PAYLOAD_TOO_LARGE,
            "Image exceeds the upload size limit",
        ));
    }

    Ok(ImageForm {
        filename,
        mime_type,
        bytes,
        text,
    })
}

async fn run_caption(
    state: &AppState,
    form: ImageForm,
    prompt: Option<String>,
) -> Result<CaptionResponse, ApiError> {
    let caption = crate::llm::caption::caption_image(
        &state.http_client,
        &state.config.caption,
        &form.mime_type,
        form.bytes,
        prompt.as_deref(),
    )
    .await
    .map_err(|e| fail(state, StatusCode::BAD_GATEWAY, format!("Caption generation failed: {e:#}")))?;

    Ok(CaptionResponse {
        file_id: Uuid::new_v4(),
        filename: form.filename,
        prompt,
        caption,
        timestamp: Utc::now(),
    })
}

/// POST /api/v1/blip2/image/caption - multipart `file`, optional `prompt`.
pub async fn caption(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CaptionResponse>, ApiError> {
    let mut form = read_image_form(&state, multipart, "prompt").await?;
    let prompt = form.text.take();
    Ok(Json(run_caption(&state, form, prompt).await?))
}

/// POST /api/v1/blip2/image/describe - multipart `file`; a detailed caption.
pub async fn describe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CaptionResponse>, ApiError> {
    let form = read_image_form(&state, multipart, "prompt").await?;
    Ok(Json(
        run_caption(&state, form, Some(DESCRIBE_PROMPT.to_string())).await?,
    ))
}

/// POST /api/v1/blip2/image/question - multipart `file` and `question`.
pub async fn question(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<QuestionResponse>, ApiError> {
    let mut form = read_image_form(&state, multipart, "question").await?;
    let Some(question) = form.text.take() else {
        return Err(fail(&state, StatusCode::BAD_REQUEST, "Question is required"));
    };

    let prompt = format!("Question: {question} Answer:");
    let answer = run_caption(&state, form, Some(prompt)).await?;

    Ok(Json(QuestionResponse {
        file_id: answer.file_id,
        filename: answer.filename,
        question,
        answer: answer.caption,
        timestamp: answer.timestamp,
    }))
}
