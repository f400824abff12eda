use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{fail, internal, ApiError};
use crate::models::{ContentRecord, ContentUpdate, FileUploadResponse, ListParams};
use crate::state::AppState;

/// POST /api/v1/upload - multipart `file`; processing continues in the background.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileUploadResponse>, ApiError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| fail(&state, e.status(), format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().trim().to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| fail(&state, e.status(), format!("Failed to read upload: {e}")))?;
        file = Some((filename, mime_type, bytes.to_vec()));
        break;
    }

    let Some((filename, mime_type, bytes)) = file else {
        return Err(fail(&state, StatusCode::BAD_REQUEST, "Missing 'file' field"));
    };
    if filename.is_empty() {
        return Err(fail(&state, StatusCode::BAD_REQUEST, "Filename is required"));
    }
    if bytes.is_empty() {
        return Err(fail(&state, StatusCode::BAD_REQUEST, "Uploaded file is empty"));
    }
    if bytes.len() > state.config.max_file_size {
        return Err(fail(
            &state,
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "File is {} bytes; the limit is {} bytes",
                bytes.len(),
                state.config.max_file_size
            ),
        ));
    }

    let record = crate::ingest::accept_upload(&state, &filename, &mime_type, bytes)
        .await
        .map_err(|e| internal(&state, "Upload failed", e))?;

    state
        .metrics
        .log_file_upload(&record.filename, record.size, record.content_type.as_str());

    Ok(Json(FileUploadResponse {
        file_id: record.id,
        filename: record.filename,
        content_type: record.content_type,
        size: record.size,
        status: record.processing_status,
        upload_time: record.upload_time,
        message: "File uploaded successfully and processing started".to_string(),
    }))
}

/// GET /api/v1/metadata/{file_id}
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<ContentRecord>, ApiError> {
    let id = parse_id(&state, &file_id)?;
    match state.store.get(&id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(fail(&state, StatusCode::NOT_FOUND, "File not found")),
        Err(e) => Err(internal(&state, "Failed to retrieve metadata", e)),
    }
}

/// GET /api/v1/content?limit=&offset= - newest first.
pub async fn list_content(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.limit.clamp(1, 1000);
    let offset = params.offset.max(0);

    let items = state
        .store
        .list(limit, offset)
        .await
        .map_err(|e| internal(&state, "Failed to list content", e))?;
    let total = state
        .store
        .count()
        .await
        .map_err(|e| internal(&state, "Failed to count content", e))?;

    Ok(Json(json!({
        "items": items,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

/// PATCH /api/v1/content/{file_id} - replace tags, merge metadata keys.
pub async fn update_content(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Json(update): Json<ContentUpdate>,
) -> Result<Json<ContentRecord>, ApiError> {
    let id = parse_id(&state, &file_id)?;
    match state.store.update(&id, update).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(fail(&state, StatusCode::NOT_FOUND, "File not found")),
        Err(e) => Err(internal(&state, "Failed to update content", e)),
    }
}

/// DELETE /api/v1/content/{file_id} - record, stored file and index data.
pub async fn delete_content(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&state, &file_id)?;
    match crate::ingest::delete_content(&state, id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(fail(&state, StatusCode::NOT_FOUND, "File not found")),
        Err(e) => Err(internal(&state, "Failed to delete content", e)),
    }
}

// Malformed ids cannot name a stored file
fn parse_id(state: &AppState, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| fail(state, StatusCode::NOT_FOUND, "File not found"))
}
