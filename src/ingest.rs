//! Upload intake and the background processing that makes uploads searchable.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

use crate::extract::extension_of;
use crate::models::{ContentChunk, ContentRecord, ContentType, ProcessingStatus};
use crate::state::AppState;

const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "rtf", "odt", "xls", "xlsx", "md", "csv", "json", "html",
];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

const MAX_STORED_NAME_CHARS: usize = 200;

/// Classify by extension first, then by MIME prefix, defaulting to document.
pub fn detect_content_type(filename: &str, mime_type: &str) -> ContentType {
    let ext = extension_of(filename);
    let ext = ext.as_str();

    if DOCUMENT_EXTENSIONS.contains(&ext) {
        ContentType::Document
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        ContentType::Image
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        ContentType::Audio
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        ContentType::Video
    } else if mime_type.starts_with("image/") {
        ContentType::Image
    } else if mime_type.starts_with("audio/") {
        ContentType::Audio
    } else if mime_type.starts_with("video/") {
        ContentType::Video
    } else {
        ContentType::Document
    }
}

/// Reduce a client-supplied name to a safe final path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STORED_NAME_CHARS)
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Where the bytes of `record` live on disk.
pub fn stored_path(state: &AppState, record: &ContentRecord) -> PathBuf {
    state
        .config
        .upload_dir()
        .join(format!("{}_{}", record.id, sanitize_filename(&record.filename)))
}

/// Persist an upload, record it as pending and start background processing.
pub async fn accept_upload(
    state: &AppState,
    filename: &str,
    mime_type: &str,
    bytes: Vec<u8>,
) -> Result<ContentRecord> {
    let content_type = detect_content_type(filename, mime_type);

    let record = ContentRecord {
        id: Uuid::new_v4(),
        filename: filename.to_string(),
        content_type,
        mime_type: mime_type.to_string(),
        size: bytes.len() as u64,
        upload_time: Utc::now(),
        processing_status: ProcessingStatus::Pending,
        extracted_text: None,
        tags: Vec::new(),
        metadata: serde_json::Map::new(),
    };

    let path = stored_path(state, &record);
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to store upload at {}", path.display()))?;

    if let Err(e) = state.store.insert(&record).await {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e);
    }

    tracing::info!(
        "Accepted upload {} ({}, {} bytes) as {}",
        record.id,
        record.filename,
        record.size,
        record.content_type.as_str()
    );

    let task_state = state.clone();
    let task_record = record.clone();
    tokio::spawn(async move {
        process_upload(task_state, task_record, path).await;
    });

    Ok(record)
}

/// Background pipeline for one upload: extract, chunk, embed, index.
pub async fn process_upload(state: AppState, record: ContentRecord, path: PathBuf) {
    let id = record.id;

    if let Err(e) = state
        .store
        .set_status(&id, ProcessingStatus::Processing)
        .await
    {
        tracing::error!("Failed to mark {id} as processing: {e:#}");
    }

    match run_processing(&state, &record, &path).await {
        Ok(chunk_count) => {
            tracing::info!("Processed upload {id}: {chunk_count} chunks indexed");
        }
        Err(e) => {
            let message = format!("{e:#}");
            tracing::error!("Processing failed for {id}: {message}");

            // Partial index data from a failed run is dropped
            if let Err(e) = remove_index_data(&state, id).await {
                tracing::warn!("Failed to clean index data for {id}: {e:#}");
            }
            if let Err(e) = state.store.mark_failed(&id, &message).await {
                tracing::error!("Failed to mark {id} as failed: {e:#}");
            }
            state.metrics.log_error(
                "processing_failed",
                &message,
                Some(json!({ "file_id": id, "filename": record.filename })),
            );
        }
    }
}

async fn run_processing(
    state: &AppState,
    record: &ContentRecord,
    path: &std::path::Path,
) -> Result<usize> {
    let text = crate::extract::extract_text(
        &state.http_client,
        &state.config,
        path,
        &record.filename,
        record.content_type,
        &record.mime_type,
    )
    .await
    .context("Extraction failed")?;

    let chunks: Vec<ContentChunk> = crate::chunking::chunk_text(&text, state.config.chunk_size)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| ContentChunk {
            file_id: record.id,
            filename: record.filename.clone(),
            content_type: record.content_type,
            chunk_index,
            content,
        })
        .collect();

    if !chunks.is_empty() {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings =
            crate::llm::embeddings::embed_batch(&state.http_client, &state.config.llm, &texts)
                .await
                .context("Embedding failed")?;
        let vectors = state.vectors.clone();
        let to_embed = chunks.clone();
        tokio::task::spawn_blocking(move || vectors.add_chunks(&to_embed, embeddings)).await??;

        let keyword = state.keyword.clone();
        let to_index = chunks.clone();
        tokio::task::spawn_blocking(move || keyword.index_chunks(&to_index)).await??;
    }

    let mut metadata = serde_json::Map::new();
    metadata.insert(
        "extracted_text_length".to_string(),
        json!(text.chars().count()),
    );
    metadata.insert("chunk_count".to_string(), json!(chunks.len()));

    state.store.mark_completed(&record.id, &text, metadata).await?;
    Ok(chunks.len())
}

async fn remove_index_data(state: &AppState, id: Uuid) -> Result<()> {
    let vectors = state.vectors.clone();
    tokio::task::spawn_blocking(move || vectors.delete_file(&id)).await??;
    let keyword = state.keyword.clone();
    tokio::task::spawn_blocking(move || keyword.delete_file(&id)).await??;
    Ok(())
}

/// Remove a record, its stored bytes and its index data. Returns `false`
/// when the id is unknown.
pub async fn delete_content(state: &AppState, id: Uuid) -> Result<bool> {
    let Some(record) = state.store.get(&id).await? else {
        return Ok(false);
    };

    remove_index_data(state, id).await?;

    let path = stored_path(state, &record);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to remove {}", path.display()))
        }
    }

    let deleted = state.store.delete(&id).await?;
    tracing::info!("Deleted content {id} ({})", record.filename);
    Ok(deleted)
}
