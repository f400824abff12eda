//! SQLite-backed metadata store for uploaded content.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{ContentRecord, ContentType, ContentUpdate, ProcessingStatus};

pub struct ContentStore {
    pool: SqlitePool,
}

impl ContentStore {
    /// Open (creating if missing) the database at `db_path` and run migrations.
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open {}", db_path.display()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                content_type TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                upload_time TEXT NOT NULL,
                processing_status TEXT NOT NULL,
                extracted_text TEXT,
                tags_json TEXT NOT NULL DEFAULT '[]',
                metadata_json TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_upload_time ON content(upload_time)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn insert(&self, record: &ContentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content (id, filename, content_type, mime_type, size, upload_time,
                                 processing_status, extracted_text, tags_json, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.filename)
        .bind(record.content_type.as_str())
        .bind(&record.mime_type)
        .bind(record.size as i64)
        .bind(format_time(&record.upload_time))
        .bind(record.processing_status.as_str())
        .bind(&record.extracted_text)
        .bind(serde_json::to_string(&record.tags)?)
        .bind(serde_json::to_string(&record.metadata)?)
        .execute(&self.pool)
        .await
        .context("Failed to insert content record")?;
        Ok(())
    }

    pub async fn get(&self, id: &Uuid) -> Result<Option<ContentRecord>> {
        let row = sqlx::query("SELECT * FROM content WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| record_from_row(&r)).transpose()
    }

    /// Newest first.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<ContentRecord>> {
        let rows = sqlx::query("SELECT * FROM content ORDER BY upload_time DESC LIMIT ? OFFSET ?")
            .bind(limit.max(0))
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn set_status(&self, id: &Uuid, status: ProcessingStatus) -> Result<()> {
        sqlx::query("UPDATE content SET processing_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark processing finished, storing the extracted text and merging
    /// `metadata` into the record's metadata.
    pub async fn mark_completed(
        &self,
        id: &Uuid,
        extracted_text: &str,
        metadata: Map<String, Value>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE content SET processing_status = ?, extracted_text = ?, \
             metadata_json = json_patch(metadata_json, ?) WHERE id = ?",
        )
        .bind(ProcessingStatus::Completed.as_str())
        .bind(extracted_text)
        .bind(serde_json::to_string(&metadata)?)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Content {id} no longer exists");
        }
        Ok(())
    }

    /// Mark processing failed with `metadata.error`. Unknown ids are ignored.
    pub async fn mark_failed(&self, id: &Uuid, error: &str) -> Result<()> {
        let patch = serde_json::json!({ "error": error });
        sqlx::query(
            "UPDATE content SET processing_status = ?, \
             metadata_json = json_patch(metadata_json, ?) WHERE id = ?",
        )
        .bind(ProcessingStatus::Failed.as_str())
        .bind(patch.to_string())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace tags and apply `metadata` as a JSON merge patch (RFC 7396):
    /// keys are set, `null` removes a key, nested objects merge. Returns the
    /// updated record, or `None` when the id is unknown.
    pub async fn update(&self, id: &Uuid, update: ContentUpdate) -> Result<Option<ContentRecord>> {
        let tags_json = update.tags.as_ref().map(serde_json::to_string).transpose()?;
        let patch = serde_json::to_string(&update.metadata.unwrap_or_default())?;

        let result = sqlx::query(
            "UPDATE content SET tags_json = COALESCE(?, tags_json), \
             metadata_json = json_patch(metadata_json, ?) WHERE id = ?",
        )
        .bind(tags_json)
        .bind(patch)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    /// Returns whether a row was deleted.
    pub async fn delete(&self, id: &Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM content WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// Fixed-width UTC timestamps so ORDER BY on the text column is chronological
fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn record_from_row(row: &SqliteRow) -> Result<ContentRecord> {
    let id: String = row.get("id");
    let content_type: String = row.get("content_type");
    let status: String = row.get("processing_status");
    let upload_time: String = row.get("upload_time");
    let size: i64 = row.get("size");
    let tags_json: String = row.get("tags_json");
    let metadata_json: String = row.get("metadata_json");

    Ok(ContentRecord {
        id: Uuid::parse_str(&id).with_context(|| format!("Bad content id '{id}'"))?,
        filename: row.get("filename"),
        content_type: ContentType::parse(&content_type)
            .with_context(|| format!("Bad content type '{content_type}'"))?,
        mime_type: row.get("mime_type"),
        size: size.max(0) as u64,
        upload_time: DateTime::parse_from_rfc3339(&upload_time)
            .with_context(|| format!("Bad upload time '{upload_time}'"))?
            .with_timezone(&Utc),
        processing_status: ProcessingStatus::parse(&status)
            .with_context(|| format!("Bad processing status '{status}'"))?,
        extracted_text: row.get("extracted_text"),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(filename: &str, upload_time: DateTime<Utc>) -> ContentRecord {
        ContentRecord {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            content_type: ContentType::Document,
            mime_type: "text/plain".to_string(),
            size: 42,
            upload_time,
            processing_status: ProcessingStatus::Pending,
            extracted_text: None,
            tags: vec![],
            metadata: Map::new(),
        }
    }

    async fn open() -> (tempfile::TempDir, ContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::connect(&dir.path().join("content.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (_dir, store) = open().await;
        let rec = record("a.txt", Utc::now());
        store.insert(&rec).await.unwrap();

        let got = store.get(&rec.id).await.unwrap().unwrap();
        assert_eq!(got.filename, "a.txt");
        assert_eq!(got.size, 42);
        assert_eq!(got.processing_status, ProcessingStatus::Pending);
        assert!(store.get(&Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_paging() {
        let (_dir, store) = open().await;
        let base = Utc::now();
        for i in 0..3 {
            let rec = record(&format!("f{i}.txt"), base + chrono::Duration::seconds(i));
            store.insert(&rec).await.unwrap();
        }

        let all = store.list(100, 0).await.unwrap();
        let names: Vec<_> = all.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["f2.txt", "f1.txt", "f0.txt"]);

        let page = store.list(1, 1).await.unwrap();
        assert_eq!(page[0].filename, "f1.txt");
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let (_dir, store) = open().await;
        let rec = record("b.txt", Utc::now());
        store.insert(&rec).await.unwrap();

        store
            .set_status(&rec.id, ProcessingStatus::Processing)
            .await
            .unwrap();
        let mut meta = Map::new();
        meta.insert("chunk_count".to_string(), json!(2));
        store.mark_completed(&rec.id, "hello", meta).await.unwrap();

        let got = store.get(&rec.id).await.unwrap().unwrap();
        assert_eq!(got.processing_status, ProcessingStatus::Completed);
        assert_eq!(got.extracted_text.as_deref(), Some("hello"));
        assert_eq!(got.metadata["chunk_count"], json!(2));
    }

    #[tokio::test]
    async fn test_mark_failed_records_error() {
        let (_dir, store) = open().await;
        let rec = record("c.bin", Utc::now());
        store.insert(&rec).await.unwrap();

        store.mark_failed(&rec.id, "boom").await.unwrap();
        let got = store.get(&rec.id).await.unwrap().unwrap();
        assert_eq!(got.processing_status, ProcessingStatus::Failed);
        assert_eq!(got.metadata["error"], json!("boom"));
    }

    #[tokio::test]
    async fn test_update_merges_metadata_and_replaces_tags() {
        let (_dir, store) = open().await;
        let mut rec = record("d.txt", Utc::now());
        rec.metadata.insert("source".to_string(), json!("scanner"));
        store.insert(&rec).await.unwrap();

        let mut extra = Map::new();
        extra.insert("owner".to_string(), json!("ops"));
        let updated = store
            .update(
                &rec.id,
                ContentUpdate {
                    tags: Some(vec!["invoice".to_string()]),
                    metadata: Some(extra),
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.tags, vec!["invoice"]);
        assert_eq!(updated.metadata["source"], json!("scanner"));
        assert_eq!(updated.metadata["owner"], json!("ops"));

        let missing = store
            .update(
                &Uuid::new_v4(),
                ContentUpdate {
                    tags: None,
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_null_removes_key() {
        let (_dir, store) = open().await;
        let mut rec = record("g.txt", Utc::now());
        rec.metadata.insert("draft".to_string(), json!(true));
        rec.metadata.insert("owner".to_string(), json!("ops"));
        store.insert(&rec).await.unwrap();

        let mut patch = Map::new();
        patch.insert("draft".to_string(), Value::Null);
        let updated = store
            .update(
                &rec.id,
                ContentUpdate {
                    tags: None,
                    metadata: Some(patch),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(updated.metadata.get("draft").is_none());
        assert_eq!(updated.metadata["owner"], json!("ops"));
    }

    #[tokio::test]
    async fn test_concurrent_updates_and_completion_all_land() {
        let (_dir, store) = open().await;
        let store = std::sync::Arc::new(store);
        let rec = record("h.txt", Utc::now());
        store.insert(&rec).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let id = rec.id;
            tasks.push(tokio::spawn(async move {
                let mut extra = Map::new();
                extra.insert(format!("k{i}"), json!(i));
                store
                    .update(
                        &id,
                        ContentUpdate {
                            tags: None,
                            metadata: Some(extra),
                        },
                    )
                    .await
                    .map(|_| ())
            }));
        }
        let completer = {
            let store = store.clone();
            let id = rec.id;
            tokio::spawn(async move {
                let mut meta = Map::new();
                meta.insert("chunk_count".to_string(), json!(3));
                store.mark_completed(&id, "done", meta).await
            })
        };

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        completer.await.unwrap().unwrap();

        let got = store.get(&rec.id).await.unwrap().unwrap();
        assert_eq!(got.processing_status, ProcessingStatus::Completed);
        assert_eq!(got.metadata["chunk_count"], json!(3));
        for i in 0..16 {
            assert_eq!(got.metadata[&format!("k{i}")], json!(i));
        }
    }

    #[tokio::test]
    async fn test_mark_completed_unknown_id_errors() {
        let (_dir, store) = open().await;
        assert!(store
            .mark_completed(&Uuid::new_v4(), "text", Map::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, store) = open().await;
        let rec = record("e.txt", Utc::now());
        store.insert(&rec).await.unwrap();
        assert!(store.delete(&rec.id).await.unwrap());
        assert!(!store.delete(&rec.id).await.unwrap());
    }
}
