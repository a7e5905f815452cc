//! SQLite-backed file metadata repository

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::StoredFileMeta;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use upload_core::repository::RepositoryResult;
use upload_core::{FileRepository, RepositoryError};

pub struct SqliteFileRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: String,
    filename: String,
    original_name: String,
    size: i64,
    mime_type: String,
    sha256_hash: String,
    uploaded_at: DateTime<Utc>,
    url: String,
}

impl From<FileRow> for StoredFileMeta {
    fn from(row: FileRow) -> Self {
        StoredFileMeta {
            id: row.id,
            filename: row.filename,
            original_name: row.original_name,
            size: row.size.max(0) as u64,
            mime_type: row.mime_type,
            sha256_hash: row.sha256_hash,
            uploaded_at: row.uploaded_at,
            url: row.url,
        }
    }
}

impl SqliteFileRepository {
    /// Connect and run migrations. An in-memory database gets a single
    /// connection, since each connection would otherwise see its own.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        tracing::info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let repository = Self { pool };
        repository.run_migrations().await?;
        Ok(repository)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stored_files (
                filename TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                original_name TEXT NOT NULL,
                size INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                sha256_hash TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                url TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_stored_files_uploaded_at ON stored_files(uploaded_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }
}

fn backend(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(e.to_string())
}

#[async_trait]
impl FileRepository for SqliteFileRepository {
    async fn get(&self, filename: &str) -> RepositoryResult<Option<StoredFileMeta>> {
        let row: Option<FileRow> = sqlx::query_as(
            r#"
            SELECT id, filename, original_name, size, mime_type, sha256_hash, uploaded_at, url
            FROM stored_files
            WHERE filename = ?
            "#,
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(StoredFileMeta::from))
    }

    async fn put(&self, meta: &StoredFileMeta) -> RepositoryResult<()> {
        let size = i64::try_from(meta.size)
            .map_err(|_| RepositoryError::Backend(format!("size {} out of range", meta.size)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO stored_files (filename, id, original_name, size, mime_type, sha256_hash, uploaded_at, url)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&meta.filename)
        .bind(&meta.id)
        .bind(&meta.original_name)
        .bind(size)
        .bind(&meta.mime_type)
        .bind(&meta.sha256_hash)
        .bind(meta.uploaded_at)
        .bind(&meta.url)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RepositoryError::Duplicate(meta.filename.clone()))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn delete(&self, filename: &str) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM stored_files WHERE filename = ?")
            .bind(filename)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> RepositoryResult<Vec<StoredFileMeta>> {
        let rows: Vec<FileRow> = sqlx::query_as(
            r#"
            SELECT id, filename, original_name, size, mime_type, sha256_hash, uploaded_at, url
            FROM stored_files
            ORDER BY uploaded_at DESC, filename DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(StoredFileMeta::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn meta(filename: &str, uploaded_at: DateTime<Utc>) -> StoredFileMeta {
        StoredFileMeta {
            id: filename.trim_end_matches(".pdf").to_string(),
            filename: filename.to_string(),
            original_name: "lease.pdf".to_string(),
            size: 2048,
            mime_type: "application/pdf".to_string(),
            sha256_hash: "ab".repeat(32),
            uploaded_at,
            url: format!("/api/files/{}", filename),
        }
    }

    async fn repository() -> SqliteFileRepository {
        SqliteFileRepository::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let repo = repository().await;
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = meta("1_abc_lease.pdf", at);
        repo.put(&record).await.unwrap();

        assert_eq!(repo.get("1_abc_lease.pdf").await.unwrap(), Some(record));
        assert_eq!(repo.get("missing.pdf").await.unwrap(), None);

        assert!(repo.delete("1_abc_lease.pdf").await.unwrap());
        assert!(!repo.delete("1_abc_lease.pdf").await.unwrap());
        assert_eq!(repo.get("1_abc_lease.pdf").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_records_are_write_once() {
        let repo = repository().await;
        let record = meta("1_abc_lease.pdf", Utc::now());
        repo.put(&record).await.unwrap();
        assert!(matches!(
            repo.put(&record).await,
            Err(RepositoryError::Duplicate(name)) if name == "1_abc_lease.pdf"
        ));
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let repo = repository().await;
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        repo.put(&meta("old.pdf", now - Duration::hours(2))).await.unwrap();
        repo.put(&meta("new.pdf", now)).await.unwrap();
        repo.put(&meta("mid.pdf", now - Duration::hours(1))).await.unwrap();

        let names: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.filename)
            .collect();
        assert_eq!(names, vec!["new.pdf", "mid.pdf", "old.pdf"]);
    }
}
