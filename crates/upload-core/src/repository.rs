//! Typed metadata repository for stored files.
//!
//! The upload and signing pipeline only sees [`FileRepository`]; the server
//! plugs in a SQLite implementation, tests use [`InMemoryFileRepository`].

use std::collections::HashMap;

use async_trait::async_trait;
use shared_types::StoredFileMeta;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("File record already exists: {0}")]
    Duplicate(String),

    #[error("Repository backend error: {0}")]
    Backend(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Look up a record by its stored (unique) filename
    async fn get(&self, filename: &str) -> RepositoryResult<Option<StoredFileMeta>>;

    /// Insert a new record. Records are immutable once written.
    async fn put(&self, meta: &StoredFileMeta) -> RepositoryResult<()>;

    /// Drop a record; `false` when there was none
    async fn delete(&self, filename: &str) -> RepositoryResult<bool>;

    /// All records, newest first
    async fn list(&self) -> RepositoryResult<Vec<StoredFileMeta>>;
}

#[derive(Debug, Default)]
pub struct InMemoryFileRepository {
    records: RwLock<HashMap<String, StoredFileMeta>>,
}

impl InMemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileRepository for InMemoryFileRepository {
    async fn get(&self, filename: &str) -> RepositoryResult<Option<StoredFileMeta>> {
        Ok(self.records.read().await.get(filename).cloned())
    }

    async fn put(&self, meta: &StoredFileMeta) -> RepositoryResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&meta.filename) {
            return Err(RepositoryError::Duplicate(meta.filename.clone()));
        }
        records.insert(meta.filename.clone(), meta.clone());
        Ok(())
    }

    async fn delete(&self, filename: &str) -> RepositoryResult<bool> {
        Ok(self.records.write().await.remove(filename).is_some())
    }

    async fn list(&self) -> RepositoryResult<Vec<StoredFileMeta>> {
        let mut all: Vec<_> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(all)
    }
}
