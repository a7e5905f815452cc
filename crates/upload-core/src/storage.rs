//! Server-side persistence of accepted uploads.
//!
//! Every stored file gets a name of the form
//! `{unix_millis}_{token}_{sanitized_original}`; the timestamp plus random
//! token keeps concurrent writers from colliding without any locking.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{stream, Stream, StreamExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use shared_types::StoredFileMeta;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::repository::{FileRepository, RepositoryError};
use crate::validator::{is_dangerous_file_name, FileCandidate, FileValidator, ValidationError};

/// Payloads above this size are written chunk by chunk
pub const STREAMING_THRESHOLD: u64 = 5 * 1024 * 1024;

const WRITE_CHUNK_SIZE: usize = 256 * 1024;
const TOKEN_LEN: usize = 13;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Upload stream failed: {0}")]
    Stream(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl StorageError {
    /// Caller-caused failures map to 400, everything else to 500
    pub fn is_client_error(&self) -> bool {
        matches!(self, StorageError::Validation(_) | StorageError::NotFound(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

pub struct StorageWriter {
    root: PathBuf,
    public_base: String,
    validator: FileValidator,
    repository: Arc<dyn FileRepository>,
}

impl StorageWriter {
    /// Create the storage root if needed.
    pub async fn new(
        root: impl Into<PathBuf>,
        public_base: impl Into<String>,
        validator: FileValidator,
        repository: Arc<dyn FileRepository>,
    ) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|source| StorageError::Io {
            path: root.clone(),
            source,
        })?;

        Ok(Self {
            root,
            public_base: public_base.into(),
            validator,
            repository,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn validator(&self) -> &FileValidator {
        &self.validator
    }

    pub fn repository(&self) -> &Arc<dyn FileRepository> {
        &self.repository
    }

    /// Re-validate, hash and persist a fully buffered upload.
    pub async fn store(
        &self,
        bytes: Bytes,
        declared_name: &str,
        declared_mime_type: &str,
    ) -> StorageResult<StoredFileMeta> {
        let size = bytes.len() as u64;
        self.validator
            .validate(&FileCandidate::new(declared_name, size, declared_mime_type))?;
        self.persist(bytes, declared_name, declared_mime_type).await
    }

    /// Persist a document produced by this server, such as a signed PDF.
    /// Upload rules do not apply to `name` or to the size; the name on disk
    /// is still sanitized and unique, and `name` is kept as the original.
    pub async fn store_artifact(
        &self,
        bytes: Bytes,
        name: &str,
        mime_type: &str,
    ) -> StorageResult<StoredFileMeta> {
        self.persist(bytes, name, mime_type).await
    }

    /// Delete a stored file and its metadata record. Missing pieces are
    /// not an error.
    pub async fn remove(&self, meta: &StoredFileMeta) -> StorageResult<()> {
        let path = self.root.join(&meta.filename);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(StorageError::Io { path, source }),
        }
        self.repository.delete(&meta.filename).await?;
        tracing::info!(filename = %meta.filename, "Removed stored file");
        Ok(())
    }

    async fn persist(
        &self,
        bytes: Bytes,
        declared_name: &str,
        declared_mime_type: &str,
    ) -> StorageResult<StoredFileMeta> {
        let size = bytes.len() as u64;
        if size > STREAMING_THRESHOLD {
            let chunks = chunk_bytes(bytes, WRITE_CHUNK_SIZE)
                .into_iter()
                .map(Ok::<_, std::io::Error>);
            return self
                .write_stream(stream::iter(chunks), declared_name, declared_mime_type, None)
                .await;
        }

        let name = UniqueName::generate(declared_name);
        let sha256_hash = hex::encode(Sha256::digest(&bytes));
        let final_path = self.root.join(&name.filename);
        let part_path = part_path(&final_path);

        let write = async {
            let mut file = fs::File::create(&part_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            fs::rename(&part_path, &final_path).await
        };
        if let Err(source) = write.await {
            let _ = fs::remove_file(&part_path).await;
            return Err(StorageError::Io {
                path: final_path,
                source,
            });
        }

        self.record(name, &final_path, declared_name, size, declared_mime_type, sha256_hash)
            .await
    }

    /// Persist a payload as it arrives, hashing incrementally. The size
    /// ceiling is enforced on the running total, so a stream that lies about
    /// (or omits) its length is still cut off.
    pub async fn store_stream<S, E>(
        &self,
        chunks: S,
        declared_name: &str,
        declared_mime_type: &str,
        declared_size: Option<u64>,
    ) -> StorageResult<StoredFileMeta>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
        E: std::fmt::Display,
    {
        let max = self.validator.limits().max_file_size;
        // Name and type are checked before a single byte lands on disk
        self.validator.validate(&FileCandidate::new(
            declared_name,
            declared_size.unwrap_or(1),
            declared_mime_type,
        ))?;
        self.write_stream(chunks, declared_name, declared_mime_type, Some(max))
            .await
    }

    async fn write_stream<S, E>(
        &self,
        mut chunks: S,
        declared_name: &str,
        declared_mime_type: &str,
        max: Option<u64>,
    ) -> StorageResult<StoredFileMeta>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
        E: std::fmt::Display,
    {
        let name = UniqueName::generate(declared_name);
        let final_path = self.root.join(&name.filename);
        let part_path = part_path(&final_path);

        let mut file = fs::File::create(&part_path)
            .await
            .map_err(|source| StorageError::Io {
                path: part_path.clone(),
                source,
            })?;
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;

        let outcome: StorageResult<()> = async {
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.map_err(|e| StorageError::Stream(e.to_string()))?;
                written += chunk.len() as u64;
                if let Some(max) = max.filter(|max| written > *max) {
                    return Err(ValidationError::FileTooLarge {
                        name: declared_name.to_string(),
                        size: written,
                        max,
                    }
                    .into());
                }
                hasher.update(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|source| StorageError::Io {
                        path: part_path.clone(),
                        source,
                    })?;
            }
            if written == 0 {
                return Err(ValidationError::EmptyFile(declared_name.to_string()).into());
            }
            file.sync_all().await.map_err(|source| StorageError::Io {
                path: part_path.clone(),
                source,
            })
        }
        .await;

        drop(file);
        if let Err(e) = outcome {
            let _ = fs::remove_file(&part_path).await;
            return Err(e);
        }

        fs::rename(&part_path, &final_path)
            .await
            .map_err(|source| StorageError::Io {
                path: final_path.clone(),
                source,
            })?;

        let sha256_hash = hex::encode(hasher.finalize());
        self.record(name, &final_path, declared_name, written, declared_mime_type, sha256_hash)
            .await
    }

    /// Read back a stored file by its unique name.
    pub async fn read(&self, filename: &str) -> StorageResult<Vec<u8>> {
        if filename.is_empty() || is_dangerous_file_name(filename) {
            return Err(StorageError::NotFound(filename.to_string()));
        }
        let path = self.root.join(filename);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(filename.to_string()))
            }
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    /// Write the metadata row for a file already in place at `path`. The
    /// file is removed again if the row cannot be written.
    async fn record(
        &self,
        name: UniqueName,
        path: &Path,
        original_name: &str,
        size: u64,
        mime_type: &str,
        sha256_hash: String,
    ) -> StorageResult<StoredFileMeta> {
        let meta = StoredFileMeta {
            url: format!(
                "{}/{}",
                self.public_base.trim_end_matches('/'),
                name.filename
            ),
            id: name.id,
            filename: name.filename,
            original_name: original_name.to_string(),
            size,
            mime_type: mime_type.to_string(),
            sha256_hash,
            uploaded_at: name.created_at,
        };
        if let Err(e) = self.repository.put(&meta).await {
            tracing::warn!(filename = %meta.filename, error = %e, "Metadata write failed; removing file");
            if let Err(cleanup) = fs::remove_file(path).await {
                tracing::error!(path = %path.display(), error = %cleanup, "Failed to remove orphaned file");
            }
            return Err(e.into());
        }

        tracing::info!(
            filename = %meta.filename,
            size = meta.size,
            sha256_prefix = %&meta.sha256_hash[..12],
            "Stored file"
        );
        Ok(meta)
    }
}

struct UniqueName {
    id: String,
    filename: String,
    created_at: DateTime<Utc>,
}

impl UniqueName {
    fn generate(original_name: &str) -> Self {
        let created_at = Utc::now();
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(|c| (c as char).to_ascii_lowercase())
            .collect();
        let id = format!("{}_{}", created_at.timestamp_millis(), token);
        let filename = format!("{}_{}", id, sanitize_file_name(original_name));
        Self {
            id,
            filename,
            created_at,
        }
    }
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`. A dot that
/// follows another dot is replaced too, so the result never contains `..`.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut previous = None;
    for c in name.chars() {
        let keep = c.is_ascii_alphanumeric() || c == '-' || (c == '.' && previous != Some('.'));
        out.push(if keep { c } else { '_' });
        previous = Some(c);
    }
    out
}

fn part_path(final_path: &Path) -> PathBuf {
    let mut s = final_path.as_os_str().to_owned();
    s.push(".part");
    PathBuf::from(s)
}

fn chunk_bytes(bytes: Bytes, size: usize) -> Vec<Bytes> {
    let mut out = Vec::with_capacity(bytes.len() / size + 1);
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + size).min(bytes.len());
        out.push(bytes.slice(offset..end));
        offset = end;
    }
    out
}
