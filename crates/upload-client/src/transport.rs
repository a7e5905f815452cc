//! How bytes get to the server.
//!
//! [`UploadTransport`] is the seam the orchestrator retries around;
//! [`HttpTransport`] is the multipart/form-data implementation used in
//! production.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;
use shared_types::StoredFileMeta;

use crate::error::TransportError;
use crate::task::UploadTask;

/// `(bytes_sent, bytes_total)` callback
pub type ByteProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

const BODY_CHUNK_SIZE: usize = 64 * 1024;

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Perform one transfer attempt. Timeouts and cancellation are applied
    /// by the caller.
    async fn send(
        &self,
        task: &UploadTask,
        progress: ByteProgress,
    ) -> Result<StoredFileMeta, TransportError>;
}

#[async_trait]
impl<T: UploadTransport + ?Sized> UploadTransport for Arc<T> {
    async fn send(
        &self,
        task: &UploadTask,
        progress: ByteProgress,
    ) -> Result<StoredFileMeta, TransportError> {
        (**self).send(task, progress).await
    }
}

/// Posts each file as the `file` field of a multipart form
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn send(
        &self,
        task: &UploadTask,
        progress: ByteProgress,
    ) -> Result<StoredFileMeta, TransportError> {
        let total = task.size;
        let mut sent = 0u64;
        let chunks = split(&task.bytes, BODY_CHUNK_SIZE);
        let body = stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            progress(sent, total);
            Ok::<_, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(Body::wrap_stream(body), total)
            .file_name(task.file_name.clone())
            .mime_str(&task.declared_mime_type)?;
        let form = Form::new().part("file", part);

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        parse_upload_response(status.as_u16(), status.canonical_reason(), &body)
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponseBody {
    #[serde(default)]
    file: Option<StoredFileMeta>,
    #[serde(default)]
    files: Vec<StoredFileMeta>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Interpret the upload endpoint's reply. Accepts both the single-file
/// (`{file}`) and multi-file (`{files: [...]}`) shapes.
pub fn parse_upload_response(
    status: u16,
    reason: Option<&str>,
    body: &[u8],
) -> Result<StoredFileMeta, TransportError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| format!("HTTP {}: {}", status, reason.unwrap_or("")));
        return Err(TransportError::Http { status, message });
    }

    let parsed: UploadResponseBody =
        serde_json::from_slice(body).map_err(|_| TransportError::MalformedResponse)?;
    parsed
        .file
        .or_else(|| parsed.files.into_iter().next())
        .ok_or(TransportError::MalformedResponse)
}

fn split(bytes: &Bytes, size: usize) -> Vec<Bytes> {
    (0..bytes.len())
        .step_by(size)
        .map(|start| bytes.slice(start..(start + size).min(bytes.len())))
        .collect()
}
