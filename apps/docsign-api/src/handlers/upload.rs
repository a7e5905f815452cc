//! `POST /api/files/upload`

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use tracing::{error, info, warn};
use upload_core::FileCandidate;

use super::{multipart_error, multipart_rejection};
use crate::error::ApiError;
use crate::models::{MultiUploadResponse, SingleUploadResponse};
use crate::state::AppState;

struct IncomingFile {
    name: String,
    mime_type: String,
    bytes: Bytes,
}

/// Accepts one `file` field or repeated `files` fields. The whole batch is
/// validated before anything is written.
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart.map_err(multipart_rejection)?;
    let validator = state.storage.validator();

    let mut incoming = Vec::new();
    let mut single = true;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {}
            Some("files") => single = false,
            other => {
                tracing::debug!(field = ?other, "Ignoring form field");
                continue;
            }
        }
        // Reject oversized batches before buffering another payload
        validator.check_batch_size(incoming.len() + 1)?;

        let name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        incoming.push(IncomingFile {
            name,
            mime_type,
            bytes,
        });
    }

    let candidates: Vec<FileCandidate<'_>> = incoming
        .iter()
        .map(|f| FileCandidate::new(&f.name, f.bytes.len() as u64, &f.mime_type))
        .collect();
    if let Err(e) = validator.validate_all(&candidates) {
        warn!(files = incoming.len(), error = %e, "Upload rejected");
        return Err(e.into());
    }

    let mut stored = Vec::with_capacity(incoming.len());
    for file in incoming {
        match state
            .storage
            .store(file.bytes, &file.name, &file.mime_type)
            .await
        {
            Ok(meta) => stored.push(meta),
            Err(e) => {
                // All or nothing: drop what this request already stored
                for meta in &stored {
                    if let Err(cleanup) = state.storage.remove(meta).await {
                        error!(filename = %meta.filename, error = %cleanup, "Rollback failed");
                    }
                }
                warn!(file = %file.name, rolled_back = stored.len(), error = %e, "Upload failed");
                return Err(e.into());
            }
        }
    }
    info!(files = stored.len(), "Upload complete");

    if single && stored.len() == 1 {
        let file = stored.remove(0);
        return Ok(Json(SingleUploadResponse {
            success: true,
            file,
        })
        .into_response());
    }
    Ok(Json(MultiUploadResponse {
        success: true,
        files: stored,
    })
    .into_response())
}

/// CORS preflight for browsers that send a bare OPTIONS
pub async fn upload_preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}
