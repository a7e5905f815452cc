//! Stored file listing, metadata and download

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Request, State},
    response::{IntoResponse, Response},
    Json,
};
use shared_types::StoredFileMeta;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use upload_core::validator::is_dangerous_file_name;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/files`, newest first
pub async fn list_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StoredFileMeta>>, ApiError> {
    Ok(Json(state.storage.repository().list().await?))
}

/// `GET /api/files/{filename}/meta`
pub async fn file_meta(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Json<StoredFileMeta>, ApiError> {
    state
        .storage
        .repository()
        .get(&filename)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(filename))
}

/// `GET /api/files/{filename}`: the stored bytes, with content type by
/// extension and byte-range support. Only names with a metadata record are
/// served, so in-progress writes stay hidden.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    if filename.is_empty() || is_dangerous_file_name(&filename) {
        return Err(ApiError::NotFound(filename));
    }
    let Some(meta) = state.storage.repository().get(&filename).await? else {
        return Err(ApiError::NotFound(filename));
    };
    let path = state.storage.root().join(&meta.filename);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ApiError::NotFound(filename));
    }

    let response: Result<_, Infallible> = ServeFile::new(path).oneshot(request).await;
    match response {
        Ok(response) => Ok(response.map(Body::new).into_response()),
        Err(never) => match never {},
    }
}
