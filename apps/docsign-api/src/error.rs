//! Error types for DocSign API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docsign_core::SigningError;
use serde_json::json;
use shared_types::StoredFileMeta;
use thiserror::Error;
use upload_core::{RepositoryError, StorageError, ValidationError};

use crate::notifier::DeliveryError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("{0}")]
    BadRequest(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    /// Delivery failed after the signed document was stored
    #[error("{source}")]
    Delivery {
        source: DeliveryError,
        file: Option<Box<StoredFileMeta>>,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DeliveryError> for ApiError {
    fn from(source: DeliveryError) -> Self {
        ApiError::Delivery { source, file: None }
    }
}

const SIGNING_FAILED: &str = "Failed to process signed document";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, details) = match &self {
            ApiError::MissingFields | ApiError::BadRequest(_) | ApiError::Validation(_) => {
                (StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            ApiError::NotFound(_) | ApiError::Storage(StorageError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, self.to_string(), None)
            }
            ApiError::Storage(e) if e.is_client_error() => {
                (StatusCode::BAD_REQUEST, e.to_string(), None)
            }
            ApiError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to save file".to_string(),
                    Some(e.to_string()),
                )
            }
            ApiError::Signing(e) if e.is_client_error() => {
                (StatusCode::BAD_REQUEST, e.to_string(), None)
            }
            ApiError::Signing(e) => {
                tracing::error!("Signing error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    SIGNING_FAILED.to_string(),
                    Some(e.to_string()),
                )
            }
            ApiError::Delivery { source, .. } if source.is_client_error() => {
                (StatusCode::BAD_REQUEST, source.to_string(), None)
            }
            ApiError::Delivery { source, .. } => {
                tracing::error!("Delivery error: {}", source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    SIGNING_FAILED.to_string(),
                    Some(source.to_string()),
                )
            }
            ApiError::Repository(e) => {
                tracing::error!("Repository error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    Some(e.to_string()),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "error": message,
            "status": status.as_u16(),
        });
        if let Some(details) = details {
            body["details"] = json!(details);
        }
        if let ApiError::Delivery {
            file: Some(file), ..
        } = &self
        {
            body["file"] = json!(file);
        }

        (status, Json(body)).into_response()
    }
}
