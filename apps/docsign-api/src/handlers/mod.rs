//! HTTP handlers for DocSign API

pub mod files;
pub mod signing;
pub mod upload;

use axum::extract::multipart::{MultipartError, MultipartRejection};

use crate::error::ApiError;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

pub(crate) fn multipart_rejection(rejection: MultipartRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

pub(crate) fn multipart_error(error: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Malformed form data: {}", error.body_text()))
}
