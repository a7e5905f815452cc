//! DocSign API Server - Backend for document uploads and signing
//!
//! Provides REST endpoints for:
//! - Validated file uploads with content-addressed metadata
//! - Compositing signatures onto a PDF and emailing the signed copy
//! - Listing, downloading and re-sending stored files

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notifier;
pub mod repository;
pub mod state;


pub use config::Config;
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    // The upload route answers its own preflight with `POST, OPTIONS`
    let uploads = Router::new()
        .route(
            "/api/files/upload",
            post(handlers::upload::upload_files).options(handlers::upload::upload_preflight),
        )
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ));

    let api = Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Stored files
        .route("/api/files", get(handlers::files::list_files))
        .route("/api/files/:filename", get(handlers::files::download_file))
        .route("/api/files/:filename/meta", get(handlers::files::file_meta))
        .route("/api/files/:filename/send", post(handlers::signing::resend_file))
        // Signing
        .route("/api/send-signed-pdf", post(handlers::signing::send_signed_pdf))
        .layer(cors);

    uploads
        .merge(api)
        // Add middleware
        .layer(DefaultBodyLimit::max(state.config.body_limit()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
