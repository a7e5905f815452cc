//! Client side of the document upload pipeline.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use upload_client::{HttpTransport, UploadOptions, UploadOrchestrator, UploadProgress, UploadTask};
//!
//! # async fn run() -> std::io::Result<()> {
//! let task = UploadTask::from_path("contract.pdf").await?;
//! let orchestrator = UploadOrchestrator::new(
//!     HttpTransport::new("http://localhost:3001/api/files/upload"),
//!     UploadOptions::default(),
//! );
//! let results = orchestrator
//!     .upload(&[task], Arc::new(|p: UploadProgress| println!("{:?}", p)), CancellationToken::new())
//!     .await;
//! # let _ = results;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod orchestrator;
pub mod task;
pub mod transport;

pub use error::TransportError;
pub use shared_types::{UploadProgress, UploadResult, UploadStatus};
pub use orchestrator::{backoff_delay, ProgressSink, UploadOptions, UploadOrchestrator};
pub use task::{validate_batch, RejectedTask, UploadTask, ValidatedBatch};
pub use transport::{parse_upload_response, ByteProgress, HttpTransport, UploadTransport};

/// Human-readable byte count, e.g. `1.5 MB`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
