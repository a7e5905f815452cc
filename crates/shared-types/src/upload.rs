//! Upload lifecycle types: progress snapshots, terminal results and the
//! persisted metadata record for a stored file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single file moving through the upload pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

impl UploadStatus {
    /// Completed and Error are terminal; nothing follows them for that file.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Error)
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadStatus::Pending => write!(f, "pending"),
            UploadStatus::Uploading => write!(f, "uploading"),
            UploadStatus::Completed => write!(f, "completed"),
            UploadStatus::Error => write!(f, "error"),
        }
    }
}

/// Ephemeral progress snapshot emitted to an observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub file_name: String,
    /// 0..=100
    pub percent: u8,
    pub status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadProgress {
    pub fn pending(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            percent: 0,
            status: UploadStatus::Pending,
            error: None,
        }
    }

    pub fn uploading(file_name: &str, percent: u8) -> Self {
        Self {
            file_name: file_name.to_string(),
            percent: percent.min(100),
            status: UploadStatus::Uploading,
            error: None,
        }
    }

    pub fn completed(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            percent: 100,
            status: UploadStatus::Completed,
            error: None,
        }
    }

    pub fn failed(file_name: &str, error: impl Into<String>) -> Self {
        Self {
            file_name: file_name.to_string(),
            percent: 0,
            status: UploadStatus::Error,
            error: Some(error.into()),
        }
    }
}

/// Persisted record describing one stored file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFileMeta {
    pub id: String,
    /// Sanitized, collision-resistant on-disk name
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    /// Lowercase hex SHA-256 of the full content
    pub sha256_hash: String,
    pub uploaded_at: DateTime<Utc>,
    pub url: String,
}

/// Terminal outcome for one file handed to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_file: Option<StoredFileMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn success(stored_file: StoredFileMeta) -> Self {
        Self {
            success: true,
            stored_file: Some(stored_file),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            stored_file: None,
            error: Some(error.into()),
        }
    }
}
