//! Upload tasks and client-side pre-validation.

use std::path::Path;

use bytes::Bytes;
use upload_core::{FileCandidate, FileValidator, ValidationError};

/// One file waiting to be transferred
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub file_name: String,
    pub size: u64,
    pub declared_mime_type: String,
    pub bytes: Bytes,
}

impl UploadTask {
    pub fn new(
        file_name: impl Into<String>,
        declared_mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            file_name: file_name.into(),
            size: bytes.len() as u64,
            declared_mime_type: declared_mime_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(path).first_or_octet_stream();
        Ok(Self::new(file_name, mime_type.essence_str(), bytes))
    }

    pub fn candidate(&self) -> FileCandidate<'_> {
        FileCandidate::new(&self.file_name, self.size, &self.declared_mime_type)
    }
}

/// A task the validator refused, with the reason shown to the user
#[derive(Debug, Clone)]
pub struct RejectedTask {
    pub task: UploadTask,
    pub error: ValidationError,
}

/// Tasks split by the validator
#[derive(Debug, Default)]
pub struct ValidatedBatch {
    pub accepted: Vec<UploadTask>,
    pub rejected: Vec<RejectedTask>,
}

/// Apply the batch cap, then sort every task into accepted or rejected.
/// Only an over-sized batch fails as a whole.
pub fn validate_batch(
    validator: &FileValidator,
    tasks: Vec<UploadTask>,
) -> Result<ValidatedBatch, ValidationError> {
    validator.check_batch_size(tasks.len())?;

    let mut batch = ValidatedBatch::default();
    for task in tasks {
        match validator.validate(&task.candidate()) {
            Ok(()) => batch.accepted.push(task),
            Err(error) => {
                tracing::warn!(file = %task.file_name, %error, "Rejected before upload");
                batch.rejected.push(RejectedTask { task, error });
            }
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pdf(name: &str) -> UploadTask {
        UploadTask::new(name, "application/pdf", vec![b'%'; 16])
    }

    #[test]
    fn test_validate_batch_partitions() {
        let batch = validate_batch(
            &FileValidator::default(),
            vec![
                pdf("a.pdf"),
                pdf("../b.pdf"),
                UploadTask::new("empty.pdf", "application/pdf", Vec::new()),
                pdf("c.pdf"),
            ],
        )
        .unwrap();

        let accepted: Vec<_> = batch.accepted.iter().map(|t| t.file_name.as_str()).collect();
        assert_eq!(accepted, vec!["a.pdf", "c.pdf"]);
        assert_eq!(batch.rejected.len(), 2);
        assert_eq!(
            batch.rejected[1].error,
            ValidationError::EmptyFile("empty.pdf".to_string())
        );
    }

    #[test]
    fn test_validate_batch_rejects_oversized_batch() {
        let tasks = (0..11).map(|i| pdf(&format!("{}.pdf", i))).collect();
        assert!(matches!(
            validate_batch(&FileValidator::default(), tasks),
            Err(ValidationError::TooManyFiles { count: 11, max: 10 })
        ));
    }

    #[tokio::test]
    async fn test_from_path_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let task = UploadTask::from_path(&path).await.unwrap();
        assert_eq!(task.file_name, "scan.png");
        assert_eq!(task.declared_mime_type, "image/png");
        assert_eq!(task.size, 4);
    }
}
