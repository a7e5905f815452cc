//! Wire and domain types shared by the upload and signing pipeline.

pub mod signing;
pub mod upload;

pub use signing::{Recipient, RecipientRole, ResolvedRecipients, SignatureField, SigningRequest};
pub use upload::{StoredFileMeta, UploadProgress, UploadResult, UploadStatus};
