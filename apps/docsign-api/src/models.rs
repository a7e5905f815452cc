//! Request and response bodies

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shared_types::{Recipient, ResolvedRecipients, SignatureField, SigningRequest, StoredFileMeta};

use crate::error::ApiError;

pub const DEFAULT_DOCUMENT_NAME: &str = "document.pdf";

#[derive(Debug, Serialize)]
pub struct SingleUploadResponse {
    pub success: bool,
    pub file: StoredFileMeta,
}

#[derive(Debug, Serialize)]
pub struct MultiUploadResponse {
    pub success: bool,
    pub files: Vec<StoredFileMeta>,
}

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub success: bool,
    pub message: String,
    pub recipients: ResolvedRecipients,
    pub file: StoredFileMeta,
}

/// Body of `POST /api/files/{filename}/send`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendRequest {
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub email_subject: Option<String>,
    #[serde(default)]
    pub email_body: Option<String>,
}

/// Raw multipart fields of a signing request, before parsing
#[derive(Debug, Default)]
pub struct SigningForm {
    pub pdf: Option<Bytes>,
    pub pdf_file_name: Option<String>,
    pub signatures: Option<String>,
    pub document_name: Option<String>,
    pub recipients: Option<String>,
    pub email_subject: Option<String>,
    pub email_body: Option<String>,
}

impl SigningForm {
    pub fn into_request(self) -> Result<SigningRequest, ApiError> {
        let (Some(pdf), Some(signatures)) = (self.pdf, non_blank(self.signatures)) else {
            return Err(ApiError::MissingFields);
        };
        if pdf.is_empty() {
            return Err(ApiError::MissingFields);
        }

        let signatures: Vec<SignatureField> = serde_json::from_str(&signatures)
            .map_err(|e| ApiError::BadRequest(format!("Invalid signatures: {}", e)))?;
        let recipients: Vec<Recipient> = match non_blank(self.recipients) {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| ApiError::BadRequest(format!("Invalid recipients: {}", e)))?,
            None => Vec::new(),
        };

        let document_name = non_blank(self.document_name)
            .or_else(|| non_blank(self.pdf_file_name))
            .unwrap_or_else(|| DEFAULT_DOCUMENT_NAME.to_string());

        Ok(SigningRequest {
            source_pdf: pdf.to_vec(),
            signatures,
            document_name,
            recipients,
            email_subject: non_blank(self.email_subject),
            email_body: non_blank(self.email_body),
        })
    }
}

/// Treat empty or whitespace-only form values as absent
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
