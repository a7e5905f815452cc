//! Signing and delivery: `POST /api/send-signed-pdf` and
//! `POST /api/files/{filename}/send`

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    Json,
};
use bytes::Bytes;
use docsign_core::sign_document;
use shared_types::{SigningRequest, StoredFileMeta};
use tracing::{debug, info};

use super::{multipart_error, multipart_rejection};
use crate::error::ApiError;
use crate::models::{non_blank, DeliveryResponse, ResendRequest, SigningForm};
use crate::notifier::attachment_name;
use crate::state::AppState;

const PDF_MIME: &str = "application/pdf";
const SIGNED_MESSAGE: &str = "Document signed and emailed successfully";
const RESENT_MESSAGE: &str = "Document emailed successfully";

/// Composite the signatures, append the certificate, store the result and
/// email it. The signed file is stored before delivery, so a delivery
/// failure can be retried through the re-send endpoint.
pub async fn send_signed_pdf(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    let request = read_signing_form(multipart.map_err(multipart_rejection)?)
        .await?
        .into_request()?;
    // Bad addresses are reported before any PDF work
    let recipients = state.notifier.resolve(&request.recipients)?;
    let stored_name = attachment_name(&request.document_name);
    debug!(
        document = %request.document_name,
        signatures = request.signatures.len(),
        recipients = recipients.len(),
        "Signing request received"
    );

    let signed = Bytes::from(composite(&state, &request).await?);
    let file = state
        .storage
        .store_artifact(signed.clone(), &stored_name, PDF_MIME)
        .await?;

    let delivered = state
        .notifier
        .send(
            &signed,
            &request.document_name,
            &request.recipients,
            request.email_subject.as_deref(),
            request.email_body.as_deref(),
        )
        .await;
    let recipients = delivered.map_err(|source| ApiError::Delivery {
        source,
        file: Some(Box::new(file.clone())),
    })?;

    info!(
        document = %request.document_name,
        filename = %file.filename,
        "Signed document delivered"
    );
    Ok(Json(DeliveryResponse {
        success: true,
        message: SIGNED_MESSAGE.to_string(),
        recipients,
        file,
    }))
}

/// Email an already stored file again
pub async fn resend_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    body: Option<Json<ResendRequest>>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    let Json(request) = body.unwrap_or_default();
    let file = state
        .storage
        .repository()
        .get(&filename)
        .await?
        .ok_or_else(|| ApiError::NotFound(filename.clone()))?;
    let pdf = state.storage.read(&file.filename).await?;

    let document_name = non_blank(request.document_name)
        .unwrap_or_else(|| document_name_of(&file));
    let recipients = state
        .notifier
        .send(
            &pdf,
            &document_name,
            &request.recipients,
            non_blank(request.email_subject).as_deref(),
            non_blank(request.email_body).as_deref(),
        )
        .await
        .map_err(|source| ApiError::Delivery {
            source,
            file: Some(Box::new(file.clone())),
        })?;

    info!(filename = %file.filename, "Stored document re-sent");
    Ok(Json(DeliveryResponse {
        success: true,
        message: RESENT_MESSAGE.to_string(),
        recipients,
        file,
    }))
}

async fn read_signing_form(mut multipart: Multipart) -> Result<SigningForm, ApiError> {
    let mut form = SigningForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "pdf" => {
                form.pdf_file_name = field.file_name().map(str::to_string);
                form.pdf = Some(field.bytes().await.map_err(multipart_error)?);
            }
            "signatures" => form.signatures = Some(field.text().await.map_err(multipart_error)?),
            "documentName" => {
                form.document_name = Some(field.text().await.map_err(multipart_error)?)
            }
            "recipients" => form.recipients = Some(field.text().await.map_err(multipart_error)?),
            "emailSubject" => {
                form.email_subject = Some(field.text().await.map_err(multipart_error)?)
            }
            "emailBody" => form.email_body = Some(field.text().await.map_err(multipart_error)?),
            other => debug!(field = other, "Ignoring form field"),
        }
    }
    Ok(form)
}

/// PDF work runs on the blocking pool
async fn composite(state: &AppState, request: &SigningRequest) -> Result<Vec<u8>, ApiError> {
    let compositor = state.compositor.clone();
    let certificates = state.certificates.clone();
    let pdf = request.source_pdf.clone();
    let signatures = request.signatures.clone();
    let document_name = request.document_name.clone();
    let signer_names = request.signer_names();

    let signed = tokio::task::spawn_blocking(move || {
        sign_document(
            &compositor,
            &certificates,
            &pdf,
            &signatures,
            &document_name,
            &signer_names,
        )
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Signing task failed: {}", e)))??;
    Ok(signed)
}

/// Name to use in the email when the caller gives none
fn document_name_of(file: &StoredFileMeta) -> String {
    file.original_name
        .strip_prefix("Signed_")
        .unwrap_or(&file.original_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_document_name_of_strips_signed_prefix() {
        let mut meta = StoredFileMeta {
            id: "1_abc".to_string(),
            filename: "1_abc_Signed_lease.pdf".to_string(),
            original_name: "Signed_lease.pdf".to_string(),
            size: 10,
            mime_type: "application/pdf".to_string(),
            sha256_hash: String::new(),
            uploaded_at: Utc::now(),
            url: String::new(),
        };
        assert_eq!(document_name_of(&meta), "lease.pdf");
        meta.original_name = "scan.pdf".to_string();
        assert_eq!(document_name_of(&meta), "scan.pdf");
    }
}
