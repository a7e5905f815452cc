//! Signing pipeline for uploaded documents
//!
//! [`SignatureCompositor`] draws captured signature images (and their
//! timestamp and signer lines) onto the pages they were placed on.
//! [`CertificateAppender`] then stamps a certificate of completion on the
//! last page.
//!
//! [`sign_document`] runs both over a single parse of the source.
//!
//! ```no_run
//! use docsign_core::{CertificateAppender, SignatureCompositor};
//! # fn run(pdf: &[u8], fields: &[shared_types::SignatureField]) -> Result<(), docsign_core::SigningError> {
//! let signed = SignatureCompositor::default().compose(pdf, fields, "lease.pdf")?;
//! let signed = CertificateAppender::default().append(&signed, "lease.pdf", &["Ada".to_string()])?;
//! # let _ = signed;
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use shared_types::SignatureField;

pub mod certificate;
pub mod compositor;
pub mod error;

pub use certificate::{CertificateAppender, CertificateLayout, CertificateLine, CERTIFICATE_TITLE};
pub use compositor::{BoundsMode, CompositorOptions, SignatureCompositor, DEFAULT_PRODUCT_NAME};
pub use error::SigningError;

/// Composite `signatures` and append the certificate in one pass.
pub fn sign_document(
    compositor: &SignatureCompositor,
    certificates: &CertificateAppender,
    pdf: &[u8],
    signatures: &[SignatureField],
    document_name: &str,
    signer_names: &[String],
) -> Result<Vec<u8>, SigningError> {
    let mut doc = compositor::open(pdf)?;
    compositor.compose_into(&mut doc, signatures, document_name)?;
    certificates.append_to(&mut doc, document_name, signer_names, Utc::now())?;
    Ok(doc.save_to_bytes()?)
}
