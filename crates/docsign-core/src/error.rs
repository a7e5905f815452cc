use shared_pdf::{ImageDecodeError, PdfError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Invalid source PDF: {0}")]
    InvalidPdf(String),

    #[error("Signature {index} targets page {page}, but the document has {page_count} pages")]
    PageOutOfRange {
        index: usize,
        page: u32,
        page_count: usize,
    },

    #[error("Signature {index}: {source}")]
    ImageDecode {
        index: usize,
        source: ImageDecodeError,
    },

    #[error("Signature {index}: {reason}")]
    InvalidField { index: usize, reason: String },

    #[error("Signature {index} extends past the edge of page {page}")]
    OutOfBounds { index: usize, page: u32 },

    #[error("Composition exceeded its {budget_ms} ms budget")]
    BudgetExceeded { budget_ms: u128 },

    #[error(transparent)]
    Pdf(#[from] PdfError),
}

impl SigningError {
    /// Caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SigningError::PageOutOfRange { .. }
                | SigningError::InvalidField { .. }
                | SigningError::OutOfBounds { .. }
        )
    }
}
