use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Page {page} not found (document has {page_count} pages)")]
    PageNotFound { page: u32, page_count: usize },

    #[error("Malformed PDF structure: {0}")]
    Structure(String),

    #[error("Failed to encode content stream: {0}")]
    Encode(String),

    #[error("Failed to save PDF: {0}")]
    Save(String),
}

impl From<lopdf::Error> for PdfError {
    fn from(err: lopdf::Error) -> Self {
        PdfError::Structure(err.to_string())
    }
}
