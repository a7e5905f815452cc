use thiserror::Error;

/// Why one upload attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Non-2xx response; `message` is the server's `error` field when present
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Network error occurred: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response from server")]
    MalformedResponse,

    #[error("Upload timeout")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

impl TransportError {
    /// Everything except cancellation is worth another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Cancelled)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}
