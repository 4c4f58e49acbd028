use thiserror::Error;

/// The closed error taxonomy for embedding providers.
#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("provider not available: {reason}")]
    NotAvailable { reason: String },
    #[error("model not found: {name}")]
    ModelNotFound { name: String },
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("network error: {msg}")]
    NetworkError { msg: String },
    #[error("api key missing for provider {provider}")]
    ApiKeyMissing { provider: String },
    #[error("download failed: {reason}")]
    DownloadFailed { reason: String },
    #[error("unknown error: {msg}")]
    Unknown { msg: String },
}
