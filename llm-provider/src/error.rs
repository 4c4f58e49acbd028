use thiserror::Error;

/// Closed error taxonomy surfaced by every LLM provider implementation.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("provider not available: {reason}")]
    NotAvailable { reason: String },
    #[error("model not found: {name}")]
    ModelNotFound { name: String },
    #[error("api key missing for provider {provider}")]
    ApiKeyMissing { provider: String },
    #[error("rate limited{}", retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },
    #[error("api error {code}: {msg}")]
    ApiError { code: u16, msg: String },
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("network error: {msg}")]
    NetworkError { msg: String },
    #[error("subprocess exited with code {exit_code:?}: {stderr}")]
    ProcessError { exit_code: Option<i32>, stderr: String },
    #[error("CLI tool `{tool}` not found on PATH")]
    CliNotFound { tool: String },
    #[error("unknown error: {msg}")]
    Unknown { msg: String },
}

impl Clone for LlmError {
    fn clone(&self) -> Self {
        match self {
            Self::InvalidInput(s) => Self::InvalidInput(s.clone()),
            Self::NotAvailable { reason } => Self::NotAvailable { reason: reason.clone() },
            Self::ModelNotFound { name } => Self::ModelNotFound { name: name.clone() },
            Self::ApiKeyMissing { provider } => Self::ApiKeyMissing { provider: provider.clone() },
            Self::RateLimited { retry_after } => Self::RateLimited { retry_after: *retry_after },
            Self::ApiError { code, msg } => Self::ApiError { code: *code, msg: msg.clone() },
            Self::Timeout { seconds } => Self::Timeout { seconds: *seconds },
            Self::NetworkError { msg } => Self::NetworkError { msg: msg.clone() },
            Self::ProcessError { exit_code, stderr } => {
                Self::ProcessError { exit_code: *exit_code, stderr: stderr.clone() }
            }
            Self::CliNotFound { tool } => Self::CliNotFound { tool: tool.clone() },
            Self::Unknown { msg } => Self::Unknown { msg: msg.clone() },
        }
    }
}
