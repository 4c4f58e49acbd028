use thiserror::Error;

use chunking_store::StoreError;
use embedding_provider::EmbedderError;
use llm_provider::LlmError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedderError),
    #[error("language model error: {0}")]
    Llm(#[from] LlmError),
    #[error("invalid search options: {0}")]
    InvalidOptions(String),
}
