use thiserror::Error;

use chunking_store::StoreError;
use embedding_provider::EmbedderError;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedderError),
    #[error("indexing was cancelled")]
    Cancelled,
    #[error("parser reported failure for {path}")]
    Parse { path: String },
}
