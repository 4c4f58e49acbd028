use thiserror::Error;

use chunking_store::StoreError;
use hybrid_search::SearchError;
use index_manager::IndexError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("search error: {0}")]
    Search(#[from] SearchError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
