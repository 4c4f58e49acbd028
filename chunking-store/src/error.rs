use thiserror::Error;

/// Errors surfaced by [`crate::ChunkStore`] and [`crate::VectorStore`].
///
/// `Fatal` cases (I/O, migration, dimension) abort the current operation
/// and leave the store consistent; `LogicError` signals corruption rather
/// than caller misuse.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Model(#[from] chunk_model::ModelError),

    /// A chunk `kind` column held a value outside the closed set.
    #[error("invalid kind stored for chunk {chunk_id}: {raw}")]
    InvalidKind { chunk_id: String, raw: String },

    /// The on-disk migration log names migrations this build does not
    /// know about — opening would silently downgrade the schema.
    #[error("index was created by a newer schema (unknown migrations: {0:?}); refusing to open")]
    Downgrade(Vec<String>),

    /// `VectorStore::insert` received a vector whose length does not match
    /// the dimension pinned by the first vector ever written.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector index error: {0}")]
    VectorIndex(String),
}
