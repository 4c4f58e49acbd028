//! Shared error vocabulary. Individual crates wrap these into their own
//! richer error enums (`StoreError`, `EmbedderError`, ...) via `#[from]`.

use thiserror::Error;

/// Errors that can arise from the entities in this crate alone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A chunk `kind` string read back from storage is outside the closed
    /// set in [`crate::ChunkKind`] — signals corruption, not a default case.
    #[error("invalid chunk kind: {0}")]
    InvalidKind(String),
}
