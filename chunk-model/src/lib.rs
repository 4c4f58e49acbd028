//! Shared entities, closed-world enumerations, content hashing, and error
//! vocabulary used across the storage, ingest, and search crates.

mod chunk;
mod error;
pub mod hash;

pub use chunk::{Chunk, ChunkKind, ConformanceIndexEntry, FileHashRecord, InfoSnippet};
pub use error::ModelError;
