//! The pluggable boundary between raw file content and the chunk model.
//! Concrete language parsers are an external collaborator; this crate only
//! defines the contract the index manager consumes.

use chunk_model::{Chunk, InfoSnippet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub chunks: Vec<Chunk>,
    pub snippets: Vec<InfoSnippet>,
    pub outcome: Option<ParseOutcome>,
}

impl ParseResult {
    pub fn failure() -> Self {
        Self { chunks: Vec::new(), snippets: Vec::new(), outcome: Some(ParseOutcome::Failure) }
    }
}

pub trait Parser: Send + Sync {
    /// Never returns `Err`: parse failures are reported through
    /// `ParseResult::outcome`, not the `Result` type, so the manager can
    /// still mark the file as processed via `record_indexed`.
    fn parse(&self, content: &[u8], path: &str, file_hash: &str) -> ParseResult;
}
