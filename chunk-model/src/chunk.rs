//! Shared entities used across the storage, ingest, and search crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// The closed set of syntactic units a `Parser` may emit.
///
/// Closed-world enumeration: an unrecognized value read back from storage
/// is a [`ModelError::InvalidKind`] (corruption), never a default case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Method,
    Type,
    Protocol,
    Extension,
    Property,
    Documentation,
    Other,
}

impl ChunkKind {
    /// Every variant, for exhaustive iteration.
    pub const ALL: [ChunkKind; 8] = [
        ChunkKind::Function,
        ChunkKind::Method,
        ChunkKind::Type,
        ChunkKind::Protocol,
        ChunkKind::Extension,
        ChunkKind::Property,
        ChunkKind::Documentation,
        ChunkKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
            ChunkKind::Type => "type",
            ChunkKind::Protocol => "protocol",
            ChunkKind::Extension => "extension",
            ChunkKind::Property => "property",
            ChunkKind::Documentation => "documentation",
            ChunkKind::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Result<ChunkKind, ModelError> {
        match raw {
            "function" => Ok(ChunkKind::Function),
            "method" => Ok(ChunkKind::Method),
            "type" => Ok(ChunkKind::Type),
            "protocol" => Ok(ChunkKind::Protocol),
            "extension" => Ok(ChunkKind::Extension),
            "property" => Ok(ChunkKind::Property),
            "documentation" => Ok(ChunkKind::Documentation),
            "other" => Ok(ChunkKind::Other),
            other => Err(ModelError::InvalidKind(other.to_string())),
        }
    }
}

/// A unit of indexable code, as defined in the data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Globally unique within the index; stable across reindex if
    /// content, path, and range are unchanged.
    pub id: String,
    pub path: String,
    pub content: String,
    /// 1-based inclusive.
    pub start_line: u32,
    /// 1-based inclusive.
    pub end_line: u32,
    pub kind: ChunkKind,
    pub symbols: Vec<String>,
    pub references: Vec<String>,
    pub conformances: Vec<String>,
    pub is_type_declaration: bool,
    pub signature: Option<String>,
    pub breadcrumb: Option<String>,
    pub doc_comment: Option<String>,
    pub token_count: u32,
    pub language: String,
    pub file_hash: String,
    pub content_hash: String,
    pub generated_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Minimal constructor; hashes and timestamp are supplied by the caller
    /// (the index manager), never recomputed implicitly, so that reused
    /// chunks keep their original `created_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
        start_line: u32,
        end_line: u32,
        kind: ChunkKind,
        language: impl Into<String>,
        file_hash: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            content: content.into(),
            start_line,
            end_line,
            kind,
            symbols: Vec::new(),
            references: Vec::new(),
            conformances: Vec::new(),
            is_type_declaration: false,
            signature: None,
            breadcrumb: None,
            doc_comment: None,
            token_count: 0,
            language: language.into(),
            file_hash: file_hash.into(),
            content_hash: content_hash.into(),
            generated_description: None,
            created_at: Utc::now(),
        }
    }
}

/// One row per indexed file path; used for whole-file change detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHashRecord {
    pub path: String,
    pub hash: String,
    pub indexed_at: DateTime<Utc>,
}

/// Standalone documentation (markdown, comments) — a parallel instantiation
/// of the chunk storage contract, with no signature/symbols/conformances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoSnippet {
    pub id: String,
    pub path: String,
    pub content: String,
    pub start_line: u32,
    pub end_line: u32,
    pub language: String,
    pub file_hash: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Many-to-many projection of `Chunk.conformances`, maintained by triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConformanceIndexEntry {
    pub chunk_id: String,
    pub protocol_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_kind_round_trips_through_its_string_form() {
        for kind in ChunkKind::ALL {
            assert_eq!(ChunkKind::parse(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_string_is_a_model_error() {
        assert!(matches!(
            ChunkKind::parse("widget"),
            Err(ModelError::InvalidKind(ref s)) if s == "widget"
        ));
    }
}
