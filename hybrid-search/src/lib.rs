//! Hybrid lexical/semantic code search: fuses BM25 and cosine-similarity
//! retrieval, re-ranks, and optionally expands queries and synthesizes
//! results through an LLM.

pub mod engine;
pub mod error;
pub mod follow_up;
pub mod fusion;
pub mod options;
pub mod query_expander;
pub mod rerank;
pub mod result_synthesizer;

pub use engine::{Engine, SearchResponse};
pub use error::SearchError;
pub use follow_up::{FollowUpCategory, FollowUpGenerator, FollowUpSuggestion};
pub use fusion::reciprocal_rank_fusion;
pub use options::{SearchHit, SearchOptions};
pub use query_expander::{QueryExpander, QueryExpansion};
pub use rerank::rerank_multiplier;
pub use result_synthesizer::{ResultSynthesizer, Synthesis};
