use serde::{Deserialize, Serialize};

use hybrid_search::{FollowUpSuggestion, Synthesis};

#[derive(Debug, Clone, Deserialize)]
pub struct IndexCodebaseRequest {
    pub path: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default, rename = "async")]
    pub async_mode: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexCodebaseResult {
    pub indexed_files: usize,
    pub skipped_files: usize,
    pub chunks: usize,
    pub total_chunks: usize,
    pub total_files: usize,
    pub errors: Vec<String>,
    pub path: String,
    pub forced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexCodebaseTask {
    pub task_id: String,
    pub status: String,
    pub estimated_files: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IndexCodebaseResponse {
    Task(IndexCodebaseTask),
    Result(IndexCodebaseResult),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchCodeRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub path_filter: Option<String>,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    pub expand: Option<bool>,
    #[serde(default)]
    pub synthesize: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultRow {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub kind: String,
    pub score: f64,
    pub signature: Option<String>,
    pub breadcrumb: Option<String>,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchCodeResponse {
    pub results: Vec<SearchResultRow>,
    pub synthesis: Option<Synthesis>,
    pub follow_ups: Vec<FollowUpSuggestion>,
}
