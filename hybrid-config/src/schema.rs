use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionBatchMode {
    Single,
    Grouped,
}

impl Default for DescriptionBatchMode {
    fn default() -> Self {
        DescriptionBatchMode::Grouped
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub batch_memory_limit_mb: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "onnx_stdio".into(),
            model: String::new(),
            dimension: 384,
            batch_size: 32,
            batch_timeout_ms: 150,
            batch_memory_limit_mb: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LlmStageConfig {
    pub provider: String,
    pub model: String,
    pub timeout: u64,
    pub description_batch_size: usize,
    pub description_batch_mode: DescriptionBatchMode,
    pub description_chunks_per_request: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EnhancementConfig {
    pub enabled: bool,
    pub utility: LlmStageConfig,
    pub synthesis: LlmStageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SearchConfig {
    pub semantic_weight: f64,
    pub rrf_k: f64,
    pub multi_hop_enabled: bool,
    pub multi_hop_depth: u32,
    pub output_format: String,
    pub limit: usize,
    pub expand_query_by_default: bool,
    pub synthesize_by_default: bool,
    pub default_extensions: Vec<String>,
    pub default_path_filter: Option<String>,
    pub enhancement: EnhancementConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.5,
            rrf_k: 60.0,
            multi_hop_enabled: false,
            multi_hop_depth: 0,
            output_format: "text".into(),
            limit: 10,
            expand_query_by_default: false,
            synthesize_by_default: false,
            default_extensions: Vec::new(),
            default_path_filter: None,
            enhancement: EnhancementConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IndexingConfig {
    pub exclude: Vec<String>,
    pub include_extensions: Vec<String>,
    pub max_file_size: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_concurrent_tasks: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude: vec![".git".into(), "target".into(), "node_modules".into()],
            include_extensions: Vec::new(),
            max_file_size: 1024 * 1024,
            chunk_size: 400,
            chunk_overlap: 50,
            max_concurrent_tasks: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    pub index_path: String,
    pub cache_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { index_path: ".hybrid-index".into(), cache_path: ".hybrid-cache".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

/// Top-level configuration. `remote` is deliberately open — remote bucket
/// sync is out of scope, so its sub-keys are recognized as a section but
/// not individually validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HybridConfig {
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub indexing: IndexingConfig,
    pub storage: StorageConfig,
    pub watch: WatchConfig,
    pub logging: LoggingConfig,
    pub remote: HashMap<String, toml::Value>,
}
