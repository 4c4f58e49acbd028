use std::path::PathBuf;

use hybrid_config::HybridConfig;

/// Runtime wiring on top of the validated TOML config: where the index
/// lives on disk, and which worker count to use. Kept separate from
/// `HybridConfig` because these are resolved paths, not config text.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub config: HybridConfig,
    pub db_path: PathBuf,
    pub hnsw_dir: PathBuf,
}

impl ServiceConfig {
    pub fn from_config(config: HybridConfig) -> Self {
        let storage_root = PathBuf::from(&config.storage.index_path);
        Self { db_path: storage_root.join("chunks.db"), hnsw_dir: storage_root.join("vectors"), config }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_config(HybridConfig::default())
    }
}
