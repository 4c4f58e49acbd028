//! TOML configuration for the search engine: a `#[serde(deny_unknown_fields)]`
//! schema plus a raw-value walk that reports unrecognized keys by full path
//! and refuses anything that looks like a credential.

pub mod error;
pub mod schema;
mod validate;

pub use error::ConfigError;
pub use schema::{
    DescriptionBatchMode, EmbeddingConfig, EnhancementConfig, HybridConfig, IndexingConfig, LlmStageConfig,
    LoggingConfig, SearchConfig, StorageConfig, WatchConfig,
};

use std::path::Path;

/// Parses and validates a TOML document's text, without touching the
/// filesystem. Used directly by tests and by [`load`].
pub fn parse(text: &str, label: &str) -> Result<HybridConfig, ConfigError> {
    let raw: toml::Value = toml::from_str(text).map_err(|source| ConfigError::Parse { path: label.to_string(), source })?;
    validate::scan_for_secrets(&raw)?;
    validate::validate_known_keys(&raw)?;
    toml::from_str(text).map_err(|source| ConfigError::Parse { path: label.to_string(), source })
}

/// Loads, validates, and deserializes a TOML config file from disk.
pub fn load(path: &Path) -> Result<HybridConfig, ConfigError> {
    let text =
        std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
    parse(&text, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse("", "<test>").unwrap();
        assert_eq!(config, HybridConfig::default());
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let config = parse("[search]\nlimit = 25\nsemantic_weight = 0.7\n", "<test>").unwrap();
        assert_eq!(config.search.limit, 25);
        assert!((config.search.semantic_weight - 0.7).abs() < 1e-9);
        assert_eq!(config.embedding.batch_size, EmbeddingConfig::default().batch_size);
    }

    #[test]
    fn rejects_unknown_top_level_section() {
        let err = parse("[bogus]\nx = 1\n", "<test>").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(ref k) if k == "bogus"));
    }

    #[test]
    fn rejects_api_key_before_deserializing() {
        let err = parse("[embedding]\napi_key = \"sk-x\"\n", "<test>").unwrap_err();
        assert!(matches!(err, ConfigError::SecretInConfig(ref k) if k == "embedding.api_key"));
    }

    #[test]
    fn loads_from_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hybrid.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
    }
}
