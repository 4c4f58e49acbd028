use crate::error::ConfigError;

/// Recognized key surface, expressed as a small tree so the unknown-key
/// diagnostic can name the full path — `toml`/`serde`'s own
/// `deny_unknown_fields` error reports only the leaf key.
enum Schema {
    Leaf,
    Section(&'static [(&'static str, Schema)]),
    /// Section is recognized, but its contents are not (e.g. `remote.*`).
    Open,
}

const UTILITY_SCHEMA: Schema = Schema::Section(&[
    ("provider", Schema::Leaf),
    ("model", Schema::Leaf),
    ("timeout", Schema::Leaf),
    ("description_batch_size", Schema::Leaf),
    ("description_batch_mode", Schema::Leaf),
    ("description_chunks_per_request", Schema::Leaf),
]);

const ENHANCEMENT_SCHEMA: Schema = Schema::Section(&[
    ("enabled", Schema::Leaf),
    ("utility", UTILITY_SCHEMA),
    ("synthesis", UTILITY_SCHEMA),
]);

const EMBEDDING_SCHEMA: Schema = Schema::Section(&[
    ("provider", Schema::Leaf),
    ("model", Schema::Leaf),
    ("dimension", Schema::Leaf),
    ("batch_size", Schema::Leaf),
    ("batch_timeout_ms", Schema::Leaf),
    ("batch_memory_limit_mb", Schema::Leaf),
]);

const SEARCH_SCHEMA: Schema = Schema::Section(&[
    ("semantic_weight", Schema::Leaf),
    ("rrf_k", Schema::Leaf),
    ("multi_hop_enabled", Schema::Leaf),
    ("multi_hop_depth", Schema::Leaf),
    ("output_format", Schema::Leaf),
    ("limit", Schema::Leaf),
    ("expand_query_by_default", Schema::Leaf),
    ("synthesize_by_default", Schema::Leaf),
    ("default_extensions", Schema::Leaf),
    ("default_path_filter", Schema::Leaf),
    ("enhancement", ENHANCEMENT_SCHEMA),
]);

const INDEXING_SCHEMA: Schema = Schema::Section(&[
    ("exclude", Schema::Leaf),
    ("include_extensions", Schema::Leaf),
    ("max_file_size", Schema::Leaf),
    ("chunk_size", Schema::Leaf),
    ("chunk_overlap", Schema::Leaf),
    ("max_concurrent_tasks", Schema::Leaf),
]);

const STORAGE_SCHEMA: Schema = Schema::Section(&[("index_path", Schema::Leaf), ("cache_path", Schema::Leaf)]);

const WATCH_SCHEMA: Schema = Schema::Section(&[("debounce_ms", Schema::Leaf)]);

const LOGGING_SCHEMA: Schema = Schema::Section(&[("level", Schema::Leaf)]);

const ROOT_SCHEMA: Schema = Schema::Section(&[
    ("embedding", EMBEDDING_SCHEMA),
    ("search", SEARCH_SCHEMA),
    ("indexing", INDEXING_SCHEMA),
    ("storage", STORAGE_SCHEMA),
    ("watch", WATCH_SCHEMA),
    ("logging", LOGGING_SCHEMA),
    ("remote", Schema::Open),
]);

/// Walks `value` against the recognized key tree and returns the full
/// dotted path of the first key not found in it.
pub fn validate_known_keys(value: &toml::Value) -> Result<(), ConfigError> {
    walk(value, &ROOT_SCHEMA, "")
}

fn walk(value: &toml::Value, schema: &Schema, path: &str) -> Result<(), ConfigError> {
    match schema {
        Schema::Open => Ok(()),
        Schema::Leaf => Ok(()),
        Schema::Section(children) => {
            let table = match value.as_table() {
                Some(table) => table,
                None => return Ok(()),
            };
            for (key, child_value) in table {
                let child_schema = children.iter().find(|(name, _)| *name == key).map(|(_, schema)| schema);
                let full_path = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                match child_schema {
                    Some(schema) => walk(child_value, schema, &full_path)?,
                    None => return Err(ConfigError::UnknownKey(full_path)),
                }
            }
            Ok(())
        }
    }
}

const SECRET_MARKERS: &[&str] = &["api_key", "apikey", "secret", "token"];

/// Scans the raw TOML tree for key names that look like credentials.
/// API keys must come from environment variables, never config files.
pub fn scan_for_secrets(value: &toml::Value) -> Result<(), ConfigError> {
    walk_secrets(value, "")
}

fn walk_secrets(value: &toml::Value, path: &str) -> Result<(), ConfigError> {
    if let Some(table) = value.as_table() {
        for (key, child) in table {
            let full_path = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
            let lowered = key.to_lowercase();
            if SECRET_MARKERS.iter().any(|marker| lowered.contains(marker)) {
                return Err(ConfigError::SecretInConfig(full_path));
            }
            walk_secrets(child, &full_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_fully_recognized_tree() {
        let value: toml::Value = toml::from_str(
            "[embedding]\nprovider = \"onnx_stdio\"\n[search.enhancement.utility]\nprovider = \"http\"\n",
        )
        .unwrap();
        assert!(validate_known_keys(&value).is_ok());
    }

    #[test]
    fn rejects_an_unknown_nested_key_with_full_path() {
        let value: toml::Value = toml::from_str("[search]\nbogus_key = 1\n").unwrap();
        let err = validate_known_keys(&value).unwrap_err();
        assert_eq!(err.to_string(), ConfigError::UnknownKey("search.bogus_key".into()).to_string());
    }

    #[test]
    fn remote_section_contents_are_not_validated() {
        let value: toml::Value = toml::from_str("[remote]\nanything_goes = true\n").unwrap();
        assert!(validate_known_keys(&value).is_ok());
    }

    #[test]
    fn detects_api_key_like_keys_anywhere_in_the_tree() {
        let value: toml::Value = toml::from_str("[embedding]\napi_key = \"sk-x\"\n").unwrap();
        let err = scan_for_secrets(&value).unwrap_err();
        assert_eq!(err.to_string(), ConfigError::SecretInConfig("embedding.api_key".into()).to_string());
    }

    #[test]
    fn allows_config_with_no_secret_like_keys() {
        let value: toml::Value = toml::from_str("[embedding]\nprovider = \"onnx_stdio\"\n").unwrap();
        assert!(scan_for_secrets(&value).is_ok());
    }
}
