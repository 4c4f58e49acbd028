use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },

    #[error("invalid TOML in {path}: {source}")]
    Parse { path: String, #[source] source: toml::de::Error },

    #[error("unrecognized config key `{0}`")]
    UnknownKey(String),

    #[error("config key `{0}` looks like a secret; set it via an environment variable instead")]
    SecretInConfig(String),
}
