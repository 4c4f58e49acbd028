pub mod batcher;
pub mod config;
pub mod embedder;
pub mod error;

pub use batcher::EmbeddingBatcher;
pub use config::{default_stdio_config, BatcherConfig};
pub use embedder::{
    Embedder, EmbedderInfo, OnnxHttpConfig, OnnxHttpEmbedder, OnnxStdIoConfig, OnnxStdIoEmbedder, ProviderKind,
};
pub use error::EmbedderError;
