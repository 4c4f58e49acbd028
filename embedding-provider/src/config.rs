//! Default tunables for the embedding batcher and the local ONNX embedder.

use std::path::PathBuf;

use crate::embedder::OnnxStdIoConfig;

/// Shared defaults so the CLI and tests stay in sync; paths are resolved
/// relative to this crate's directory so they work regardless of the
/// caller's current working directory.
pub fn default_stdio_config() -> OnnxStdIoConfig {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    OnnxStdIoConfig {
        model_path: base.join("models/default/model.onnx"),
        tokenizer_path: base.join("models/default/tokenizer.json"),
        runtime_library_path: base.join("models/default/onnxruntime.so"),
        dimension: 384,
        max_input_length: 512,
        embedding_model_id: "default-onnx".into(),
    }
}

/// Maximum number of pending requests coalesced into a single provider call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// How long the batcher waits for more requests before flushing a partial batch.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 150;

/// Total input byte size at which a partial batch is flushed early.
pub const DEFAULT_MEMORY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct BatcherConfig {
    pub batch_size: usize,
    pub idle_timeout_ms: u64,
    pub memory_limit_bytes: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
        }
    }
}
