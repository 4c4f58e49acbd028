//! Embedding providers. Concrete models are out of scope here — what
//! matters is the `Embedder` contract itself, so the chain and the batcher
//! (and their tests) don't care which backend is plugged in.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use ndarray::Array2;
use ort::{session::Session, value::Tensor, Error as OrtError};
use provider_chain::ProviderMeta;
use tokenizers::{Encoding, Tokenizer};

use crate::error::EmbedderError;

/// Identifies the backing implementation that powers an embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OnnxStdIo,
    OnnxHttp,
}

/// Static metadata describing a particular embedder instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub id: String,
    pub provider: ProviderKind,
    pub embedding_model_id: String,
    pub dimension: usize,
}

/// Core interface for all embedder implementations. `embed`/`embed_batch`
/// are the contract the batcher and the chain operate against; `id`/
/// `is_available` (via [`ProviderMeta`]) are what the chain uses to skip
/// and report failures.
pub trait Embedder: ProviderMeta + Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;
    fn info(&self) -> &EmbedderInfo;
}

/// Configuration for a local ONNX embedder driven through the ONNX
/// Runtime shared library.
#[derive(Debug, Clone)]
pub struct OnnxStdIoConfig {
    pub model_path: PathBuf,
    pub runtime_library_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimension: usize,
    pub max_input_length: usize,
    pub embedding_model_id: String,
}

pub struct OnnxStdIoEmbedder {
    info: EmbedderInfo,
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    pad_id: i64,
    max_input_length: usize,
}

impl std::fmt::Debug for OnnxStdIoEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxStdIoEmbedder").field("info", &self.info).finish()
    }
}

struct PreparedBatch {
    input_ids: Tensor<i64>,
    attention_mask: Tensor<i64>,
    attention_rows: Vec<Vec<i64>>,
}

static ORT_RUNTIME_PATH: OnceLock<PathBuf> = OnceLock::new();

impl OnnxStdIoEmbedder {
    pub fn new(config: OnnxStdIoConfig) -> Result<Self, EmbedderError> {
        if config.dimension == 0 {
            return Err(EmbedderError::InvalidInput("dimension must be greater than zero".into()));
        }
        if config.max_input_length == 0 {
            return Err(EmbedderError::InvalidInput(
                "max_input_length must be greater than zero".into(),
            ));
        }

        let runtime_library_path =
            resolve_existing_path(&config.runtime_library_path, "ONNX Runtime shared library")?;
        ensure_ort_initialized(&runtime_library_path)?;

        let model_path = resolve_existing_path(&config.model_path, "ONNX model")?;
        let tokenizer_path = resolve_existing_path(&config.tokenizer_path, "tokenizer config")?;

        let session = Session::builder()
            .map_err(|err| map_ort_error("create session builder", err))?
            .commit_from_file(&model_path)
            .map_err(|err| map_ort_error("load ONNX model", err))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| map_tokenizer_error("load tokenizer", err))?;

        let pad_id = tokenizer.token_to_id("<pad>").ok_or_else(|| {
            EmbedderError::InvalidInput(format!(
                "tokenizer `{}` does not declare a `<pad>` token",
                tokenizer_path.display()
            ))
        })? as i64;

        let info = EmbedderInfo {
            id: "onnx-stdio".to_string(),
            provider: ProviderKind::OnnxStdIo,
            embedding_model_id: config.embedding_model_id,
            dimension: config.dimension,
        };

        Ok(Self {
            info,
            session: Mutex::new(session),
            tokenizer,
            pad_id,
            max_input_length: config.max_input_length,
        })
    }

    fn prepare_encodings(&self, texts: &[&str]) -> Result<Vec<Encoding>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = texts
            .iter()
            .map(|t| self.tokenizer.encode(*t, true))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| map_tokenizer_error("tokenize inputs", err))?;

        let max_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        if max_len > self.max_input_length {
            return Err(EmbedderError::InvalidInput(format!(
                "input exceeds max length of {} tokens, actual length: {}",
                self.max_input_length, max_len
            )));
        }
        Ok(encodings)
    }

    fn build_input_tensors(&self, encodings: &[Encoding]) -> Result<PreparedBatch, EmbedderError> {
        let batch = encodings.len();
        let seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);

        let mut input_ids = Array2::<i64>::zeros((batch, seq_len));
        let mut attention_mask = Array2::<i64>::zeros((batch, seq_len));
        let mut attention_rows = Vec::with_capacity(batch);

        for (row, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for (col, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[(row, col)] = id as i64;
                attention_mask[(row, col)] = m as i64;
            }
            for col in ids.len()..seq_len {
                input_ids[(row, col)] = self.pad_id;
                attention_mask[(row, col)] = 0;
            }
            attention_rows.push((0..seq_len).map(|i| attention_mask[(row, i)]).collect::<Vec<i64>>());
        }

        let input_ids = Tensor::from_array(input_ids).map_err(|err| map_ort_error("prepare input_ids", err))?;
        let attention_mask =
            Tensor::from_array(attention_mask).map_err(|err| map_ort_error("prepare attention_mask", err))?;

        Ok(PreparedBatch { input_ids, attention_mask, attention_rows })
    }

    fn run_session(
        &self,
        input_ids: Tensor<i64>,
        attention_mask: Tensor<i64>,
    ) -> Result<(Vec<f32>, usize, usize, usize), EmbedderError> {
        let mut session = self.session.lock().unwrap();
        let outputs = session
            .run(ort::inputs![input_ids, attention_mask])
            .map_err(|err| map_ort_error("execute ONNX session", err))?;

        let output = &outputs[0];
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|err| map_ort_error("extract output tensor", err))?;

        if shape.len() != 3 {
            return Err(EmbedderError::Unknown {
                msg: format!("model output must be rank-3 [batch, seq_len, hidden], got shape {:?}", shape),
            });
        }
        let batch: usize = shape[0].try_into().unwrap();
        let seq_len: usize = shape[1].try_into().unwrap();
        let hidden: usize = shape[2].try_into().unwrap();
        Ok((data.to_vec(), batch, seq_len, hidden))
    }

    fn mean_pool(
        &self,
        data: &[f32],
        attention_rows: &[Vec<i64>],
        seq_len: usize,
        hidden: usize,
    ) -> Vec<Vec<f32>> {
        let batch = attention_rows.len();
        let mut results = Vec::with_capacity(batch);
        for b in 0..batch {
            let mut sum = vec![0f32; hidden];
            let mut count = 0f32;
            for t in 0..seq_len {
                if attention_rows[b][t] == 1 {
                    let base = (b * seq_len + t) * hidden;
                    for h in 0..hidden {
                        sum[h] += data[base + h];
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                for v in &mut sum {
                    *v /= count;
                }
            }
            results.push(sum);
        }
        results
    }
}

impl ProviderMeta for OnnxStdIoEmbedder {
    fn id(&self) -> &str {
        &self.info.id
    }
    fn is_available(&self) -> bool {
        true
    }
}

impl Embedder for OnnxStdIoEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if text.is_empty() {
            return Err(EmbedderError::InvalidInput("text must not be empty".into()));
        }
        let encodings = self.prepare_encodings(&[text])?;
        let prepared = self.build_input_tensors(&encodings)?;
        let (raw_data, batch, seq_len, hidden) = self.run_session(prepared.input_ids, prepared.attention_mask)?;
        if batch != 1 {
            return Err(EmbedderError::Unknown {
                msg: format!("model returned unexpected batch size {batch}, expected 1"),
            });
        }
        let pooled = self.mean_pool(&raw_data, &prepared.attention_rows, seq_len, hidden);
        let vector = pooled.into_iter().next().unwrap_or_default();
        if vector.len() != self.info.dimension {
            return Err(EmbedderError::DimensionMismatch {
                expected: self.info.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = self.prepare_encodings(texts)?;
        let prepared = self.build_input_tensors(&encodings)?;
        let expected_seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        let (raw_data, batch, seq_len_from_model, hidden) =
            self.run_session(prepared.input_ids, prepared.attention_mask)?;
        if batch != prepared.attention_rows.len() || seq_len_from_model != expected_seq_len {
            return Err(EmbedderError::Unknown {
                msg: "model output shape did not match prepared batch".into(),
            });
        }
        Ok(self.mean_pool(&raw_data, &prepared.attention_rows, expected_seq_len, hidden))
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// Configuration for an ONNX embedder exposed through an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct OnnxHttpConfig {
    pub endpoint: String,
    pub auth_token: Option<String>,
    pub dimension: usize,
    pub max_input_length: usize,
    pub embedding_model_id: String,
}

/// Deterministic pseudo-embedder standing in for the real HTTP-backed
/// model (the concrete provider is out of scope — see module docs).
#[derive(Debug, Clone)]
pub struct OnnxHttpEmbedder {
    info: EmbedderInfo,
    endpoint: String,
    auth_token: Option<String>,
    max_input_length: usize,
    base_seed: u64,
}

impl OnnxHttpEmbedder {
    pub fn new(config: OnnxHttpConfig) -> Result<Self, EmbedderError> {
        if config.dimension == 0 {
            return Err(EmbedderError::InvalidInput("dimension must be greater than zero".into()));
        }
        if config.auth_token.is_none() && config.endpoint.starts_with("https://api.") {
            return Err(EmbedderError::ApiKeyMissing { provider: "onnx-http".into() });
        }
        let unique = match &config.auth_token {
            Some(token) => format!("{}::{}", config.endpoint, token),
            None => config.endpoint.clone(),
        };
        let base_seed = compute_seed(&unique, &config.embedding_model_id);
        Ok(Self {
            info: EmbedderInfo {
                id: "onnx-http".to_string(),
                provider: ProviderKind::OnnxHttp,
                embedding_model_id: config.embedding_model_id,
                dimension: config.dimension,
            },
            endpoint: config.endpoint,
            auth_token: config.auth_token,
            max_input_length: config.max_input_length,
            base_seed,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut output = Vec::with_capacity(self.info.dimension);
        for index in 0..self.info.dimension {
            let mut hasher = DefaultHasher::new();
            self.base_seed.hash(&mut hasher);
            index.hash(&mut hasher);
            text.hash(&mut hasher);
            output.push(normalize_hash(hasher.finish()));
        }
        output
    }
}

impl ProviderMeta for OnnxHttpEmbedder {
    fn id(&self) -> &str {
        &self.info.id
    }
    fn is_available(&self) -> bool {
        self.auth_token.is_some() || !self.endpoint.starts_with("https://api.")
    }
}

impl Embedder for OnnxHttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if text.is_empty() {
            return Err(EmbedderError::InvalidInput("text must not be empty".into()));
        }
        let actual_length = text.chars().count();
        if actual_length > self.max_input_length {
            return Err(EmbedderError::InvalidInput(format!(
                "input exceeds max length of {} tokens, actual length: {actual_length}",
                self.max_input_length
            )));
        }
        Ok(self.generate_embedding(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

fn ensure_ort_initialized(runtime_library_path: &Path) -> Result<(), EmbedderError> {
    if let Some(existing) = ORT_RUNTIME_PATH.get() {
        if existing != runtime_library_path {
            return Err(EmbedderError::InvalidInput(format!(
                "ONNX Runtime already initialized with library `{}`; cannot reinitialize with `{}`",
                existing.display(),
                runtime_library_path.display()
            )));
        }
    } else {
        let _ = ORT_RUNTIME_PATH.set(runtime_library_path.to_path_buf());
    }

    ort::init_from(runtime_library_path.to_string_lossy().to_string())
        .with_name("hybrid-search-engine")
        .commit()
        .map_err(|err| map_ort_error("initialize ONNX Runtime environment", err))?;
    Ok(())
}

fn resolve_existing_path(path: &Path, description: &str) -> Result<PathBuf, EmbedderError> {
    fs::metadata(path).map_err(|_| EmbedderError::ModelNotFound {
        name: format!("{description} `{}`", path.display()),
    })?;
    path.canonicalize().map_err(|err| EmbedderError::Unknown {
        msg: format!("failed to canonicalize {description} `{}`: {err}", path.display()),
    })
}

fn map_ort_error(context: &str, err: OrtError) -> EmbedderError {
    EmbedderError::Unknown { msg: format!("{context} failed: {err}") }
}

fn map_tokenizer_error(context: &str, err: tokenizers::Error) -> EmbedderError {
    EmbedderError::Unknown { msg: format!("{context} failed: {err}") }
}

fn compute_seed(unique: &str, embedding_model_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    unique.hash(&mut hasher);
    embedding_model_id.hash(&mut hasher);
    hasher.finish()
}

fn normalize_hash(value: u64) -> f32 {
    const SCALE: f64 = 2.0;
    let normalized = (value as f64) / (u64::MAX as f64);
    (normalized * SCALE - 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_embedder_is_deterministic_and_dimension_correct() {
        let embedder = OnnxHttpEmbedder::new(OnnxHttpConfig {
            endpoint: "http://localhost:9000".into(),
            auth_token: None,
            dimension: 16,
            max_input_length: 1000,
            embedding_model_id: "test-model".into(),
        })
        .unwrap();
        let a = embedder.embed("hello world").unwrap();
        let b = embedder.embed("hello world").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn http_embedder_rejects_empty_text() {
        let embedder = OnnxHttpEmbedder::new(OnnxHttpConfig {
            endpoint: "http://localhost:9000".into(),
            auth_token: None,
            dimension: 4,
            max_input_length: 1000,
            embedding_model_id: "test-model".into(),
        })
        .unwrap();
        assert!(matches!(embedder.embed(""), Err(EmbedderError::InvalidInput(_))));
    }

    #[test]
    fn https_api_endpoint_without_token_is_missing_api_key() {
        let err = OnnxHttpEmbedder::new(OnnxHttpConfig {
            endpoint: "https://api.example.com/embed".into(),
            auth_token: None,
            dimension: 4,
            max_input_length: 1000,
            embedding_model_id: "test-model".into(),
        })
        .unwrap_err();
        assert!(matches!(err, EmbedderError::ApiKeyMissing { .. }));
    }

    #[test]
    fn embed_batch_preserves_order_and_length() {
        let embedder = OnnxHttpEmbedder::new(OnnxHttpConfig {
            endpoint: "http://localhost:9000".into(),
            auth_token: None,
            dimension: 4,
            max_input_length: 1000,
            embedding_model_id: "test-model".into(),
        })
        .unwrap();
        let texts = ["a", "b", "c"];
        let vecs = embedder.embed_batch(&texts).unwrap();
        assert_eq!(vecs.len(), 3);
        assert_eq!(vecs[0], embedder.embed("a").unwrap());
        assert_eq!(vecs[2], embedder.embed("c").unwrap());
    }
}
