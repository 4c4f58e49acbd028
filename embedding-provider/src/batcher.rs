//! Coalesces many concurrent embed requests into fewer calls against the
//! underlying provider chain, trading a small amount of latency for much
//! better throughput when a local model is doing the work.
//!
//! A single background task owns the pending-request buffer; callers only
//! ever see a cheap handle and an async `embed()` that resolves once their
//! text has been folded into a flushed batch.

use std::sync::Arc;
use std::time::Duration;

use provider_chain::Chain;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::BatcherConfig;
use crate::embedder::Embedder;
use crate::error::EmbedderError;

enum Command {
    Embed { text: String, reply: oneshot::Sender<Result<Vec<f32>, EmbedderError>> },
    Flush,
    Shutdown,
}

struct PendingRequest {
    text: String,
    reply: oneshot::Sender<Result<Vec<f32>, EmbedderError>>,
}

/// Handle to a running batcher. Cloning shares the same background task
/// and buffer; dropping all handles lets the task exit once its queue
/// drains.
#[derive(Clone)]
pub struct EmbeddingBatcher {
    tx: mpsc::UnboundedSender<Command>,
}

impl EmbeddingBatcher {
    /// Spawns the background coalescing task and returns a handle to it.
    pub fn spawn(chain: Arc<Chain<dyn Embedder>>, config: BatcherConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(chain, config, rx));
        (Self { tx }, handle)
    }

    /// Submits a single text for embedding, returning once its batch has
    /// been flushed and the provider has replied.
    pub async fn embed(&self, text: impl Into<String>) -> Result<Vec<f32>, EmbedderError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Embed { text: text.into(), reply: reply_tx })
            .map_err(|_| EmbedderError::Unknown { msg: "batcher task has shut down".into() })?;
        reply_rx
            .await
            .map_err(|_| EmbedderError::Unknown { msg: "batcher dropped reply channel".into() })?
    }

    /// Forces an immediate flush of whatever is currently buffered,
    /// without waiting for the batch size or idle timeout to trigger it.
    pub fn flush(&self) {
        let _ = self.tx.send(Command::Flush);
    }

    /// Fails every still-pending request with a terminal shutdown error
    /// and stops the background task; no further requests are accepted.
    pub async fn shutdown(self, handle: JoinHandle<()>) {
        let _ = self.tx.send(Command::Shutdown);
        let _ = handle.await;
    }
}

async fn run(chain: Arc<Chain<dyn Embedder>>, config: BatcherConfig, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut pending: Vec<PendingRequest> = Vec::new();
    let mut total_bytes: usize = 0;

    loop {
        let idle = tokio::time::sleep(Duration::from_millis(config.idle_timeout_ms));
        tokio::pin!(idle);

        tokio::select! {
            maybe_cmd = rx.recv() => {
                match maybe_cmd {
                    Some(Command::Embed { text, reply }) => {
                        total_bytes += text.len();
                        pending.push(PendingRequest { text, reply });
                        if pending.len() >= config.batch_size || total_bytes >= config.memory_limit_bytes {
                            flush_batch(&chain, &mut pending, &mut total_bytes).await;
                        }
                    }
                    Some(Command::Flush) => {
                        flush_batch(&chain, &mut pending, &mut total_bytes).await;
                    }
                    Some(Command::Shutdown) | None => {
                        fail_pending(&mut pending, &mut total_bytes);
                        break;
                    }
                }
            }
            _ = &mut idle, if !pending.is_empty() => {
                flush_batch(&chain, &mut pending, &mut total_bytes).await;
            }
        }
    }
}

async fn flush_batch(chain: &Arc<Chain<dyn Embedder>>, pending: &mut Vec<PendingRequest>, total_bytes: &mut usize) {
    if pending.is_empty() {
        return;
    }
    let batch = std::mem::take(pending);
    *total_bytes = 0;

    let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
    let chain = Arc::clone(chain);
    let result = tokio::task::spawn_blocking(move || {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        chain.call(|embedder| embedder.embed_batch(&refs))
    })
    .await;

    match result {
        Ok(Ok(vectors)) if vectors.len() == batch.len() => {
            for (request, vector) in batch.into_iter().zip(vectors) {
                let _ = request.reply.send(Ok(vector));
            }
        }
        Ok(Ok(_)) => {
            let err = EmbedderError::Unknown { msg: "provider returned a mismatched batch size".into() };
            for request in batch {
                let _ = request.reply.send(Err(clone_error(&err)));
            }
        }
        Ok(Err(all_failed)) => {
            let err = EmbedderError::NotAvailable { reason: all_failed.to_string() };
            for request in batch {
                let _ = request.reply.send(Err(clone_error(&err)));
            }
        }
        Err(join_err) => {
            let err = EmbedderError::Unknown { msg: format!("embedding task panicked: {join_err}") };
            for request in batch {
                let _ = request.reply.send(Err(clone_error(&err)));
            }
        }
    }
}

/// Fails every buffered request with a terminal shutdown error instead of
/// attempting to embed it; used when the batcher is stopping and no
/// provider call should be attempted on its behalf.
fn fail_pending(pending: &mut Vec<PendingRequest>, total_bytes: &mut usize) {
    *total_bytes = 0;
    for request in std::mem::take(pending) {
        let _ = request.reply.send(Err(EmbedderError::Unknown { msg: "batcher shut down".into() }));
    }
}

fn clone_error(err: &EmbedderError) -> EmbedderError {
    match err {
        EmbedderError::InvalidInput(s) => EmbedderError::InvalidInput(s.clone()),
        EmbedderError::NotAvailable { reason } => EmbedderError::NotAvailable { reason: reason.clone() },
        EmbedderError::ModelNotFound { name } => EmbedderError::ModelNotFound { name: name.clone() },
        EmbedderError::DimensionMismatch { expected, actual } => {
            EmbedderError::DimensionMismatch { expected: *expected, actual: *actual }
        }
        EmbedderError::NetworkError { msg } => EmbedderError::NetworkError { msg: msg.clone() },
        EmbedderError::ApiKeyMissing { provider } => EmbedderError::ApiKeyMissing { provider: provider.clone() },
        EmbedderError::DownloadFailed { reason } => EmbedderError::DownloadFailed { reason: reason.clone() },
        EmbedderError::Unknown { msg } => EmbedderError::Unknown { msg: msg.clone() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::{EmbedderInfo, ProviderKind};
    use provider_chain::ProviderMeta;

    struct CountingEmbedder {
        info: EmbedderInfo,
        batch_calls: std::sync::atomic::AtomicUsize,
    }

    impl ProviderMeta for CountingEmbedder {
        fn id(&self) -> &str {
            &self.info.id
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    impl Embedder for CountingEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            self.embed_batch(&[text]).map(|mut v| v.remove(0))
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            self.batch_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }

        fn info(&self) -> &EmbedderInfo {
            &self.info
        }
    }

    fn counting_chain() -> (Arc<CountingEmbedder>, Arc<Chain<dyn Embedder>>) {
        let embedder = Arc::new(CountingEmbedder {
            info: EmbedderInfo {
                id: "counting".into(),
                provider: ProviderKind::OnnxHttp,
                embedding_model_id: "test".into(),
                dimension: 1,
            },
            batch_calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let chain: Arc<Chain<dyn Embedder>> = Arc::new(Chain::new(vec![embedder.clone() as Arc<dyn Embedder>]));
        (embedder, chain)
    }

    #[tokio::test]
    async fn flushes_on_idle_timeout_and_returns_correct_result() {
        let (_embedder, chain) = counting_chain();
        let config = BatcherConfig { batch_size: 32, idle_timeout_ms: 20, memory_limit_bytes: 10 * 1024 * 1024 };
        let (batcher, handle) = EmbeddingBatcher::spawn(chain, config);

        let result = batcher.embed("hello").await.unwrap();
        assert_eq!(result, vec![5.0]);

        batcher.shutdown(handle).await;
    }

    #[tokio::test]
    async fn flushes_immediately_once_batch_size_is_reached() {
        let (embedder, chain) = counting_chain();
        let config = BatcherConfig { batch_size: 2, idle_timeout_ms: 5_000, memory_limit_bytes: 10 * 1024 * 1024 };
        let (batcher, handle) = EmbeddingBatcher::spawn(chain, config);

        let b1 = batcher.clone();
        let b2 = batcher.clone();
        let (r1, r2) = tokio::join!(b1.embed("aa"), b2.embed("bbb"));
        assert_eq!(r1.unwrap(), vec![2.0]);
        assert_eq!(r2.unwrap(), vec![3.0]);
        assert_eq!(embedder.batch_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        batcher.shutdown(handle).await;
    }

    #[tokio::test]
    async fn explicit_flush_releases_a_partial_batch() {
        let (_embedder, chain) = counting_chain();
        let config = BatcherConfig { batch_size: 100, idle_timeout_ms: 5_000, memory_limit_bytes: 10 * 1024 * 1024 };
        let (batcher, handle) = EmbeddingBatcher::spawn(chain, config);

        let fut = batcher.embed("x");
        batcher.flush();
        let result = fut.await.unwrap();
        assert_eq!(result, vec![1.0]);

        batcher.shutdown(handle).await;
    }

    #[tokio::test]
    async fn shutdown_fails_still_pending_requests_instead_of_embedding_them() {
        let (embedder, chain) = counting_chain();
        let config = BatcherConfig { batch_size: 100, idle_timeout_ms: 5_000, memory_limit_bytes: 10 * 1024 * 1024 };
        let (batcher, handle) = EmbeddingBatcher::spawn(chain, config);

        let caller = batcher.clone();
        let pending = tokio::spawn(async move { caller.embed("never flushed").await });
        tokio::task::yield_now().await;
        batcher.shutdown(handle).await;

        assert!(pending.await.unwrap().is_err());
        assert_eq!(embedder.batch_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
