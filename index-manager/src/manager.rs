use std::sync::Arc;

use chunk_model::Chunk;
use chunking_store::{ChunkStore, VectorStore};
use embedding_provider::EmbeddingBatcher;
use tokio::sync::Semaphore;

use crate::cancellation::CancellationToken;
use crate::error::IndexError;
use crate::parser::{ParseOutcome, ParseResult, Parser};

/// Outcome of a single `reindex` call.
#[derive(Debug, Clone, Default)]
pub struct ReindexReport {
    pub path: String,
    pub chunks_total: usize,
    pub chunks_reused: usize,
    pub chunks_embedded: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IndexStatistics {
    pub total_chunks: usize,
    pub total_vectors: usize,
}

/// Single-writer coordinator for one index directory: owns the chunk
/// store, vector store, and embedding batcher, and drives the ingest
/// pipeline over them.
pub struct IndexManager {
    chunk_store: Arc<dyn ChunkStore>,
    vector_store: Arc<dyn VectorStore>,
    batcher: EmbeddingBatcher,
    semaphore: Arc<Semaphore>,
}

impl IndexManager {
    pub fn new(
        chunk_store: Arc<dyn ChunkStore>,
        vector_store: Arc<dyn VectorStore>,
        batcher: EmbeddingBatcher,
        max_concurrent_tasks: usize,
    ) -> Self {
        Self {
            chunk_store,
            vector_store,
            batcher,
            semaphore: Arc::new(Semaphore::new(max_concurrent_tasks.max(1))),
        }
    }

    /// True if `path` has never been indexed, or was indexed with a
    /// different file hash.
    pub fn needs_indexing(&self, path: &str, file_hash: &str) -> Result<bool, IndexError> {
        let stored = self.chunk_store.get_file_hash(path)?;
        Ok(stored.as_deref() != Some(file_hash))
    }

    /// The central ingest mutation for one file. Reuses vectors for chunks
    /// whose `content_hash` matches a chunk already in the store (even
    /// under a different id or path), embeds only genuinely new or
    /// changed chunks, and leaves the store in an all-or-nothing state
    /// for this file.
    pub async fn reindex(
        &self,
        path: &str,
        file_hash: &str,
        parse_result: ParseResult,
    ) -> Result<ReindexReport, IndexError> {
        let new_hashes: Vec<String> = parse_result.chunks.iter().map(|c| c.content_hash.clone()).collect();
        let reusable = self.chunk_store.get_by_content_hashes(&new_hashes)?;

        let mut to_store: Vec<Chunk> = Vec::with_capacity(parse_result.chunks.len());
        let mut vector_pairs: Vec<(String, Vec<f32>)> = Vec::new();
        let mut reused = 0usize;
        let mut embedded = 0usize;

        for chunk in parse_result.chunks {
            match reusable.get(&chunk.content_hash) {
                Some(prior) => {
                    reused += 1;
                    if let Some(vector) = self.vector_store.get(&prior.id)? {
                        if prior.id != chunk.id {
                            vector_pairs.push((chunk.id.clone(), vector));
                        }
                    } else {
                        let embedded_vector = self.batcher.embed(chunk.content.clone()).await?;
                        vector_pairs.push((chunk.id.clone(), embedded_vector));
                        embedded += 1;
                    }
                    to_store.push(chunk);
                }
                None => {
                    let vector = self.batcher.embed(chunk.content.clone()).await?;
                    vector_pairs.push((chunk.id.clone(), vector));
                    embedded += 1;
                    to_store.push(chunk);
                }
            }
        }

        let kept_ids: std::collections::HashSet<&str> = to_store.iter().map(|c| c.id.as_str()).collect();
        for old in self.chunk_store.get_by_path(path)? {
            if !kept_ids.contains(old.id.as_str()) {
                self.chunk_store.delete(&old.id)?;
                self.vector_store.delete(&old.id)?;
            }
        }

        self.chunk_store.insert_batch(&to_store)?;
        self.vector_store.insert_batch(&vector_pairs)?;
        self.chunk_store.set_file_hash(path, file_hash)?;

        Ok(ReindexReport { path: path.to_string(), chunks_total: to_store.len(), chunks_reused: reused, chunks_embedded: embedded })
    }

    /// Marks `path` processed without touching its chunks — used when
    /// parsing produced nothing (parse failure, or a genuinely empty
    /// file) but the file still needs to be recognized as up to date.
    pub fn record_indexed(&self, path: &str, file_hash: &str) -> Result<(), IndexError> {
        self.chunk_store.set_file_hash(path, file_hash)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), IndexError> {
        self.chunk_store.clear()?;
        self.vector_store.clear()?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), IndexError> {
        self.vector_store.save()?;
        Ok(())
    }

    pub fn statistics(&self) -> Result<IndexStatistics, IndexError> {
        Ok(IndexStatistics { total_chunks: self.chunk_store.count()?, total_vectors: self.vector_store.size() })
    }

    /// Ingests many files concurrently, bounded by the manager's worker
    /// semaphore. Cancellation is checked before each file starts; files
    /// already in flight complete.
    pub async fn index_files(
        &self,
        files: Vec<(String, Vec<u8>, String)>,
        parser: Arc<dyn Parser>,
        cancellation: CancellationToken,
    ) -> Vec<Result<ReindexReport, IndexError>> {
        let mut handles = Vec::with_capacity(files.len());

        for (path, content, file_hash) in files {
            if cancellation.is_cancelled() {
                handles.push(tokio::spawn(async { Err(IndexError::Cancelled) }));
                continue;
            }
            let semaphore = Arc::clone(&self.semaphore);
            let parser = Arc::clone(&parser);
            let cancellation = cancellation.clone();
            let chunk_store = Arc::clone(&self.chunk_store);
            let vector_store = Arc::clone(&self.vector_store);
            let batcher = self.batcher.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore is never closed");
                if cancellation.is_cancelled() {
                    return Err(IndexError::Cancelled);
                }
                let manager = IndexManager {
                    chunk_store,
                    vector_store,
                    batcher,
                    semaphore: Arc::new(Semaphore::new(1)),
                };
                let parsed = parser.parse(&content, &path, &file_hash);
                if parsed.outcome == Some(ParseOutcome::Failure) {
                    manager.record_indexed(&path, &file_hash)?;
                    return Err(IndexError::Parse { path });
                }
                manager.reindex(&path, &file_hash, parsed).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap_or_else(|join_err| {
                Err(IndexError::Store(chunking_store::StoreError::VectorIndex(format!(
                    "indexing task panicked: {join_err}"
                ))))
            }));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_model::hash::sha256_hex;
    use chunk_model::ChunkKind;
    use chunking_store::{HnswParams, HnswVectorStore, SqliteChunkStore};
    use embedding_provider::{BatcherConfig, Embedder, EmbedderInfo, ProviderKind};
    use provider_chain::{Chain, ProviderMeta};

    struct StubEmbedder {
        info: EmbedderInfo,
    }

    impl ProviderMeta for StubEmbedder {
        fn id(&self) -> &str {
            &self.info.id
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    impl Embedder for StubEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, embedding_provider::EmbedderError> {
            Ok(vec![text.len() as f32, 0.0])
        }
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, embedding_provider::EmbedderError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }
        fn info(&self) -> &EmbedderInfo {
            &self.info
        }
    }

    fn manager() -> (IndexManager, tokio::task::JoinHandle<()>) {
        let chunk_store: Arc<dyn ChunkStore> = Arc::new(SqliteChunkStore::open_in_memory().unwrap());
        let vector_store: Arc<dyn VectorStore> =
            Arc::new(HnswVectorStore::new(tempfile::tempdir().unwrap().into_path(), HnswParams::default()));
        let embedder = Arc::new(StubEmbedder {
            info: EmbedderInfo { id: "stub".into(), provider: ProviderKind::OnnxHttp, embedding_model_id: "t".into(), dimension: 2 },
        });
        let chain: Arc<Chain<dyn Embedder>> = Arc::new(Chain::new(vec![embedder as Arc<dyn Embedder>]));
        let (batcher, handle) = EmbeddingBatcher::spawn(chain, BatcherConfig { batch_size: 8, idle_timeout_ms: 10, memory_limit_bytes: 1 << 20 });
        (IndexManager::new(chunk_store, vector_store, batcher, 2), handle)
    }

    struct FailingParser;

    impl Parser for FailingParser {
        fn parse(&self, _content: &[u8], _path: &str, _file_hash: &str) -> ParseResult {
            ParseResult::failure()
        }
    }

    fn chunk(id: &str, path: &str, content: &str) -> Chunk {
        let h = sha256_hex(content.as_bytes());
        Chunk::new(id, path, content, 1, 1, ChunkKind::Function, "rust", h.clone(), h)
    }

    #[tokio::test]
    async fn needs_indexing_is_true_until_recorded() {
        let (manager, _handle) = manager();
        assert!(manager.needs_indexing("a.rs", "hash1").unwrap());
        manager.record_indexed("a.rs", "hash1").unwrap();
        assert!(!manager.needs_indexing("a.rs", "hash1").unwrap());
        assert!(manager.needs_indexing("a.rs", "hash2").unwrap());
    }

    #[tokio::test]
    async fn reindex_inserts_chunks_and_tracks_statistics() {
        let (manager, _handle) = manager();
        let parsed = ParseResult { chunks: vec![chunk("c1", "a.rs", "fn one() {}")], snippets: vec![], outcome: Some(ParseOutcome::Success) };
        let report = manager.reindex("a.rs", "filehash1", parsed).await.unwrap();
        assert_eq!(report.chunks_total, 1);
        assert_eq!(report.chunks_embedded, 1);
        assert_eq!(report.chunks_reused, 0);

        let stats = manager.statistics().unwrap();
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.total_vectors, 1);
    }

    #[tokio::test]
    async fn reindex_reuses_vector_across_renamed_path_by_content_hash() {
        let (manager, _handle) = manager();
        let first = ParseResult { chunks: vec![chunk("c1", "a.rs", "fn one() {}")], snippets: vec![], outcome: Some(ParseOutcome::Success) };
        manager.reindex("a.rs", "filehash1", first).await.unwrap();

        // Same content, new path and new chunk id: should reuse, not re-embed.
        let second = ParseResult { chunks: vec![chunk("c2", "b.rs", "fn one() {}")], snippets: vec![], outcome: Some(ParseOutcome::Success) };
        let report = manager.reindex("b.rs", "filehash2", second).await.unwrap();
        assert_eq!(report.chunks_reused, 1);
        assert_eq!(report.chunks_embedded, 0);
    }

    #[tokio::test]
    async fn reindex_removes_stale_chunks_no_longer_present_for_the_path() {
        let (manager, _handle) = manager();
        let first = ParseResult {
            chunks: vec![chunk("c1", "a.rs", "fn one() {}"), chunk("c2", "a.rs", "fn two() {}")],
            snippets: vec![],
            outcome: Some(ParseOutcome::Success),
        };
        manager.reindex("a.rs", "filehash1", first).await.unwrap();

        let second = ParseResult { chunks: vec![chunk("c1", "a.rs", "fn one() {}")], snippets: vec![], outcome: Some(ParseOutcome::Success) };
        manager.reindex("a.rs", "filehash2", second).await.unwrap();

        assert_eq!(manager.statistics().unwrap().total_chunks, 1);
    }

    #[tokio::test]
    async fn index_files_records_a_parse_failure_as_processed_without_a_store_error() {
        let (manager, _handle) = manager();
        let files = vec![("bad.rs".to_string(), b"not real source".to_vec(), "filehash1".to_string())];
        let results = manager.index_files(files, Arc::new(FailingParser), CancellationToken::new()).await;

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(IndexError::Parse { .. })));
        assert!(!manager.needs_indexing("bad.rs", "filehash1").unwrap());
        assert_eq!(manager.statistics().unwrap().total_chunks, 0);
    }
}
