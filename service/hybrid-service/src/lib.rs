//! Wires the storage core, embedding/LLM provider chains, index manager,
//! and hybrid search engine into the two operations the outside world
//! actually calls: `index_codebase` and `search_code`. MCP/JSON-RPC
//! framing, CLI parsing, and config loading are the caller's job — this
//! crate only exposes plain, `serde`-serializable request/response types.

pub mod config;
pub mod default_parser;
pub mod error;
pub mod requests;

pub use config::ServiceConfig;
pub use default_parser::LineWindowParser;
pub use error::ServiceError;
pub use requests::{
    IndexCodebaseRequest, IndexCodebaseResponse, IndexCodebaseResult, IndexCodebaseTask, SearchCodeRequest,
    SearchCodeResponse, SearchResultRow,
};

use std::path::Path;
use std::sync::Arc;

use chunk_model::hash::sha256_hex;
use chunking_store::{ChunkStore, HnswParams, HnswVectorStore, SqliteChunkStore, VectorStore};
use embedding_provider::{BatcherConfig, Embedder, EmbeddingBatcher};
use hybrid_search::{Engine, FollowUpGenerator, QueryExpander, ResultSynthesizer, SearchOptions};
use index_manager::{IndexManager, Parser};
use llm_provider::LlmProvider;
use provider_chain::Chain;
use tracing::{info, warn};

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

pub struct HybridService {
    chunk_store: Arc<dyn ChunkStore>,
    vector_store: Arc<dyn VectorStore>,
    index_manager: IndexManager,
    engine: Engine,
    parser: Arc<dyn Parser>,
    service_config: ServiceConfig,
}

impl HybridService {
    pub fn new(
        service_config: ServiceConfig,
        embedder_chain: Arc<Chain<dyn Embedder>>,
        llm_chain: Option<Arc<Chain<dyn LlmProvider>>>,
        parser: Arc<dyn Parser>,
    ) -> Result<Self, ServiceError> {
        if let Some(parent) = service_config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&service_config.hnsw_dir)?;

        let chunk_store: Arc<dyn ChunkStore> = Arc::new(SqliteChunkStore::open(&service_config.db_path)?);
        let vector_store: Arc<dyn VectorStore> =
            Arc::new(HnswVectorStore::new(service_config.hnsw_dir.clone(), HnswParams::default()));
        vector_store.load()?;

        let batcher_config = BatcherConfig {
            batch_size: service_config.config.embedding.batch_size,
            idle_timeout_ms: service_config.config.embedding.batch_timeout_ms,
            memory_limit_bytes: service_config.config.embedding.batch_memory_limit_mb * 1024 * 1024,
        };
        let (batcher, _handle) = EmbeddingBatcher::spawn(embedder_chain, batcher_config);

        let index_manager = IndexManager::new(
            Arc::clone(&chunk_store),
            Arc::clone(&vector_store),
            batcher.clone(),
            service_config.config.indexing.max_concurrent_tasks,
        );

        let utility = &service_config.config.search.enhancement.utility;
        let synthesis = &service_config.config.search.enhancement.synthesis;
        let utility_model = non_empty(&utility.model);
        let utility_timeout = std::time::Duration::from_secs(utility.timeout.max(1));
        let synthesis_model = non_empty(&synthesis.model);
        let synthesis_timeout = std::time::Duration::from_secs(synthesis.timeout.max(1));

        let query_expander =
            llm_chain.clone().map(|chain| QueryExpander::new(chain, 100, utility_model.clone(), utility_timeout));
        let result_synthesizer =
            llm_chain.clone().map(|chain| ResultSynthesizer::new(chain, synthesis_model, synthesis_timeout));
        let follow_up_generator = llm_chain.map(|chain| FollowUpGenerator::new(chain, utility_model, utility_timeout));

        let engine = Engine::new(
            Arc::clone(&chunk_store),
            Arc::clone(&vector_store),
            batcher,
            query_expander,
            result_synthesizer,
            follow_up_generator,
        );

        Ok(Self { chunk_store, vector_store, index_manager, engine, parser, service_config })
    }

    fn discover_files(&self, root: &Path) -> Vec<std::path::PathBuf> {
        let indexing = &self.service_config.config.indexing;
        let mut builder = ignore::WalkBuilder::new(root);
        builder.hidden(false).git_ignore(true);
        let exclude = indexing.exclude.clone();
        builder.filter_entry(move |entry| {
            let path = entry.path().to_string_lossy();
            !exclude.iter().any(|pattern| path.contains(pattern.as_str()))
        });

        let mut files = Vec::new();
        for entry in builder.build().flatten() {
            let path = entry.path();
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if !indexing.include_extensions.is_empty() {
                let matches = path
                    .extension()
                    .map(|ext| indexing.include_extensions.iter().any(|allowed| allowed.trim_start_matches('.') == ext))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
            }
            if let Ok(meta) = entry.metadata() {
                if meta.len() as usize > indexing.max_file_size {
                    continue;
                }
            }
            files.push(path.to_path_buf());
        }
        files
    }

    async fn index_codebase_inner(&self, path: &str, force: bool) -> Result<IndexCodebaseResult, ServiceError> {
        if force {
            self.index_manager.clear()?;
        }

        let root = Path::new(path);
        let files = self.discover_files(root);
        let total_files = files.len();
        let mut indexed_files = 0usize;
        let mut skipped_files = 0usize;
        let mut chunks = 0usize;
        let mut errors = Vec::new();

        for file_path in files {
            let display_path = file_path.to_string_lossy().to_string();
            let content = match std::fs::read(&file_path) {
                Ok(content) => content,
                Err(e) => {
                    errors.push(format!("{display_path}: {e}"));
                    continue;
                }
            };
            let file_hash = sha256_hex(&content);

            match self.index_manager.needs_indexing(&display_path, &file_hash) {
                Ok(false) => {
                    skipped_files += 1;
                    continue;
                }
                Err(e) => {
                    errors.push(format!("{display_path}: {e}"));
                    continue;
                }
                Ok(true) => {}
            }

            let parsed = self.parser.parse(&content, &display_path, &file_hash);
            if parsed.outcome == Some(index_manager::ParseOutcome::Failure) {
                errors.push(format!("{display_path}: parse failed"));
                self.index_manager.record_indexed(&display_path, &file_hash)?;
                skipped_files += 1;
                continue;
            }

            match self.index_manager.reindex(&display_path, &file_hash, parsed).await {
                Ok(report) => {
                    indexed_files += 1;
                    chunks += report.chunks_total;
                }
                Err(e) => errors.push(format!("{display_path}: {e}")),
            }
        }

        self.index_manager.save()?;
        let stats = self.index_manager.statistics()?;
        info!(path, indexed_files, skipped_files, "codebase indexing pass complete");

        Ok(IndexCodebaseResult {
            indexed_files,
            skipped_files,
            chunks,
            total_chunks: stats.total_chunks,
            total_files,
            errors,
            path: path.to_string(),
            forced: force,
        })
    }

    /// Indexes or re-indexes a codebase rooted at `request.path`. When
    /// `request.async_mode` is set, the scan runs on a detached task and
    /// this returns immediately with a task descriptor rather than the
    /// final report — tracking that task to completion is the caller's
    /// responsibility (this facade has no RPC layer to report back to).
    pub async fn index_codebase(
        self: &Arc<Self>,
        request: IndexCodebaseRequest,
    ) -> Result<IndexCodebaseResponse, ServiceError> {
        if request.async_mode {
            let estimated_files = self.discover_files(Path::new(&request.path)).len();
            let task_id = sha256_hex(format!("{}:{}", request.path, estimated_files).as_bytes())[..16].to_string();
            let service = Arc::clone(self);
            let path = request.path.clone();
            let force = request.force;
            tokio::spawn(async move {
                if let Err(e) = service.index_codebase_inner(&path, force).await {
                    warn!(path, error = %e, "background indexing task failed");
                }
            });
            return Ok(IndexCodebaseResponse::Task(IndexCodebaseTask {
                task_id,
                status: "started".to_string(),
                estimated_files,
                message: format!("indexing started for {}", request.path),
            }));
        }

        let result = self.index_codebase_inner(&request.path, request.force).await?;
        Ok(IndexCodebaseResponse::Result(result))
    }

    pub async fn search_code(&self, request: SearchCodeRequest) -> Result<SearchCodeResponse, ServiceError> {
        let defaults = &self.service_config.config.search;
        let options = SearchOptions {
            limit: request.limit.unwrap_or(defaults.limit),
            semantic_weight: defaults.semantic_weight,
            rrf_k: defaults.rrf_k,
            path_filter: request.path_filter,
            extensions_filter: request.extensions.unwrap_or_default(),
            expand: request.expand.unwrap_or(defaults.expand_query_by_default),
            synthesize: request.synthesize.unwrap_or(defaults.synthesize_by_default),
            multi_hop_depth: if defaults.multi_hop_enabled { defaults.multi_hop_depth } else { 0 },
        };

        let response = self.engine.search(&request.query, &options).await?;
        let results = response
            .hits
            .into_iter()
            .map(|hit| SearchResultRow {
                path: hit.chunk.path,
                start_line: hit.chunk.start_line,
                end_line: hit.chunk.end_line,
                kind: hit.chunk.kind.as_str().to_string(),
                score: hit.score,
                signature: hit.chunk.signature,
                breadcrumb: hit.chunk.breadcrumb,
                snippet: hit.chunk.content.lines().take(3).collect::<Vec<_>>().join("\n"),
            })
            .collect();

        Ok(SearchCodeResponse { results, synthesis: response.synthesis, follow_ups: response.follow_ups })
    }

    pub fn chunk_store(&self) -> &Arc<dyn ChunkStore> {
        &self.chunk_store
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding_provider::{EmbedderError, EmbedderInfo, ProviderKind};
    use provider_chain::ProviderMeta;

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
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            Ok(vec![text.len() as f32, 0.0])
        }
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }
        fn info(&self) -> &EmbedderInfo {
            &self.info
        }
    }

    fn test_service(dir: &Path) -> Arc<HybridService> {
        let mut config = hybrid_config::HybridConfig::default();
        config.storage.index_path = dir.to_string_lossy().to_string();
        let service_config = ServiceConfig::from_config(config);
        let embedder = Arc::new(StubEmbedder {
            info: EmbedderInfo { id: "stub".into(), provider: ProviderKind::OnnxHttp, embedding_model_id: "t".into(), dimension: 2 },
        });
        let chain: Arc<Chain<dyn Embedder>> = Arc::new(Chain::new(vec![embedder as Arc<dyn Embedder>]));
        let parser: Arc<dyn Parser> = Arc::new(LineWindowParser::default());
        Arc::new(HybridService::new(service_config, chain, None, parser).unwrap())
    }

    #[tokio::test]
    async fn indexing_a_small_tree_then_searching_finds_a_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("widget.rs"), "fn widget_factory() {}\n").unwrap();
        let service = test_service(dir.path());

        let result = service
            .index_codebase(IndexCodebaseRequest { path: dir.path().to_string_lossy().to_string(), force: false, async_mode: false })
            .await
            .unwrap();
        let IndexCodebaseResponse::Result(result) = result else { panic!("expected inline result") };
        assert_eq!(result.indexed_files, 1);
        assert!(result.chunks >= 1);

        let response = service
            .search_code(SearchCodeRequest { query: "widget_factory".into(), limit: Some(5), path_filter: None, extensions: None, expand: None, synthesize: None })
            .await
            .unwrap();
        assert!(!response.results.is_empty());
    }

    #[tokio::test]
    async fn reindexing_unchanged_files_skips_them() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn one() {}\n").unwrap();
        let service = test_service(dir.path());
        let path = dir.path().to_string_lossy().to_string();

        service.index_codebase(IndexCodebaseRequest { path: path.clone(), force: false, async_mode: false }).await.unwrap();
        let second = service.index_codebase(IndexCodebaseRequest { path, force: false, async_mode: false }).await.unwrap();
        let IndexCodebaseResponse::Result(second) = second else { panic!("expected inline result") };
        assert_eq!(second.indexed_files, 0);
        assert_eq!(second.skipped_files, 1);
    }
}
