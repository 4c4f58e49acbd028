use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chunk_model::Chunk;
use chunking_store::{ChunkStore, VectorStore};
use embedding_provider::EmbeddingBatcher;

use crate::error::SearchError;
use crate::follow_up::{FollowUpGenerator, FollowUpSuggestion};
use crate::fusion::reciprocal_rank_fusion;
use crate::options::{SearchHit, SearchOptions};
use crate::query_expander::QueryExpander;
use crate::rerank::rerank_multiplier;
use crate::result_synthesizer::{ResultSynthesizer, Synthesis};

/// Oversampling factor: each retrieval leg fetches `limit * OVERSAMPLE`
/// candidates before fusion and truncation.
const OVERSAMPLE: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub synthesis: Option<Synthesis>,
    pub follow_ups: Vec<FollowUpSuggestion>,
}

/// Stateless beyond its injected collaborators; every query is
/// independent, and the lexical and dense retrieval legs run concurrently.
pub struct Engine {
    chunk_store: Arc<dyn ChunkStore>,
    vector_store: Arc<dyn VectorStore>,
    batcher: EmbeddingBatcher,
    query_expander: Option<QueryExpander>,
    result_synthesizer: Option<ResultSynthesizer>,
    follow_up_generator: Option<FollowUpGenerator>,
}

impl Engine {
    pub fn new(
        chunk_store: Arc<dyn ChunkStore>,
        vector_store: Arc<dyn VectorStore>,
        batcher: EmbeddingBatcher,
        query_expander: Option<QueryExpander>,
        result_synthesizer: Option<ResultSynthesizer>,
        follow_up_generator: Option<FollowUpGenerator>,
    ) -> Self {
        Self { chunk_store, vector_store, batcher, query_expander, result_synthesizer, follow_up_generator }
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse, SearchError> {
        options.validate()?;

        let (dense_query_text, lexical_query_text) = if options.expand {
            if let Some(expander) = &self.query_expander {
                let expansion = expander.expand(query).await?;
                (expansion.dense_query(), expansion.lexical_query())
            } else {
                (query.to_string(), query.to_string())
            }
        } else {
            (query.to_string(), query.to_string())
        };

        let mut hits = self.retrieve_and_fuse(query, &dense_query_text, &lexical_query_text, options).await?;

        if options.multi_hop_depth >= 1 {
            hits = self.multi_hop_expand(query, hits, options).await?;
        }

        let synthesis = if options.synthesize {
            match &self.result_synthesizer {
                Some(synthesizer) => Some(synthesizer.synthesize(query, &hits).await?),
                None => None,
            }
        } else {
            None
        };

        let follow_ups = if options.synthesize {
            match &self.follow_up_generator {
                Some(generator) => generator.generate(query, &hits).await?,
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        Ok(SearchResponse { hits, synthesis, follow_ups })
    }

    async fn retrieve_and_fuse(
        &self,
        original_query: &str,
        dense_query_text: &str,
        lexical_query_text: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let oversampled = options.limit * OVERSAMPLE;

        let query_vector = self.batcher.embed(dense_query_text.to_string()).await?;

        let chunk_store = Arc::clone(&self.chunk_store);
        let lexical_query_owned = lexical_query_text.to_string();
        let lexical_task =
            tokio::task::spawn_blocking(move || chunk_store.search_fts(&lexical_query_owned, oversampled));

        let vector_store = Arc::clone(&self.vector_store);
        let dense_task = tokio::task::spawn_blocking(move || vector_store.search(&query_vector, oversampled));

        let (lexical_result, dense_result) = tokio::join!(lexical_task, dense_task);
        let lexical_hits =
            lexical_result.map_err(|e| SearchError::InvalidOptions(format!("lexical task panicked: {e}")))??;
        let dense_hits =
            dense_result.map_err(|e| SearchError::InvalidOptions(format!("dense task panicked: {e}")))??;

        let lexical_ranked_ids: Vec<String> = lexical_hits.iter().map(|(c, _)| c.id.clone()).collect();
        let dense_ranked_ids: Vec<String> = dense_hits.iter().map(|(id, _)| id.clone()).collect();

        let fused = reciprocal_rank_fusion(&lexical_ranked_ids, &dense_ranked_ids, options.semantic_weight, options.rrf_k);

        let mut chunks_by_id: HashMap<String, Chunk> = HashMap::new();
        for (chunk, _) in lexical_hits {
            chunks_by_id.insert(chunk.id.clone(), chunk);
        }
        let missing_ids: Vec<String> =
            dense_ranked_ids.iter().filter(|id| !chunks_by_id.contains_key(*id)).cloned().collect();
        if !missing_ids.is_empty() {
            for chunk in self.chunk_store.get_by_ids(&missing_ids)? {
                chunks_by_id.insert(chunk.id.clone(), chunk);
            }
        }

        self.finalize(original_query, fused, chunks_by_id, options)
    }

    fn finalize(
        &self,
        query: &str,
        fused: HashMap<String, f64>,
        chunks_by_id: HashMap<String, Chunk>,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let term_frequency = self.chunk_store.get_term_frequency(query)?;

        let mut hits: Vec<SearchHit> = fused
            .into_iter()
            .filter_map(|(id, score)| chunks_by_id.get(&id).map(|chunk| (chunk.clone(), score)))
            .filter(|(chunk, _)| passes_filters(chunk, options))
            .map(|(chunk, score)| {
                let multiplier = rerank_multiplier(&chunk, query, term_frequency);
                SearchHit { chunk, score: score * multiplier }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.path.cmp(&b.chunk.path))
                .then_with(|| a.chunk.start_line.cmp(&b.chunk.start_line))
        });
        hits.truncate(options.limit);
        Ok(hits)
    }

    async fn multi_hop_expand(
        &self,
        original_query: &str,
        initial_hits: Vec<SearchHit>,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut identifiers: HashSet<String> = HashSet::new();
        for hit in &initial_hits {
            identifiers.extend(hit.chunk.references.iter().cloned());
            identifiers.extend(hit.chunk.symbols.iter().cloned());
        }
        if identifiers.is_empty() {
            return Ok(initial_hits);
        }

        let secondary_query = identifiers.into_iter().collect::<Vec<_>>().join(" ");
        let hop_limit = (options.limit / 2).max(1);
        let mut hop_options = options.clone();
        hop_options.limit = hop_limit;
        hop_options.multi_hop_depth = 0;

        let hop_hits = self.retrieve_and_fuse(original_query, &secondary_query, &secondary_query, &hop_options).await?;

        let mut merged: HashMap<String, SearchHit> = HashMap::new();
        for hit in initial_hits.into_iter().chain(hop_hits) {
            merged
                .entry(hit.chunk.id.clone())
                .and_modify(|existing| existing.score = existing.score.max(hit.score))
                .or_insert(hit);
        }
        let mut combined: Vec<SearchHit> = merged.into_values().collect();
        combined.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.path.cmp(&b.chunk.path))
                .then_with(|| a.chunk.start_line.cmp(&b.chunk.start_line))
        });
        combined.truncate(options.limit);
        Ok(combined)
    }
}

fn passes_filters(chunk: &Chunk, options: &SearchOptions) -> bool {
    if let Some(filter) = &options.path_filter {
        if !chunk.path.contains(filter.as_str()) {
            return false;
        }
    }
    if !options.extensions_filter.is_empty() && !options.extensions_filter.iter().any(|ext| chunk.path.ends_with(ext.as_str())) {
        return false;
    }
    true
}
