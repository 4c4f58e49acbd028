#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    /// Weight given to dense (vector) rank vs. lexical rank in fusion, in `[0, 1]`.
    pub semantic_weight: f64,
    pub rrf_k: f64,
    pub path_filter: Option<String>,
    pub extensions_filter: Vec<String>,
    pub expand: bool,
    pub synthesize: bool,
    pub multi_hop_depth: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            semantic_weight: 0.5,
            rrf_k: 60.0,
            path_filter: None,
            extensions_filter: Vec::new(),
            expand: false,
            synthesize: false,
            multi_hop_depth: 0,
        }
    }
}

impl SearchOptions {
    pub fn validate(&self) -> Result<(), crate::error::SearchError> {
        if !(0.0..=1.0).contains(&self.semantic_weight) {
            return Err(crate::error::SearchError::InvalidOptions(format!(
                "semantic_weight must be within [0, 1], got {}",
                self.semantic_weight
            )));
        }
        if self.limit == 0 {
            return Err(crate::error::SearchError::InvalidOptions("limit must be greater than zero".into()));
        }
        Ok(())
    }
}

/// A scored, ranked search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: chunk_model::Chunk,
    pub score: f64,
}
