use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use llm_provider::{LlmProvider, Message};
use lru::LruCache;
use provider_chain::Chain;

use crate::error::SearchError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryExpansion {
    pub original: String,
    pub synonyms: Vec<String>,
    pub related: Vec<String>,
    pub variations: Vec<String>,
}

impl QueryExpansion {
    /// The text fed to the dense retriever: original plus every expansion,
    /// concatenated so the embedding reflects the fuller intent.
    pub fn dense_query(&self) -> String {
        let mut parts = vec![self.original.clone()];
        parts.extend(self.synonyms.iter().cloned());
        parts.extend(self.related.iter().cloned());
        parts.extend(self.variations.iter().cloned());
        parts.join(" ")
    }

    /// The text fed to the lexical retriever: every term OR-ed together.
    pub fn lexical_query(&self) -> String {
        let mut terms = vec![self.original.clone()];
        terms.extend(self.synonyms.iter().cloned());
        terms.extend(self.related.iter().cloned());
        terms.extend(self.variations.iter().cloned());
        terms.join(" OR ")
    }
}

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

fn parse_expansion_response(original: &str, response: &str) -> QueryExpansion {
    let mut expansion = QueryExpansion { original: original.to_string(), ..Default::default() };
    for line in response.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("SYNONYMS:") {
            expansion.synonyms = split_list(rest);
        } else if let Some(rest) = line.strip_prefix("RELATED:") {
            expansion.related = split_list(rest);
        } else if let Some(rest) = line.strip_prefix("VARIATIONS:") {
            expansion.variations = split_list(rest);
        }
    }
    expansion
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()
}

/// Expands a user query via an LLM into synonyms/related terms/phrasing
/// variations, caching by normalized query text.
pub struct QueryExpander {
    chain: Arc<Chain<dyn LlmProvider>>,
    cache: Mutex<LruCache<String, QueryExpansion>>,
    model: Option<String>,
    timeout: Duration,
}

impl QueryExpander {
    pub fn new(chain: Arc<Chain<dyn LlmProvider>>, cache_capacity: usize, model: Option<String>, timeout: Duration) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity.max(100)).unwrap();
        Self { chain, cache: Mutex::new(LruCache::new(capacity)), model, timeout }
    }

    pub async fn expand(&self, query: &str) -> Result<QueryExpansion, SearchError> {
        let key = normalize(query);
        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            return Ok(cached.clone());
        }

        let messages = vec![
            Message::system(
                "You expand code search queries. Respond with lines `SYNONYMS:`, `RELATED:`, \
                 `VARIATIONS:`, each a comma-separated list.",
            ),
            Message::user(query),
        ];
        let model = self.model.as_deref();
        let response = self.chain.call_async(|provider| provider.complete(&messages, model, self.timeout)).await;
        let expansion = match response {
            Ok(text) => parse_expansion_response(query, &text),
            Err(_) => QueryExpansion { original: query.to_string(), ..Default::default() },
        };

        self.cache.lock().unwrap().put(key, expansion.clone());
        Ok(expansion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labeled_sections() {
        let response = "SYNONYMS: auth, login\nRELATED: session, token\nVARIATIONS: authenticate user";
        let expansion = parse_expansion_response("authentication", response);
        assert_eq!(expansion.synonyms, vec!["auth", "login"]);
        assert_eq!(expansion.related, vec!["session", "token"]);
        assert_eq!(expansion.variations, vec!["authenticate user"]);
    }

    #[test]
    fn missing_sections_yield_empty_lists() {
        let expansion = parse_expansion_response("q", "no labeled content here");
        assert!(expansion.synonyms.is_empty());
        assert!(expansion.related.is_empty());
        assert!(expansion.variations.is_empty());
    }

    #[test]
    fn dense_and_lexical_query_shapes() {
        let expansion = QueryExpansion {
            original: "auth".into(),
            synonyms: vec!["login".into()],
            related: vec![],
            variations: vec![],
        };
        assert_eq!(expansion.dense_query(), "auth login");
        assert_eq!(expansion.lexical_query(), "auth OR login");
    }
}
