use std::sync::{Arc, OnceLock};
use std::time::Duration;

use llm_provider::{LlmProvider, Message};
use provider_chain::Chain;
use regex::Regex;
use serde::Serialize;

use crate::error::SearchError;
use crate::options::SearchHit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpCategory {
    HowTo,
    Deeper,
    Testing,
    Related,
    Configuration,
    Exploration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowUpSuggestion {
    pub query: String,
    pub category: FollowUpCategory,
}

fn classifiers() -> &'static [(FollowUpCategory, &'static OnceLock<Regex>, &'static str)] {
    static HOW_TO: OnceLock<Regex> = OnceLock::new();
    static DEEPER: OnceLock<Regex> = OnceLock::new();
    static TESTING: OnceLock<Regex> = OnceLock::new();
    static CONFIGURATION: OnceLock<Regex> = OnceLock::new();
    static RELATED: OnceLock<Regex> = OnceLock::new();

    &[
        (FollowUpCategory::HowTo, &HOW_TO, r"(?i)^how (do|to|can)\b"),
        (FollowUpCategory::Deeper, &DEEPER, r"(?i)\b(why|internal|implementation detail|under the hood)\b"),
        (FollowUpCategory::Testing, &TESTING, r"(?i)\b(test|mock|fixture|assert)\w*\b"),
        (FollowUpCategory::Configuration, &CONFIGURATION, r"(?i)\b(config|setting|option|flag|env var)\w*\b"),
        (FollowUpCategory::Related, &RELATED, r"(?i)\b(related|similar|other|alternative)\b"),
    ]
}

fn classify(query: &str) -> FollowUpCategory {
    for (category, cell, pattern) in classifiers() {
        let regex = cell.get_or_init(|| Regex::new(pattern).unwrap());
        if regex.is_match(query) {
            return *category;
        }
    }
    FollowUpCategory::Exploration
}

/// Suggests categorized follow-up queries for a completed search.
pub struct FollowUpGenerator {
    chain: Arc<Chain<dyn LlmProvider>>,
    model: Option<String>,
    timeout: Duration,
}

impl FollowUpGenerator {
    pub fn new(chain: Arc<Chain<dyn LlmProvider>>, model: Option<String>, timeout: Duration) -> Self {
        Self { chain, model, timeout }
    }

    pub async fn generate(&self, query: &str, hits: &[SearchHit]) -> Result<Vec<FollowUpSuggestion>, SearchError> {
        let paths: Vec<&str> = hits.iter().take(5).map(|h| h.chunk.path.as_str()).collect();
        let messages = vec![
            Message::system(
                "Suggest 3-5 natural follow-up search queries for a code search, one per line, \
                 with no numbering or labels.",
            ),
            Message::user(format!("Query: {query}\nTop result paths: {}", paths.join(", "))),
        ];

        let model = self.model.as_deref();
        let response = self.chain.call_async(|provider| provider.complete(&messages, model, self.timeout)).await?;
        Ok(response
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| FollowUpSuggestion { query: l.to_string(), category: classify(l) })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_how_to_queries() {
        assert_eq!(classify("How do I add a new provider?"), FollowUpCategory::HowTo);
    }

    #[test]
    fn classifies_testing_queries() {
        assert_eq!(classify("What test fixtures cover this?"), FollowUpCategory::Testing);
    }

    #[test]
    fn classifies_configuration_queries() {
        assert_eq!(classify("Which config flag controls batching?"), FollowUpCategory::Configuration);
    }

    #[test]
    fn falls_back_to_exploration_for_unmatched_queries() {
        assert_eq!(classify("Show me more code like this"), FollowUpCategory::Exploration);
    }
}
