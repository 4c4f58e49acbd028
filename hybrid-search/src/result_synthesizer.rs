use std::sync::Arc;
use std::time::Duration;

use llm_provider::{LlmProvider, Message};
use provider_chain::Chain;
use serde::Serialize;

use crate::error::SearchError;
use crate::options::SearchHit;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Synthesis {
    pub summary: String,
    pub insights: Vec<String>,
    pub references: Vec<String>,
    pub confidence: f64,
}

fn parse_synthesis_response(response: &str) -> Synthesis {
    let mut summary_lines = Vec::new();
    let mut insights = Vec::new();
    let mut references = Vec::new();
    let mut confidence = 0.5;
    let mut saw_label = false;

    #[derive(PartialEq)]
    enum Section {
        None,
        Summary,
        Insights,
        References,
    }
    let mut section = Section::None;

    for raw_line in response.lines() {
        let line = raw_line.trim();
        if let Some(rest) = line.strip_prefix("SUMMARY:") {
            saw_label = true;
            section = Section::Summary;
            if !rest.trim().is_empty() {
                summary_lines.push(rest.trim().to_string());
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("INSIGHTS:") {
            saw_label = true;
            section = Section::Insights;
            if !rest.trim().is_empty() {
                insights.push(clean_bullet(rest));
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("REFERENCES:") {
            saw_label = true;
            section = Section::References;
            if !rest.trim().is_empty() {
                references.push(clean_bullet(rest));
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("CONFIDENCE:") {
            saw_label = true;
            section = Section::None;
            confidence = rest.trim().parse::<f64>().unwrap_or(confidence).clamp(0.0, 1.0);
            continue;
        }
        if line.is_empty() {
            continue;
        }
        match section {
            Section::Summary => summary_lines.push(line.to_string()),
            Section::Insights => insights.push(clean_bullet(line)),
            Section::References => references.push(clean_bullet(line)),
            Section::None => {}
        }
    }

    if !saw_label {
        return Synthesis { summary: response.trim().to_string(), insights, references, confidence };
    }

    Synthesis { summary: summary_lines.join(" "), insights, references, confidence }
}

fn clean_bullet(line: &str) -> String {
    line.trim_start_matches(['-', '*']).trim().to_string()
}

/// Formats the top results of a search into a structured explanation via
/// an LLM. Falls back to treating the whole response as the summary when
/// the model doesn't use the expected labeled sections.
pub struct ResultSynthesizer {
    chain: Arc<Chain<dyn LlmProvider>>,
    model: Option<String>,
    timeout: Duration,
}

impl ResultSynthesizer {
    pub fn new(chain: Arc<Chain<dyn LlmProvider>>, model: Option<String>, timeout: Duration) -> Self {
        Self { chain, model, timeout }
    }

    pub async fn synthesize(&self, query: &str, hits: &[SearchHit]) -> Result<Synthesis, SearchError> {
        let context: String = hits
            .iter()
            .take(10)
            .map(|hit| format!("{}:{}-{}\n{}", hit.chunk.path, hit.chunk.start_line, hit.chunk.end_line, hit.chunk.content))
            .collect::<Vec<_>>()
            .join("\n---\n");

        let messages = vec![
            Message::system(
                "Summarize the following code search results. Respond with labeled sections \
                 `SUMMARY:`, `INSIGHTS:` (bulleted), `REFERENCES:` (bulleted file paths), \
                 `CONFIDENCE:` (a number between 0 and 1).",
            ),
            Message::user(format!("Query: {query}\n\nResults:\n{context}")),
        ];

        let model = self.model.as_deref();
        let response = self.chain.call_async(|provider| provider.complete(&messages, model, self.timeout)).await?;
        Ok(parse_synthesis_response(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_labeled_sections() {
        let response = "SUMMARY: Handles login flow.\nINSIGHTS:\n- Uses bcrypt\n- Rate limited\nREFERENCES:\n- auth/login.rs\nCONFIDENCE: 0.8";
        let synthesis = parse_synthesis_response(response);
        assert_eq!(synthesis.summary, "Handles login flow.");
        assert_eq!(synthesis.insights, vec!["Uses bcrypt", "Rate limited"]);
        assert_eq!(synthesis.references, vec!["auth/login.rs"]);
        assert!((synthesis.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_whole_response_as_summary_when_unlabeled() {
        let synthesis = parse_synthesis_response("This code implements a login handler.");
        assert_eq!(synthesis.summary, "This code implements a login handler.");
        assert!(synthesis.insights.is_empty());
    }

    #[test]
    fn confidence_outside_range_is_clamped() {
        let synthesis = parse_synthesis_response("SUMMARY: x\nCONFIDENCE: 5");
        assert_eq!(synthesis.confidence, 1.0);
    }
}
