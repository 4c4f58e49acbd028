use std::time::Duration;

use async_trait::async_trait;
use provider_chain::ProviderMeta;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A chat-style completion call against a single provider. Collaborators
/// that need LLM output (query expansion, result synthesis, follow-up
/// generation) talk to a `Chain<dyn LlmProvider>`, never a concrete
/// implementation directly.
#[async_trait]
pub trait LlmProvider: ProviderMeta + Send + Sync {
    /// `model` overrides the provider's configured default for this call
    /// only; `timeout` bounds this call alone, independent of whatever
    /// timeout the provider was constructed with.
    async fn complete(
        &self,
        messages: &[Message],
        model: Option<&str>,
        timeout: Duration,
    ) -> Result<String, LlmError>;
    fn model_id(&self) -> &str;
}
