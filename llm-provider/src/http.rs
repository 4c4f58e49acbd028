use std::time::Duration;

use async_trait::async_trait;
use provider_chain::ProviderMeta;
use serde::Deserialize;
use serde_json::json;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, Role};

#[derive(Debug, Clone)]
pub struct HttpLlmConfig {
    pub id: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

/// Talks to an OpenAI-compatible chat completions endpoint.
pub struct HttpLlmProvider {
    id: String,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl HttpLlmProvider {
    pub fn new(config: HttpLlmConfig) -> Result<Self, LlmError> {
        if config.endpoint.starts_with("https://api.") && config.api_key.is_none() {
            return Err(LlmError::ApiKeyMissing { provider: config.id });
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| LlmError::Unknown { msg: format!("failed to build HTTP client: {err}") })?;
        Ok(Self {
            id: config.id,
            endpoint: config.endpoint,
            api_key: config.api_key,
            model: config.model,
            client,
        })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

impl ProviderMeta for HttpLlmProvider {
    fn id(&self) -> &str {
        &self.id
    }
    fn is_available(&self) -> bool {
        self.api_key.is_some() || !self.endpoint.starts_with("https://api.")
    }
}

/// Transient failures are retried at this layer (network glitch, timeout,
/// 5xx, rate-limit); everything else is surfaced to the chain immediately.
const MAX_ATTEMPTS: u32 = 3;
const MAX_BACKOFF: Duration = Duration::from_secs(2);
const BASE_BACKOFF: Duration = Duration::from_millis(250);

fn is_transient(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::RateLimited { .. } | LlmError::Timeout { .. } | LlmError::NetworkError { .. }
    ) || matches!(err, LlmError::ApiError { code, .. } if *code >= 500)
}

fn backoff_delay(err: &LlmError, attempt: u32) -> Duration {
    if let LlmError::RateLimited { retry_after: Some(seconds) } = err {
        return Duration::from_secs(*seconds).min(MAX_BACKOFF);
    }
    (BASE_BACKOFF * 2u32.pow(attempt)).min(MAX_BACKOFF)
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn complete(
        &self,
        messages: &[Message],
        model: Option<&str>,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        if messages.is_empty() {
            return Err(LlmError::InvalidInput("messages must not be empty".into()));
        }

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.try_complete(messages, model, timeout).await {
                Ok(text) => return Ok(text),
                Err(err) if is_transient(&err) && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = backoff_delay(&err, attempt);
                    tracing::debug!(provider = %self.id, attempt, delay_ms = delay.as_millis() as u64, "retrying transient LLM failure");
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
                Err(err) => {
                    last_err = Some(err);
                    break;
                }
            }
        }

        let err = last_err.expect("loop always runs at least once");
        if is_transient(&err) {
            Err(LlmError::NotAvailable { reason: format!("exhausted retries: {err}") })
        } else {
            Err(err)
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

impl HttpLlmProvider {
    async fn try_complete(&self, messages: &[Message], model: Option<&str>, timeout: Duration) -> Result<String, LlmError> {
        let payload = json!({
            "model": model.unwrap_or(&self.model),
            "messages": messages
                .iter()
                .map(|m| json!({ "role": role_str(m.role), "content": m.content }))
                .collect::<Vec<_>>(),
        });

        let mut request = self.client.post(&self.endpoint).json(&payload).timeout(timeout);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                LlmError::Timeout { seconds: timeout.as_secs() }
            } else {
                LlmError::NetworkError { msg: err.to_string() }
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(LlmError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { code: status.as_u16(), msg: body });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Unknown { msg: format!("failed to parse response body: {err}") })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Unknown { msg: "response contained no choices".into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_and_timeout_and_5xx_are_transient() {
        assert!(is_transient(&LlmError::RateLimited { retry_after: None }));
        assert!(is_transient(&LlmError::Timeout { seconds: 1 }));
        assert!(is_transient(&LlmError::NetworkError { msg: "reset".into() }));
        assert!(is_transient(&LlmError::ApiError { code: 503, msg: String::new() }));
        assert!(!is_transient(&LlmError::ApiError { code: 404, msg: String::new() }));
        assert!(!is_transient(&LlmError::InvalidInput("bad".into())));
    }

    #[test]
    fn backoff_honors_retry_after_capped_at_max() {
        let err = LlmError::RateLimited { retry_after: Some(1) };
        assert_eq!(backoff_delay(&err, 0), Duration::from_secs(1));

        let err = LlmError::RateLimited { retry_after: Some(10) };
        assert_eq!(backoff_delay(&err, 0), MAX_BACKOFF);
    }

    #[test]
    fn backoff_grows_exponentially_when_no_retry_after_is_given() {
        let err = LlmError::NetworkError { msg: "reset".into() };
        assert_eq!(backoff_delay(&err, 0), BASE_BACKOFF);
        assert_eq!(backoff_delay(&err, 1), BASE_BACKOFF * 2);
        assert_eq!(backoff_delay(&err, 3), MAX_BACKOFF);
    }
}
