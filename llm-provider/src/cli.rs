use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use provider_chain::ProviderMeta;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

#[derive(Debug, Clone)]
pub struct CliLlmConfig {
    pub id: String,
    pub executable: String,
    pub args: Vec<String>,
    pub model: String,
}

/// Drives a locally installed CLI tool (e.g. a vendor's chat client) as an
/// LLM provider: the conversation is serialized to JSON on stdin, and the
/// model's reply is read back from stdout.
pub struct CliLlmProvider {
    id: String,
    executable: String,
    args: Vec<String>,
    model: String,
}

impl CliLlmProvider {
    pub fn new(config: CliLlmConfig) -> Self {
        Self { id: config.id, executable: config.executable, args: config.args, model: config.model }
    }

    fn available(&self) -> bool {
        which(&self.executable).is_some()
    }
}

fn which(executable: &str) -> Option<std::path::PathBuf> {
    let path = std::path::Path::new(executable);
    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(executable))
            .find(|candidate| candidate.is_file())
    })
}

impl ProviderMeta for CliLlmProvider {
    fn id(&self) -> &str {
        &self.id
    }
    fn is_available(&self) -> bool {
        self.available()
    }
}

#[async_trait]
impl LlmProvider for CliLlmProvider {
    async fn complete(
        &self,
        messages: &[Message],
        model: Option<&str>,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        if messages.is_empty() {
            return Err(LlmError::InvalidInput("messages must not be empty".into()));
        }
        if !self.available() {
            return Err(LlmError::CliNotFound { tool: self.executable.clone() });
        }

        let payload = serde_json::to_vec(messages)
            .map_err(|err| LlmError::Unknown { msg: format!("failed to serialize messages: {err}") })?;

        let mut args = self.args.clone();
        if let Some(model) = model {
            args.push("--model".to_string());
            args.push(model.to_string());
        }

        let mut child = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| LlmError::ProcessError { exit_code: None, stderr: err.to_string() })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|err| LlmError::ProcessError { exit_code: None, stderr: err.to_string() })?;
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|err| LlmError::ProcessError { exit_code: None, stderr: err.to_string() })?
            }
            Err(_) => return Err(LlmError::Timeout { seconds: timeout.as_secs() }),
        };

        if !output.status.success() {
            return Err(LlmError::ProcessError {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn which_finds_coreutils_binary_on_path() {
        assert!(which("ls").is_some() || which("cmd.exe").is_some());
    }

    #[test]
    fn which_returns_none_for_missing_binary() {
        assert!(which("definitely-not-a-real-binary-xyz").is_none());
    }

    #[tokio::test]
    async fn complete_rejects_empty_messages() {
        let provider = CliLlmProvider::new(CliLlmConfig {
            id: "cli".into(),
            executable: "true".into(),
            args: vec![],
            model: "local".into(),
        });
        let err = provider.complete(&[], None, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidInput(_)));
    }
}
