use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::{anthropic, openai};
use std::time::Duration;
use tracing::instrument;

use crate::domain::{ports::LlmService, DomainError};
use crate::infrastructure::config::LlmConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
}

impl LlmProvider {
    /// Models named `claude*` go to Anthropic, everything else to OpenAI.
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("claude") {
            Self::Anthropic
        } else {
            Self::OpenAi
        }
    }

    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

enum Client {
    OpenAi(openai::Client),
    Anthropic(anthropic::Client),
}

/// Chat completion through rig, with every call bounded by a timeout.
pub struct RigLlm {
    client: Client,
    model: String,
    temperature: f64,
    max_tokens: u64,
    timeout: Duration,
}

impl RigLlm {
    pub fn from_config(config: &LlmConfig) -> Result<Self, DomainError> {
        let provider = LlmProvider::for_model(&config.model);
        let key = provider.api_key_var();
        if std::env::var(key).map_or(true, |k| k.trim().is_empty()) {
            return Err(DomainError::config(format!(
                "{key} is not set; it is required for model '{}'",
                config.model
            )));
        }

        let client = match provider {
            LlmProvider::OpenAi => Client::OpenAi(openai::Client::from_env()),
            LlmProvider::Anthropic => Client::Anthropic(anthropic::Client::from_env()),
        };

        tracing::info!(model = %config.model, provider = ?provider, "LLM client ready");

        Ok(Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn prompt(&self, system: Option<&str>, prompt: &str) -> Result<String, DomainError> {
        let call = async {
            match &self.client {
                Client::OpenAi(client) => {
                    let mut builder = client
                        .agent(&self.model)
                        .temperature(self.temperature)
                        .max_tokens(self.max_tokens);
                    if let Some(system) = system {
                        builder = builder.preamble(system);
                    }
                    builder.build().prompt(prompt).await
                }
                Client::Anthropic(client) => {
                    let mut builder = client
                        .agent(&self.model)
                        .temperature(self.temperature)
                        .max_tokens(self.max_tokens);
                    if let Some(system) = system {
                        builder = builder.preamble(system);
                    }
                    builder.build().prompt(prompt).await
                }
            }
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                DomainError::generation(format!(
                    "model '{}' did not respond within {}s",
                    self.model,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| DomainError::generation(e.to_string()))
    }
}

#[async_trait]
impl LlmService for RigLlm {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn complete(&self, prompt: &str) -> Result<String, DomainError> {
        self.prompt(None, prompt).await
    }

    #[instrument(skip(self, system, prompt), fields(model = %self.model))]
    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, DomainError> {
        self.prompt(Some(system), prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_selected_by_model_prefix() {
        assert_eq!(LlmProvider::for_model("claude-3-5-sonnet-latest"), LlmProvider::Anthropic);
        assert_eq!(LlmProvider::for_model("gpt-4o"), LlmProvider::OpenAi);
        assert_eq!(LlmProvider::for_model("o1-mini"), LlmProvider::OpenAi);
        assert_eq!(LlmProvider::Anthropic.api_key_var(), "ANTHROPIC_API_KEY");
    }
}
