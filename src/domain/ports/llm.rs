use crate::domain::errors::DomainError;
use async_trait::async_trait;

/// Gateway to the generative model. Transport failures and timeouts surface
/// as `DomainError::Generation`; implementations never retry.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Single-shot completion. Used for relevance classification.
    async fn complete(&self, prompt: &str) -> Result<String, DomainError>;

    /// Completion with a rendered system prompt carrying the retrieved
    /// context and chat history.
    async fn complete_with_system(&self, system: &str, prompt: &str)
        -> Result<String, DomainError>;
}
