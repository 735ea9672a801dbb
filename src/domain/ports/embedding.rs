use crate::domain::{errors::DomainError, Embedding};
use async_trait::async_trait;

/// Gateway to the external embedding model.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError>;

    /// Embeds `texts` in order; the output has one vector per input.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}
