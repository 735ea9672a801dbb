use crate::domain::{errors::DomainError, Embedding, IndexStats, RetrievalResult, SearchParams};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// At most `params.k` hits in descending score order. An empty index
    /// yields an empty result.
    async fn search(
        &self,
        query: &Embedding,
        params: &SearchParams,
    ) -> Result<RetrievalResult, DomainError>;

    async fn stats(&self) -> IndexStats;
}
