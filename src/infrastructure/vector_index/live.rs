use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};

use super::index::HnswIndex;
use crate::domain::{
    ports::VectorIndex, DomainError, Embedding, IndexStats, RetrievalResult, SearchParams,
};

/// The index currently serving queries.
///
/// Searches run against an `Arc` snapshot taken under a short read lock, so a
/// rebuild never blocks or disturbs in-flight queries. A new index is built
/// elsewhere and published with [`LiveIndex::swap`] only once complete.
pub struct LiveIndex {
    current: RwLock<Arc<HnswIndex>>,
}

impl LiveIndex {
    pub fn new(index: HnswIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    pub fn current(&self) -> Arc<HnswIndex> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publishes `index` and returns the one it replaced.
    pub fn swap(&self, index: HnswIndex) -> Arc<HnswIndex> {
        let next = Arc::new(index);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *guard, next);
        tracing::info!(
            name = %guard.name(),
            entries = guard.len(),
            previous_entries = previous.len(),
            "live index swapped"
        );
        previous
    }
}

#[async_trait]
impl VectorIndex for LiveIndex {
    async fn search(
        &self,
        query: &Embedding,
        params: &SearchParams,
    ) -> Result<RetrievalResult, DomainError> {
        self.current().search(query, params)
    }

    async fn stats(&self) -> IndexStats {
        self.current().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chunk, IndexEntry};
    use crate::infrastructure::vector_index::IndexConfig;

    fn entry(id: &str, v: Vec<f32>) -> IndexEntry {
        IndexEntry::new(
            Chunk::new(id, "t", "Title", "https://example.org/p.html", 0),
            Embedding::new(v),
        )
    }

    fn config() -> IndexConfig {
        IndexConfig::new("live", 2).with_graph_params(4, 16, 16)
    }

    #[tokio::test]
    async fn test_reader_snapshot_survives_swap() {
        let live = LiveIndex::new(
            HnswIndex::build(vec![entry("old", vec![1.0, 0.0])], config()).unwrap(),
        );
        let held = live.current();

        live.swap(
            HnswIndex::build(
                vec![entry("new-a", vec![1.0, 0.0]), entry("new-b", vec![0.0, 1.0])],
                config(),
            )
            .unwrap(),
        );

        assert_eq!(held.len(), 1);
        assert_eq!(live.stats().await.entry_count, 2);
        let result = live
            .search(&Embedding::new(vec![1.0, 0.0]), &SearchParams::top_k(1))
            .await
            .unwrap();
        assert_eq!(result.chunk_ids(), vec!["new-a"]);
    }

    #[tokio::test]
    async fn test_failed_build_keeps_previous_index() {
        let live = LiveIndex::new(
            HnswIndex::build(vec![entry("old", vec![1.0, 0.0])], config()).unwrap(),
        );

        let rebuilt = HnswIndex::build(vec![entry("bad", vec![1.0, 0.0, 0.0])], config());
        assert!(rebuilt.is_err());
        if let Ok(index) = rebuilt {
            live.swap(index);
        }

        assert_eq!(live.current().chunks()[0].id, "old");
    }
}
