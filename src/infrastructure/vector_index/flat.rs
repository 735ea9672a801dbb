use async_trait::async_trait;
use std::sync::RwLock;

use super::distance::{magnitude, similarity};
use crate::domain::{
    ports::VectorIndex, DomainError, Embedding, IndexEntry, IndexStats, Metric, RetrievalResult,
    ScoredChunk, SearchParams,
};

pub const FLAT_INDEX_TYPE: &str = "FLAT";

/// Exact brute-force index. Serves as the ground-truth baseline when
/// measuring HNSW recall, and as a small mutable index in tests.
pub struct FlatIndex {
    name: String,
    dimension: usize,
    metric: Metric,
    entries: RwLock<Vec<IndexEntry>>,
}

impl FlatIndex {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric: Metric::Cosine,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn from_entries(
        name: impl Into<String>,
        dimension: usize,
        entries: Vec<IndexEntry>,
    ) -> Result<Self, DomainError> {
        let index = Self::new(name, dimension);
        for entry in entries {
            index.upsert(entry)?;
        }
        Ok(index)
    }

    /// Replaces any entry with the same chunk id.
    pub fn upsert(&self, entry: IndexEntry) -> Result<(), DomainError> {
        if entry.embedding.dimension() != self.dimension {
            return Err(DomainError::config(format!(
                "embedding for chunk '{}' has dimension {}, index '{}' expects {}",
                entry.id(),
                entry.embedding.dimension(),
                self.name,
                self.dimension
            )));
        }

        let mut store = self
            .entries
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        store.retain(|e| e.chunk.id != entry.chunk.id);
        store.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search_sync(
        &self,
        query: &Embedding,
        params: &SearchParams,
    ) -> Result<RetrievalResult, DomainError> {
        if params.metric != self.metric {
            return Err(DomainError::config(format!(
                "flat index '{}' uses {} similarity, search requested {}",
                self.name, self.metric, params.metric
            )));
        }
        if query.dimension() != self.dimension {
            return Err(DomainError::config(format!(
                "query has dimension {}, index '{}' expects {}",
                query.dimension(),
                self.name,
                self.dimension
            )));
        }

        let store = self
            .entries
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        let query_norm = magnitude(query.as_slice());
        let hits: Vec<ScoredChunk> = store
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: similarity(
                    self.metric,
                    entry.embedding.as_slice(),
                    entry.embedding.norm(),
                    query.as_slice(),
                    query_norm,
                ),
            })
            .filter(|hit| params.threshold.map_or(true, |t| hit.score >= t))
            .collect();

        let mut result = RetrievalResult::from_hits(hits).into_hits();
        result.truncate(params.k);
        Ok(RetrievalResult::from_hits(result))
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    async fn search(
        &self,
        query: &Embedding,
        params: &SearchParams,
    ) -> Result<RetrievalResult, DomainError> {
        self.search_sync(query, params)
    }

    async fn stats(&self) -> IndexStats {
        IndexStats {
            name: self.name.clone(),
            entry_count: self.len(),
            dimension: self.dimension,
            index_type: FLAT_INDEX_TYPE.to_string(),
            built_at: None,
            embedding_model: None,
        }
    }
}
