use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::instrument;

use super::hnsw::{HnswGraph, HnswParams};
use crate::domain::{
    Chunk, DomainError, Embedding, IndexEntry, IndexStats, Metric, RetrievalResult, ScoredChunk,
    SearchParams,
};

pub const HNSW_INDEX_TYPE: &str = "HNSW";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub m: usize,
    pub ef_construction: usize,
    /// Default layer-0 beam width for queries.
    pub ef_search: usize,
    pub seed: u64,
}

impl IndexConfig {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric: Metric::Cosine,
            m: 16,
            ef_construction: 256,
            ef_search: 64,
            seed: 42,
        }
    }

    pub fn with_graph_params(mut self, m: usize, ef_construction: usize, ef_search: usize) -> Self {
        self.m = m;
        self.ef_construction = ef_construction;
        self.ef_search = ef_search;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::config("index name must not be empty"));
        }
        if self.dimension == 0 {
            return Err(DomainError::config("index dimension must be positive"));
        }
        if self.m < 2 {
            return Err(DomainError::config(format!("HNSW M must be >= 2, got {}", self.m)));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(DomainError::config("HNSW ef parameters must be positive"));
        }
        Ok(())
    }

    fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            seed: self.seed,
            ..HnswParams::new(self.m, self.ef_construction, self.metric)
        }
    }
}

/// Provenance recorded alongside a built index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub built_at: DateTime<Utc>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
}

impl Default for IndexMetadata {
    fn default() -> Self {
        Self {
            built_at: Utc::now(),
            embedding_model: None,
            chunk_size: None,
            chunk_overlap: None,
        }
    }
}

/// Chunks plus the proximity graph over their embeddings. Immutable once
/// built; rebuilding produces a new value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswIndex {
    config: IndexConfig,
    metadata: IndexMetadata,
    chunks: Vec<Chunk>,
    graph: HnswGraph,
}

impl HnswIndex {
    pub fn empty(config: IndexConfig) -> Result<Self, DomainError> {
        Self::build(Vec::new(), config)
    }

    #[instrument(skip(entries, config), fields(name = %config.name, count = entries.len()))]
    pub fn build(entries: Vec<IndexEntry>, config: IndexConfig) -> Result<Self, DomainError> {
        config.validate()?;

        let mut seen: HashSet<&str> = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if entry.embedding.dimension() != config.dimension {
                return Err(DomainError::config(format!(
                    "embedding for chunk '{}' has dimension {}, index '{}' expects {}",
                    entry.id(),
                    entry.embedding.dimension(),
                    config.name,
                    config.dimension
                )));
            }
            if !entry.embedding.is_finite() {
                return Err(DomainError::index_build(format!(
                    "embedding for chunk '{}' contains non-finite values",
                    entry.id()
                )));
            }
            if !seen.insert(entry.id()) {
                return Err(DomainError::index_build(format!(
                    "duplicate chunk id '{}'",
                    entry.id()
                )));
            }
        }

        let mut graph = HnswGraph::new(config.hnsw_params());
        let mut chunks = Vec::with_capacity(entries.len());
        for entry in entries {
            graph.insert(entry.embedding.into_inner());
            chunks.push(entry.chunk);
        }

        tracing::info!(
            entries = chunks.len(),
            max_level = graph.max_level(),
            "index built"
        );

        Ok(Self {
            config,
            metadata: IndexMetadata::default(),
            chunks,
            graph,
        })
    }

    pub fn with_metadata(mut self, metadata: IndexMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn search(
        &self,
        query: &Embedding,
        params: &SearchParams,
    ) -> Result<RetrievalResult, DomainError> {
        if params.metric != self.config.metric {
            return Err(DomainError::config(format!(
                "index '{}' was built for {} similarity, search requested {}",
                self.config.name, self.config.metric, params.metric
            )));
        }
        if query.dimension() != self.config.dimension {
            return Err(DomainError::config(format!(
                "query has dimension {}, index '{}' expects {}",
                query.dimension(),
                self.config.name,
                self.config.dimension
            )));
        }

        let ef = params.ef.unwrap_or(self.config.ef_search);
        let hits = self
            .graph
            .search(query.as_slice(), params.k, ef)
            .into_iter()
            .filter(|(_, score)| params.threshold.map_or(true, |t| *score >= t))
            .map(|(id, score)| ScoredChunk {
                chunk: self.chunks[id as usize].clone(),
                score,
            })
            .collect();

        Ok(RetrievalResult::from_hits(hits))
    }

    /// Checks that chunks, graph and config agree. `build` guarantees this;
    /// a deserialized index has to be checked before it is searched.
    pub fn check_consistency(&self) -> Result<(), DomainError> {
        let corrupt = |detail: String| {
            DomainError::index_build(format!(
                "index '{}' is inconsistent: {detail}",
                self.config.name
            ))
        };

        self.config.validate().map_err(|e| corrupt(e.to_string()))?;
        if self.chunks.len() != self.graph.len() {
            return Err(corrupt(format!(
                "{} chunks for {} graph nodes",
                self.chunks.len(),
                self.graph.len()
            )));
        }
        if self.graph.params().metric != self.config.metric {
            return Err(corrupt(format!(
                "graph uses {} similarity, config says {}",
                self.graph.params().metric,
                self.config.metric
            )));
        }
        self.graph.validate(self.config.dimension).map_err(corrupt)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            name: self.config.name.clone(),
            entry_count: self.chunks.len(),
            dimension: self.config.dimension,
            index_type: HNSW_INDEX_TYPE.to_string(),
            built_at: Some(self.metadata.built_at),
            embedding_model: self.metadata.embedding_model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, v: Vec<f32>) -> IndexEntry {
        IndexEntry::new(
            Chunk::new(id, format!("text {id}"), "Title", "https://example.org/p.html", 0),
            Embedding::new(v),
        )
    }

    fn config() -> IndexConfig {
        IndexConfig::new("test", 3).with_graph_params(4, 32, 16)
    }

    #[test]
    fn test_dimension_mismatch_is_config_error() {
        let err = HnswIndex::build(
            vec![entry("a", vec![1.0, 0.0, 0.0]), entry("b", vec![1.0, 0.0])],
            config(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Config(_)));
    }

    #[test]
    fn test_duplicate_id_is_build_error() {
        let err = HnswIndex::build(
            vec![entry("a", vec![1.0, 0.0, 0.0]), entry("a", vec![0.0, 1.0, 0.0])],
            config(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::IndexBuild(_)));
    }

    #[test]
    fn test_non_finite_is_build_error() {
        let err = HnswIndex::build(vec![entry("a", vec![f32::NAN, 0.0, 0.0])], config())
            .unwrap_err();
        assert!(matches!(err, DomainError::IndexBuild(_)));
    }

    #[test]
    fn test_invalid_params_are_config_errors() {
        let bad_m = IndexConfig::new("x", 3).with_graph_params(1, 32, 16);
        assert!(matches!(bad_m.validate(), Err(DomainError::Config(_))));
        assert!(matches!(IndexConfig::new("x", 0).validate(), Err(DomainError::Config(_))));
    }

    #[test]
    fn test_empty_index_search_is_empty() {
        let index = HnswIndex::empty(config()).unwrap();
        let result = index
            .search(&Embedding::new(vec![1.0, 0.0, 0.0]), &SearchParams::top_k(5))
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(index.stats().entry_count, 0);
    }

    #[test]
    fn test_search_respects_k_order_and_threshold() {
        let index = HnswIndex::build(
            vec![
                entry("x", vec![1.0, 0.0, 0.0]),
                entry("xy", vec![1.0, 1.0, 0.0]),
                entry("y", vec![0.0, 1.0, 0.0]),
                entry("z", vec![0.0, 0.0, 1.0]),
            ],
            config(),
        )
        .unwrap();
        let query = Embedding::new(vec![1.0, 0.2, 0.0]);

        for k in 1..=6 {
            let result = index.search(&query, &SearchParams::top_k(k)).unwrap();
            assert!(result.len() <= k);
            let scores: Vec<f32> = result.hits().iter().map(|h| h.score).collect();
            assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        }

        let top = index.search(&query, &SearchParams::top_k(4)).unwrap();
        assert_eq!(top.chunk_ids()[0], "x");

        let filtered = index
            .search(&query, &SearchParams::top_k(4).with_threshold(0.5))
            .unwrap();
        assert!(filtered.hits().iter().all(|h| h.score >= 0.5));
        assert!(!filtered.chunk_ids().contains(&"z"));
    }

    #[test]
    fn test_query_dimension_and_metric_checked() {
        let index = HnswIndex::build(vec![entry("x", vec![1.0, 0.0, 0.0])], config()).unwrap();
        let wrong_dim = index.search(&Embedding::new(vec![1.0]), &SearchParams::top_k(1));
        assert!(matches!(wrong_dim, Err(DomainError::Config(_))));

        let wrong_metric = index.search(
            &Embedding::new(vec![1.0, 0.0, 0.0]),
            &SearchParams::top_k(1).with_metric(Metric::Euclidean),
        );
        assert!(matches!(wrong_metric, Err(DomainError::Config(_))));
    }

    #[test]
    fn test_rebuild_yields_identical_stats() {
        let entries = vec![
            entry("a", vec![1.0, 0.0, 0.0]),
            entry("b", vec![0.0, 1.0, 0.0]),
            entry("c", vec![0.0, 0.0, 1.0]),
        ];
        let first = HnswIndex::build(entries.clone(), config()).unwrap().stats();
        let second = HnswIndex::build(entries, config()).unwrap().stats();
        assert_eq!(first.entry_count, second.entry_count);
        assert_eq!(first.dimension, second.dimension);
        assert_eq!(first.index_type, "HNSW");
    }

    #[test]
    fn test_built_index_is_consistent() {
        let index = HnswIndex::build(
            vec![entry("a", vec![1.0, 0.0, 0.0]), entry("b", vec![0.0, 1.0, 0.0])],
            config(),
        )
        .unwrap();
        assert!(index.check_consistency().is_ok());
        assert!(HnswIndex::empty(config()).unwrap().check_consistency().is_ok());
    }

    #[test]
    fn test_missing_chunks_are_detected() {
        let mut index = HnswIndex::build(
            vec![
                entry("a", vec![1.0, 0.0, 0.0]),
                entry("b", vec![0.0, 1.0, 0.0]),
                entry("c", vec![0.0, 0.0, 1.0]),
            ],
            config(),
        )
        .unwrap();
        index.chunks.truncate(1);
        assert!(matches!(index.check_consistency(), Err(DomainError::IndexBuild(_))));
    }
}
