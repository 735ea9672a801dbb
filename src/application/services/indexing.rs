use futures::{stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::instrument;

use crate::domain::{ports::EmbeddingService, Chunk, DomainError, IndexEntry, IndexStats};
use crate::infrastructure::vector_index::{
    HnswIndex, IndexConfig, IndexMetadata, LiveIndex, SnapshotStore,
};

/// Builds, persists and publishes the live index.
pub struct IndexService {
    embedding: Arc<dyn EmbeddingService>,
    live: Arc<LiveIndex>,
    snapshots: SnapshotStore,
    config: IndexConfig,
    batch_size: usize,
    concurrency: usize,
    chunking: Option<(usize, usize)>,
}

impl IndexService {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        live: Arc<LiveIndex>,
        snapshots: SnapshotStore,
        config: IndexConfig,
    ) -> Self {
        Self {
            embedding,
            live,
            snapshots,
            config,
            batch_size: 64,
            concurrency: 4,
            chunking: None,
        }
    }

    pub fn with_batching(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    /// Chunker settings recorded in the snapshot metadata.
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunking = Some((chunk_size, chunk_overlap));
        self
    }

    pub fn live(&self) -> &Arc<LiveIndex> {
        &self.live
    }

    pub fn index_name(&self) -> &str {
        &self.config.name
    }

    pub async fn snapshot_exists(&self) -> bool {
        self.snapshots.exists(&self.config.name).await
    }

    /// Embeds `chunks` in batches with up to `concurrency` requests in flight.
    /// Entries come back in chunk order.
    #[instrument(skip(self, chunks), fields(count = chunks.len(), batch_size = self.batch_size))]
    pub async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexEntry>, DomainError> {
        let batches: Vec<Vec<Chunk>> = chunks
            .chunks(self.batch_size)
            .map(<[Chunk]>::to_vec)
            .collect();
        let total = batches.len();

        let embedded: Vec<Vec<IndexEntry>> = stream::iter(batches.into_iter().enumerate())
            .map(|(n, batch)| async move {
                let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
                let embeddings = self.embedding.embed_batch(&texts).await?;
                if embeddings.len() != batch.len() {
                    return Err(DomainError::embedding(format!(
                        "batch {n}: requested {} embeddings, received {}",
                        batch.len(),
                        embeddings.len()
                    )));
                }
                tracing::debug!(batch = n + 1, total, "batch embedded");
                Ok::<_, DomainError>(
                    batch
                        .into_iter()
                        .zip(embeddings)
                        .map(|(chunk, embedding)| IndexEntry::new(chunk, embedding))
                        .collect::<Vec<_>>(),
                )
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(embedded.into_iter().flatten().collect())
    }

    /// Embeds and builds a new index without publishing it.
    #[instrument(skip(self, chunks), fields(name = %self.config.name, count = chunks.len()))]
    pub async fn build(&self, chunks: Vec<Chunk>) -> Result<HnswIndex, DomainError> {
        let entries = self.embed_chunks(chunks).await?;
        let config = self.config.clone();
        let metadata = IndexMetadata {
            embedding_model: Some(self.embedding.model_name().to_string()),
            chunk_size: self.chunking.map(|(size, _)| size),
            chunk_overlap: self.chunking.map(|(_, overlap)| overlap),
            ..IndexMetadata::default()
        };

        let index = tokio::task::spawn_blocking(move || HnswIndex::build(entries, config))
            .await
            .map_err(|e| DomainError::internal(format!("index build task failed: {e}")))??;

        Ok(index.with_metadata(metadata))
    }

    /// Builds from `chunks`, saves the snapshot, then swaps it live. Any
    /// failure leaves the current index serving.
    pub async fn rebuild(&self, chunks: Vec<Chunk>) -> Result<IndexStats, DomainError> {
        let index = self.build(chunks).await.inspect_err(|e| {
            tracing::error!(error = %e, "index rebuild failed, keeping current index")
        })?;
        self.snapshots.save(&index).await?;
        let stats = index.stats();
        self.live.swap(index);
        Ok(stats)
    }

    /// Loads the persisted snapshot and swaps it live.
    #[instrument(skip(self), fields(name = %self.config.name))]
    pub async fn reload(&self) -> Result<IndexStats, DomainError> {
        let index = self.snapshots.load(&self.config.name).await?;
        if index.config().dimension != self.embedding.dimension() {
            return Err(DomainError::config(format!(
                "snapshot '{}' has dimension {}, embedding model produces {}",
                index.name(),
                index.config().dimension,
                self.embedding.dimension()
            )));
        }
        let stats = index.stats();
        self.live.swap(index);
        Ok(stats)
    }
}
