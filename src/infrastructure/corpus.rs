use std::collections::HashMap;
use std::path::Path;
use tracing::instrument;

use crate::domain::{Chunk, ChunkRecord, DomainError, QaItem};

/// Limits applied when reading the chunk file.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusLimits {
    /// Keep only the first `max_docs` distinct sources, in file order.
    pub max_docs: Option<usize>,
    pub max_chunks_per_doc: Option<usize>,
}

async fn read(path: &Path, what: &str) -> Result<Vec<u8>, DomainError> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            DomainError::not_found(format!("{what} not found at {}", path.display()))
        }
        _ => DomainError::internal(format!("failed to read {}: {e}", path.display())),
    })
}

#[instrument(skip(limits))]
pub async fn load_chunks(path: &Path, limits: CorpusLimits) -> Result<Vec<Chunk>, DomainError> {
    let bytes = read(path, "chunk file").await?;
    let records: Vec<ChunkRecord> = serde_json::from_slice(&bytes).map_err(|e| {
        DomainError::index_build(format!("malformed chunk file {}: {e}", path.display()))
    })?;
    let total = records.len();
    let chunks = apply_limits(records.into_iter().map(ChunkRecord::into_chunk), limits);

    tracing::info!(total, kept = chunks.len(), "chunks loaded");
    Ok(chunks)
}

pub fn apply_limits(chunks: impl IntoIterator<Item = Chunk>, limits: CorpusLimits) -> Vec<Chunk> {
    let mut per_doc: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();

    for chunk in chunks {
        let new_doc = !per_doc.contains_key(&chunk.source_url);
        if new_doc && limits.max_docs.is_some_and(|max| per_doc.len() >= max) {
            continue;
        }
        let count = per_doc.entry(chunk.source_url.clone()).or_insert(0);
        if limits.max_chunks_per_doc.is_some_and(|max| *count >= max) {
            continue;
        }
        *count += 1;
        out.push(chunk);
    }

    out
}

#[instrument]
pub async fn load_qa_dataset(path: &Path) -> Result<Vec<QaItem>, DomainError> {
    let bytes = read(path, "QA dataset").await?;
    let items: Vec<QaItem> = serde_json::from_slice(&bytes).map_err(|e| {
        DomainError::config(format!("malformed QA dataset {}: {e}", path.display()))
    })?;
    tracing::info!(count = items.len(), "QA dataset loaded");
    Ok(items)
}
