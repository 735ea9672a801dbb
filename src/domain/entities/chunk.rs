use serde::{Deserialize, Serialize};

use super::Embedding;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source_title: String,
    pub source_url: String,
    pub sequence_index: usize,
}

impl Chunk {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        source_title: impl Into<String>,
        source_url: impl Into<String>,
        sequence_index: usize,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source_title: source_title.into(),
            source_url: source_url.into(),
            sequence_index,
        }
    }

    /// The page this chunk was cut from, e.g. `sql-create-index` for
    /// `https://www.postgresql.org/docs/16/sql-create-index.html`.
    pub fn document_slug(&self) -> &str {
        document_slug(&self.source_url)
    }
}

pub fn document_slug(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
    last.strip_suffix(".html").unwrap_or(last)
}

/// One element of the chunker's output file.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    pub metadata: ChunkRecordMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkRecordMetadata {
    pub source: String,
    pub title: String,
    pub chunk_id: usize,
    #[serde(default)]
    pub total_chunks: Option<usize>,
}

impl ChunkRecord {
    pub fn into_chunk(self) -> Chunk {
        let id = self.id.unwrap_or_else(|| {
            format!(
                "{}-{}",
                document_slug(&self.metadata.source),
                self.metadata.chunk_id
            )
        });
        Chunk {
            id,
            text: self.text,
            source_title: self.metadata.title,
            source_url: self.metadata.source,
            sequence_index: self.metadata.chunk_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Embedding,
}

impl IndexEntry {
    pub fn new(chunk: Chunk, embedding: Embedding) -> Self {
        Self { chunk, embedding }
    }

    pub fn id(&self) -> &str {
        &self.chunk.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Hits ordered by descending score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sorts by descending score; equal scores keep their incoming order.
    pub fn from_hits(mut hits: Vec<ScoredChunk>) -> Self {
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Self { hits }
    }

    pub fn hits(&self) -> &[ScoredChunk] {
        &self.hits
    }

    pub fn into_hits(self) -> Vec<ScoredChunk> {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn top_score(&self) -> Option<f32> {
        self.hits.first().map(|h| h.score)
    }

    pub fn chunk_ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.chunk.id.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    pub score: f32,
}

impl From<&ScoredChunk> for SourceRef {
    fn from(hit: &ScoredChunk) -> Self {
        Self {
            title: hit.chunk.source_title.clone(),
            url: hit.chunk.source_url.clone(),
            score: hit.score,
        }
    }
}
