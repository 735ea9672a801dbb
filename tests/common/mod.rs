#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pgdocs_rag::application::{
    AnswerGenerator, ContextAssembler, RagService, RagSettings, RelevanceGate,
};
use pgdocs_rag::domain::{
    ports::{EmbeddingService, LlmService, VectorIndex},
    Chunk, DomainError, Embedding, IndexEntry, IndexStats, QaItem, RetrievalResult, SearchParams,
};
use pgdocs_rag::infrastructure::{HnswIndex, IndexConfig, LiveIndex, PromptsConfig};

pub const DIM: usize = 1024;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "what", "how", "does", "this", "that", "are", "can", "you",
    "from", "into", "each", "its", "which", "who", "use",
];

/// Bag-of-words embedding: every token of 3+ chars that is not a stopword
/// adds 1.0 to an FNV-1a bucket.
pub struct HashEmbedding {
    pub embed_calls: AtomicUsize,
}

impl HashEmbedding {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            embed_calls: AtomicUsize::new(0),
        })
    }

    pub fn vector(text: &str) -> Embedding {
        let mut v = vec![0.0f32; DIM];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in token.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % DIM as u64) as usize] += 1.0;
        }
        Embedding::new(v)
    }
}

#[async_trait]
impl EmbeddingService for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "hash-bow"
    }
}

/// Relevance: anything mentioning France or the World Cup is off-topic.
/// Generation echoes the question and how many sources it was given.
pub struct FakeLlm {
    pub relevance_calls: AtomicUsize,
    pub generation_calls: AtomicUsize,
    pub delay: Duration,
    pub fail_generation: bool,
}

impl FakeLlm {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            relevance_calls: AtomicUsize::new(0),
            generation_calls: AtomicUsize::new(0),
            delay,
            fail_generation: false,
        })
    }

    /// Classifies normally but every generation call errors.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            relevance_calls: AtomicUsize::new(0),
            generation_calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail_generation: true,
        })
    }

    pub fn generations(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
    }

    pub fn relevance_checks(&self) -> usize {
        self.relevance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmService for FakeLlm {
    async fn complete(&self, prompt: &str) -> Result<String, DomainError> {
        self.relevance_calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("France") || prompt.contains("World Cup") {
            Ok("IRRELEVANT\nThe question is about geography or sport.".to_string())
        } else {
            Ok("RELEVANT\nThe question is about PostgreSQL.".to_string())
        }
    }

    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, DomainError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.generation_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_generation {
            return Err(DomainError::generation("upstream returned 503"));
        }
        let sources = system.matches("[Source ").count();
        Ok(format!("Answer to '{prompt}' from {sources} sources"))
    }
}

/// Counts searches against the wrapped index.
pub struct CountingIndex {
    inner: Arc<dyn VectorIndex>,
    pub searches: AtomicUsize,
}

impl CountingIndex {
    pub fn new(inner: Arc<dyn VectorIndex>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            searches: AtomicUsize::new(0),
        })
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for CountingIndex {
    async fn search(
        &self,
        query: &Embedding,
        params: &SearchParams,
    ) -> Result<RetrievalResult, DomainError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(query, params).await
    }

    async fn stats(&self) -> IndexStats {
        self.inner.stats().await
    }
}

fn doc_chunk(slug: &str, title: &str, seq: usize, text: &str) -> Chunk {
    Chunk::new(
        format!("{slug}-{seq}"),
        text,
        title,
        format!("https://www.postgresql.org/docs/16/{slug}.html"),
        seq,
    )
}

pub fn corpus() -> Vec<Chunk> {
    vec![
        doc_chunk(
            "mvcc",
            "Concurrency Control",
            0,
            "MVCC multiversion concurrency control in PostgreSQL gives each transaction a snapshot of data.",
        ),
        doc_chunk(
            "mvcc",
            "Concurrency Control",
            1,
            "Readers never block writers and writers never block readers under MVCC.",
        ),
        doc_chunk(
            "sql-create-index",
            "CREATE INDEX",
            0,
            "CREATE INDEX constructs an index on the specified column of a table.",
        ),
        doc_chunk(
            "sql-vacuum",
            "VACUUM",
            0,
            "VACUUM reclaims storage occupied by dead tuples and prevents table bloat.",
        ),
        doc_chunk(
            "sql-begin",
            "BEGIN",
            0,
            "BEGIN initiates a transaction block; statements run until COMMIT or ROLLBACK.",
        ),
    ]
}

pub fn index_config(name: &str) -> IndexConfig {
    IndexConfig::new(name, DIM).with_graph_params(8, 64, 32)
}

pub fn build_index(chunks: Vec<Chunk>) -> HnswIndex {
    let entries = chunks
        .into_iter()
        .map(|c| {
            let e = HashEmbedding::vector(&c.text);
            IndexEntry::new(c, e)
        })
        .collect();
    HnswIndex::build(entries, index_config("postgresql_docs")).unwrap()
}

pub fn qa_items() -> Arc<Vec<QaItem>> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/qa_dataset.json");
    let bytes = std::fs::read(path).unwrap();
    Arc::new(serde_json::from_slice(&bytes).unwrap())
}

pub struct Harness {
    pub rag: Arc<RagService>,
    pub llm: Arc<FakeLlm>,
    pub index: Arc<CountingIndex>,
    pub embedding: Arc<HashEmbedding>,
    pub live: Arc<LiveIndex>,
    pub prompts: PromptsConfig,
}

pub fn harness_with(index: HnswIndex, llm: Arc<FakeLlm>) -> Harness {
    let prompts = PromptsConfig::bundled().unwrap();
    let embedding = HashEmbedding::new();
    let live = Arc::new(LiveIndex::new(index));
    let counting = CountingIndex::new(live.clone());

    let rag = Arc::new(RagService::new(
        RelevanceGate::new(llm.clone(), prompts.relevance_check.clone()),
        embedding.clone(),
        counting.clone(),
        ContextAssembler::new(prompts.system.clone(), 12_000, 200),
        AnswerGenerator::new(
            llm.clone(),
            embedding.clone(),
            qa_items(),
            0.25,
            prompts.no_answer_response.clone(),
        ),
        RagSettings {
            top_k: 3,
            history_turns: 6,
        },
        prompts.irrelevant_response.clone(),
    ));

    Harness {
        rag,
        llm,
        index: counting,
        embedding,
        live,
        prompts,
    }
}

pub fn harness() -> Harness {
    harness_with(build_index(corpus()), FakeLlm::new())
}
