mod answer;
mod chunk;
mod conversation;
mod embedding;
mod evaluation;
mod index;
mod prompt;
mod qa;

pub use answer::{Answer, FallbackMatch};
pub use chunk::{
    document_slug, Chunk, ChunkRecord, ChunkRecordMetadata, IndexEntry, RetrievalResult,
    ScoredChunk, SourceRef,
};
pub use conversation::{ConversationState, ConversationTurn, Role};
pub use embedding::{cosine_similarity, Embedding};
pub use evaluation::{
    recall_at_k, CategoryMetrics, EvaluationRecord, EvaluationReport, OverallMetrics,
};
pub use index::{IndexStats, Metric, SearchParams};
pub use prompt::PromptTemplate;
pub use qa::QaItem;
