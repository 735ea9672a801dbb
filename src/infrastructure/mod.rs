pub mod config;
pub mod corpus;
pub mod embedding;
pub mod llm;
pub mod vector_index;

pub use config::{AppConfig, Config, PromptsConfig};
pub use corpus::{load_chunks, load_qa_dataset, CorpusLimits};
pub use embedding::TextEmbedding;
pub use llm::{LlmProvider, RigLlm};
pub use vector_index::{
    FlatIndex, HnswIndex, IndexConfig, IndexMetadata, LiveIndex, SnapshotStore,
};
