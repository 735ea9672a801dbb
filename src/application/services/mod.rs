pub mod context;
pub mod evaluator;
pub mod generator;
pub mod indexing;
pub mod rag;
pub mod relevance;

pub use context::{ContextAssembler, PromptPayload};
pub use evaluator::Evaluator;
pub use generator::AnswerGenerator;
pub use indexing::IndexService;
pub use rag::{RagService, RagSettings};
pub use relevance::{parse_verdict, RelevanceGate, RelevanceVerdict};
