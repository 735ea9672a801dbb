//! Application layer - Use cases and orchestration.
//!
//! Services depend on domain ports (traits) rather than concrete
//! implementations, except index building, which owns the concrete HNSW
//! index it publishes.

pub mod services;

pub use services::{
    AnswerGenerator, ContextAssembler, Evaluator, IndexService, PromptPayload, RagService,
    RagSettings, RelevanceGate, RelevanceVerdict,
};
