use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::instrument;

use super::context::PromptPayload;
use crate::domain::{
    ports::{EmbeddingService, LlmService},
    Answer, ConversationState, ConversationTurn, DomainError, Embedding, FallbackMatch, QaItem,
};

/// Produces answers from assembled prompts, falling back to the curated QA
/// set when retrieval is too weak to ground an LLM answer.
pub struct AnswerGenerator {
    llm: Arc<dyn LlmService>,
    embedding: Arc<dyn EmbeddingService>,
    qa_items: Arc<Vec<QaItem>>,
    qa_embeddings: OnceCell<Vec<Embedding>>,
    confidence_floor: f32,
    no_answer_response: String,
}

impl AnswerGenerator {
    pub fn new(
        llm: Arc<dyn LlmService>,
        embedding: Arc<dyn EmbeddingService>,
        qa_items: Arc<Vec<QaItem>>,
        confidence_floor: f32,
        no_answer_response: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            embedding,
            qa_items,
            qa_embeddings: OnceCell::new(),
            confidence_floor,
            no_answer_response: no_answer_response.into(),
        }
    }

    pub fn confidence_floor(&self) -> f32 {
        self.confidence_floor
    }

    /// True when nothing was retrieved or every hit scores below the floor.
    pub fn needs_fallback(&self, payload: &PromptPayload) -> bool {
        payload
            .top_score
            .map_or(true, |top| top < self.confidence_floor)
    }

    /// Answers `payload` and, on success only, records the exchange in
    /// `conversation`.
    #[instrument(skip(self, payload, conversation), fields(top_score = ?payload.top_score))]
    pub async fn generate(
        &self,
        payload: &PromptPayload,
        conversation: &mut ConversationState,
    ) -> Result<Answer, DomainError> {
        let answer = if self.needs_fallback(payload) {
            self.fallback(&payload.question).await?
        } else {
            let text = self
                .llm
                .complete_with_system(&payload.system, &payload.question)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "generation failed"))?;
            let mut answer = Answer::generated(text.trim(), payload.sources());
            answer.context_truncated = payload.truncated();
            answer
        };

        conversation.append(ConversationTurn::user(&payload.question));
        conversation.append(ConversationTurn::assistant(&answer.answer));
        Ok(answer)
    }

    /// The reference answer of the QA item whose question is closest to
    /// `question`. Never calls the LLM.
    #[instrument(skip(self))]
    pub async fn fallback(&self, question: &str) -> Result<Answer, DomainError> {
        if self.qa_items.is_empty() {
            tracing::warn!("QA dataset is empty, returning no-answer text");
            return Ok(Answer::from_fallback(
                self.no_answer_response.clone(),
                FallbackMatch {
                    qa_id: None,
                    question: None,
                    similarity: 0.0,
                },
            ));
        }

        let query = self.embedding.embed(question).await?;
        let candidates = self.qa_embeddings().await?;

        let (best, similarity) = candidates
            .iter()
            .map(|e| query.cosine_similarity(e))
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |(bi, bs), (i, s)| {
                if s > bs {
                    (i, s)
                } else {
                    (bi, bs)
                }
            });

        let item = &self.qa_items[best];
        tracing::info!(qa_id = item.id, similarity, "answered from QA dataset");

        Ok(Answer::from_fallback(
            item.reference_answer.clone(),
            FallbackMatch {
                qa_id: Some(item.id),
                question: Some(item.question.clone()),
                similarity,
            },
        ))
    }

    async fn qa_embeddings(&self) -> Result<&Vec<Embedding>, DomainError> {
        self.qa_embeddings
            .get_or_try_init(|| async {
                let questions: Vec<&str> =
                    self.qa_items.iter().map(|q| q.question.as_str()).collect();
                let embeddings = self.embedding.embed_batch(&questions).await?;
                if embeddings.len() != questions.len() {
                    return Err(DomainError::embedding(format!(
                        "expected {} QA embeddings, got {}",
                        questions.len(),
                        embeddings.len()
                    )));
                }
                tracing::debug!(count = embeddings.len(), "QA question embeddings cached");
                Ok(embeddings)
            })
            .await
    }
}
