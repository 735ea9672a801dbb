use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

use super::context::ContextAssembler;
use super::generator::AnswerGenerator;
use super::relevance::RelevanceGate;
use crate::domain::{
    ports::{EmbeddingService, VectorIndex},
    Answer, ConversationState, ConversationTurn, DomainError, IndexStats, RetrievalResult,
    SearchParams,
};

#[derive(Debug, Clone, Copy)]
pub struct RagSettings {
    pub top_k: usize,
    /// Messages of history given to the model.
    pub history_turns: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            history_turns: 6,
        }
    }
}

/// One question-answering session: relevance gate, retrieval, context
/// assembly and generation over a shared conversation.
pub struct RagService {
    gate: RelevanceGate,
    embedding: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    assembler: ContextAssembler,
    generator: AnswerGenerator,
    conversation: Mutex<ConversationState>,
    settings: RagSettings,
    irrelevant_response: String,
}

impl RagService {
    pub fn new(
        gate: RelevanceGate,
        embedding: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        assembler: ContextAssembler,
        generator: AnswerGenerator,
        settings: RagSettings,
        irrelevant_response: impl Into<String>,
    ) -> Self {
        Self {
            gate,
            embedding,
            index,
            assembler,
            generator,
            conversation: Mutex::new(ConversationState::new()),
            settings,
            irrelevant_response: irrelevant_response.into(),
        }
    }

    pub fn settings(&self) -> RagSettings {
        self.settings
    }

    /// Answers `question` against the shared conversation.
    ///
    /// The conversation lock is held for the whole call, so concurrent asks
    /// complete one after another and their turns never interleave. Turns are
    /// only appended once an answer exists; a dropped or failed call leaves
    /// the history untouched.
    #[instrument(skip(self), fields(top_k = self.settings.top_k))]
    pub async fn ask(&self, question: &str, check_relevance: bool) -> Result<Answer, DomainError> {
        let mut conversation = self.conversation.lock().await;

        if check_relevance {
            let verdict = self.gate.check(question).await?;
            if !verdict.relevant {
                tracing::info!(rationale = %verdict.rationale, "question rejected as out of domain");
                let answer = Answer::irrelevant(self.irrelevant_response.clone(), verdict.rationale);
                conversation.append(ConversationTurn::user(question));
                conversation.append(ConversationTurn::assistant(&answer.answer));
                return Ok(answer);
            }
        }

        let (answer, _) = self
            .answer_with(question, self.settings.top_k, &mut conversation)
            .await?;
        Ok(answer)
    }

    /// Retrieves, assembles and generates against `conversation` without the
    /// relevance gate. Also returns the retrieval the answer was built from.
    pub async fn answer_with(
        &self,
        question: &str,
        k: usize,
        conversation: &mut ConversationState,
    ) -> Result<(Answer, RetrievalResult), DomainError> {
        let retrieval = self.retrieve_top_k(question, k).await?;
        let payload =
            self.assembler
                .assemble(question, &retrieval, conversation, self.settings.history_turns);
        let answer = self.generator.generate(&payload, conversation).await?;

        tracing::info!(
            hits = retrieval.len(),
            fallback = answer.is_fallback(),
            truncated = answer.context_truncated,
            "question answered"
        );
        Ok((answer, retrieval))
    }

    #[instrument(skip(self))]
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult, DomainError> {
        self.retrieve_top_k(query, self.settings.top_k).await
    }

    #[instrument(skip(self))]
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<RetrievalResult, DomainError> {
        let embedding = self.embedding.embed(query).await?;
        self.index.search(&embedding, &SearchParams::top_k(top_k)).await
    }

    pub async fn history(&self) -> Vec<ConversationTurn> {
        self.conversation.lock().await.turns().to_vec()
    }

    pub async fn clear_history(&self) {
        self.conversation.lock().await.clear();
        tracing::info!("conversation cleared");
    }

    pub async fn stats(&self) -> IndexStats {
        self.index.stats().await
    }
}
