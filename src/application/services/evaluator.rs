use std::sync::Arc;
use tracing::instrument;

use super::rag::RagService;
use crate::domain::{
    ports::EmbeddingService, recall_at_k, ConversationState, DomainError, EvaluationRecord,
    EvaluationReport, QaItem,
};

/// Replays the QA set through the pipeline and scores retrieval and answers.
pub struct Evaluator {
    rag: Arc<RagService>,
    embedding: Arc<dyn EmbeddingService>,
}

impl Evaluator {
    pub fn new(rag: Arc<RagService>, embedding: Arc<dyn EmbeddingService>) -> Self {
        Self { rag, embedding }
    }

    /// Each item runs against a fresh, empty conversation, so the session
    /// history is never touched. A failed item is recorded with zero scores
    /// and the run continues.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn run(&self, items: &[QaItem], k: usize) -> Result<EvaluationReport, DomainError> {
        if k == 0 {
            return Err(DomainError::config("evaluation k must be positive"));
        }

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let record = match self.evaluate_item(item, k).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(qa_id = item.id, error = %e, "evaluation item failed");
                    EvaluationRecord {
                        id: item.id,
                        question: item.question.clone(),
                        category: item.category.clone(),
                        recall_at_k: 0.0,
                        answer_similarity: 0.0,
                        generated_answer: String::new(),
                        retrieved_chunk_ids: Vec::new(),
                        fallback_used: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            tracing::info!(
                qa_id = record.id,
                recall = record.recall_at_k,
                similarity = record.answer_similarity,
                "evaluated"
            );
            records.push(record);
        }

        let report = EvaluationReport::from_records(k, records);
        tracing::info!(
            avg_recall = report.overall_metrics.avg_recall_at_k,
            avg_similarity = report.overall_metrics.avg_answer_similarity,
            "evaluation complete"
        );
        Ok(report)
    }

    async fn evaluate_item(&self, item: &QaItem, k: usize) -> Result<EvaluationRecord, DomainError> {
        let mut conversation = ConversationState::new();
        let (answer, retrieval) = self
            .rag
            .answer_with(&item.question, k, &mut conversation)
            .await?;

        let recall = recall_at_k(
            &item.relevant_doc_ids,
            retrieval.hits().iter().map(|h| &h.chunk),
        );
        let similarity = self.answer_similarity(&answer.answer, &item.reference_answer).await?;

        Ok(EvaluationRecord {
            id: item.id,
            question: item.question.clone(),
            category: item.category.clone(),
            recall_at_k: recall,
            answer_similarity: similarity,
            generated_answer: answer.answer.clone(),
            retrieved_chunk_ids: retrieval
                .chunk_ids()
                .into_iter()
                .map(String::from)
                .collect(),
            fallback_used: answer.is_fallback(),
            error: None,
        })
    }

    pub async fn answer_similarity(
        &self,
        generated: &str,
        reference: &str,
    ) -> Result<f64, DomainError> {
        let embeddings = self.embedding.embed_batch(&[generated, reference]).await?;
        match embeddings.as_slice() {
            [a, b] => Ok(f64::from(a.cosine_similarity(b))),
            _ => Err(DomainError::embedding(format!(
                "expected 2 embeddings, got {}",
                embeddings.len()
            ))),
        }
    }
}
