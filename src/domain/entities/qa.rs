use serde::{Deserialize, Serialize};

/// A curated question with its reference answer. Used as evaluation ground
/// truth and as the fallback answer source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaItem {
    pub id: u32,
    pub question: String,
    pub reference_answer: String,
    pub category: String,
    #[serde(default, alias = "relevant_docs")]
    pub relevant_doc_ids: Vec<String>,
}

impl QaItem {
    pub fn new(
        id: u32,
        question: impl Into<String>,
        reference_answer: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id,
            question: question.into(),
            reference_answer: reference_answer.into(),
            category: category.into(),
            relevant_doc_ids: Vec::new(),
        }
    }

    pub fn with_relevant_docs<I, S>(mut self, docs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relevant_doc_ids = docs.into_iter().map(Into::into).collect();
        self
    }
}
