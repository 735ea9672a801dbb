use serde::{Deserialize, Serialize};

use super::SourceRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub relevant: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_rationale: Option<String>,
    /// Set when the answer came from the curated QA set instead of the LLM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackMatch>,
    #[serde(default)]
    pub context_truncated: bool,
}

impl Answer {
    pub fn generated(answer: impl Into<String>, sources: Vec<SourceRef>) -> Self {
        Self {
            answer: answer.into(),
            sources,
            relevant: true,
            relevance_rationale: None,
            fallback: None,
            context_truncated: false,
        }
    }

    pub fn from_fallback(answer: impl Into<String>, fallback: FallbackMatch) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
            relevant: true,
            relevance_rationale: None,
            fallback: Some(fallback),
            context_truncated: false,
        }
    }

    pub fn irrelevant(answer: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
            relevant: false,
            relevance_rationale: Some(rationale.into()),
            fallback: None,
            context_truncated: false,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackMatch {
    /// `None` when the QA set was empty and the configured no-answer text was used.
    pub qa_id: Option<u32>,
    pub question: Option<String>,
    pub similarity: f32,
}
