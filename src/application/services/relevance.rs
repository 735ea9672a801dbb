use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use crate::domain::{ports::LlmService, DomainError, PromptTemplate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevanceVerdict {
    pub relevant: bool,
    pub rationale: String,
}

/// Asks the LLM whether a question is in-domain before any retrieval happens.
pub struct RelevanceGate {
    llm: Arc<dyn LlmService>,
    template: PromptTemplate,
}

impl RelevanceGate {
    pub fn new(llm: Arc<dyn LlmService>, template: PromptTemplate) -> Self {
        Self { llm, template }
    }

    /// Classifies without recovering from unparseable responses.
    #[instrument(skip(self))]
    pub async fn classify(&self, question: &str) -> Result<RelevanceVerdict, DomainError> {
        let prompt = self
            .template
            .render(&HashMap::from([("question", question)]));
        let response = self.llm.complete(&prompt).await?;
        parse_verdict(&response)
    }

    /// Like [`classify`](Self::classify), but an unparseable response rejects
    /// the question. Transport failures still propagate.
    pub async fn check(&self, question: &str) -> Result<RelevanceVerdict, DomainError> {
        match self.classify(question).await {
            Ok(verdict) => {
                tracing::debug!(relevant = verdict.relevant, "relevance classified");
                Ok(verdict)
            }
            Err(DomainError::ClassificationParse { response }) => {
                tracing::warn!(response = %first_line(&response), "unrecognized relevance response, rejecting");
                Ok(RelevanceVerdict {
                    relevant: false,
                    rationale: format!(
                        "Could not parse relevance classification: {}",
                        first_line(&response)
                    ),
                })
            }
            Err(e) => Err(e),
        }
    }
}

pub fn parse_verdict(response: &str) -> Result<RelevanceVerdict, DomainError> {
    let token = response
        .split_whitespace()
        .next()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '_'))
        .unwrap_or_default()
        .to_ascii_uppercase();

    let relevant = match token.as_str() {
        "RELEVANT" | "YES" => true,
        "IRRELEVANT" | "NO" | "NOT_RELEVANT" => false,
        _ => return Err(DomainError::classification_parse(response)),
    };

    Ok(RelevanceVerdict {
        relevant,
        rationale: first_line(response).to_string(),
    })
}

fn first_line(text: &str) -> &str {
    text.trim().lines().next().unwrap_or_default().trim()
}
