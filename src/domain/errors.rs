use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not parse relevance classification: {response:?}")]
    ClassificationParse { response: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Index build error: {0}")]
    IndexBuild(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn classification_parse(response: impl Into<String>) -> Self {
        Self::ClassificationParse {
            response: response.into(),
        }
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn index_build(msg: impl Into<String>) -> Self {
        Self::IndexBuild(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable identifier for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ClassificationParse { .. } => "classification_parse",
            Self::Embedding(_) => "embedding",
            Self::Generation(_) => "generation",
            Self::IndexBuild(_) => "index_build",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }

    /// Message safe to show to an end user. Never includes provider output or paths.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Config(_) => "The service is misconfigured. Please contact the operator.",
            Self::ClassificationParse { .. } => {
                "I could not determine whether your question is about PostgreSQL."
            }
            Self::Embedding(_) => "The search service is unavailable right now. Please try again.",
            Self::Generation(_) => {
                "I encountered an error while generating an answer. Please try again."
            }
            Self::IndexBuild(_) => "The document index could not be built.",
            Self::NotFound(_) => "The requested resource was not found.",
            Self::Internal(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_does_not_leak_details() {
        let err = DomainError::generation("upstream 500: api key sk-secret rejected");
        assert!(!err.user_message().contains("sk-secret"));
        assert!(err.to_string().contains("sk-secret"));
        assert_eq!(err.kind(), "generation");
    }

    #[test]
    fn test_kinds_are_distinct() {
        let errors = [
            DomainError::config("x"),
            DomainError::classification_parse("maybe"),
            DomainError::embedding("x"),
            DomainError::generation("x"),
            DomainError::index_build("x"),
            DomainError::not_found("x"),
            DomainError::internal("x"),
        ];
        let mut kinds: Vec<_> = errors.iter().map(DomainError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }
}
