use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::domain::{DomainError, PromptTemplate};

const DEFAULT_PROMPTS: &str = include_str!("../../config/prompts.yaml");

#[derive(Debug, Clone)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub chunking: ChunkingConfig,
    pub index: IndexSettings,
    pub rag: RagConfig,
    pub corpus: CorpusConfig,
    pub server: ServerConfig,
    pub prompts_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    /// Embedding batches in flight at once during an index build.
    pub concurrency: usize,
    /// Upper bound on a single embedding request.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f64,
    pub timeout_seconds: u64,
    pub max_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub name: String,
    pub dir: PathBuf,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub top_k: usize,
    pub fallback_confidence_floor: f32,
    pub context_char_budget: usize,
    /// Counted in messages, so 6 is three question/answer exchanges.
    pub history_turns: usize,
    pub history_message_chars: usize,
}

#[derive(Debug, Clone)]
pub struct CorpusConfig {
    pub chunks_file: PathBuf,
    pub qa_dataset_path: PathBuf,
    pub max_docs: Option<usize>,
    pub max_chunks_per_doc: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig {
                model: "text-embedding-3-small".to_string(),
                dimension: 1536,
                batch_size: 64,
                concurrency: 4,
                timeout_seconds: 30,
            },
            llm: LlmConfig {
                model: "gpt-4o".to_string(),
                temperature: 0.1,
                timeout_seconds: 60,
                max_tokens: 1024,
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
            },
            index: IndexSettings {
                name: "postgresql_docs".to_string(),
                dir: PathBuf::from("data/index"),
                m: 16,
                ef_construction: 256,
                ef_search: 64,
            },
            rag: RagConfig {
                top_k: 5,
                fallback_confidence_floor: 0.25,
                context_char_budget: 12_000,
                history_turns: 6,
                history_message_chars: 200,
            },
            corpus: CorpusConfig {
                chunks_file: PathBuf::from("data/chunks.json"),
                qa_dataset_path: PathBuf::from("data/qa_dataset.json"),
                max_docs: None,
                max_chunks_per_doc: None,
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                cors_allowed_origins: Vec::new(),
            },
            prompts_path: None,
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self, DomainError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, starting from defaults.
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("EMBEDDING_MODEL") {
            config.embedding.model = v;
        }
        parse_into(&get, "EMBEDDING_DIMENSION", &mut config.embedding.dimension)?;
        parse_into(&get, "EMBEDDING_BATCH_SIZE", &mut config.embedding.batch_size)?;
        parse_into(&get, "EMBEDDING_CONCURRENCY", &mut config.embedding.concurrency)?;
        parse_into(
            &get,
            "EMBEDDING_TIMEOUT_SECONDS",
            &mut config.embedding.timeout_seconds,
        )?;

        if let Some(v) = get("LLM_MODEL") {
            config.llm.model = v;
        }
        parse_into(&get, "LLM_TEMPERATURE", &mut config.llm.temperature)?;
        parse_into(&get, "LLM_TIMEOUT_SECONDS", &mut config.llm.timeout_seconds)?;
        parse_into(&get, "LLM_MAX_TOKENS", &mut config.llm.max_tokens)?;

        parse_into(&get, "CHUNK_SIZE", &mut config.chunking.chunk_size)?;
        parse_into(&get, "CHUNK_OVERLAP", &mut config.chunking.chunk_overlap)?;

        if let Some(v) = get("INDEX_NAME") {
            config.index.name = v;
        }
        if let Some(v) = get("INDEX_DIR") {
            config.index.dir = PathBuf::from(v);
        }
        parse_into(&get, "HNSW_M", &mut config.index.m)?;
        parse_into(&get, "HNSW_EF_CONSTRUCTION", &mut config.index.ef_construction)?;
        parse_into(&get, "HNSW_EF", &mut config.index.ef_search)?;

        parse_into(&get, "TOP_K", &mut config.rag.top_k)?;
        parse_into(
            &get,
            "FALLBACK_CONFIDENCE_FLOOR",
            &mut config.rag.fallback_confidence_floor,
        )?;
        parse_into(&get, "CONTEXT_CHAR_BUDGET", &mut config.rag.context_char_budget)?;
        parse_into(&get, "HISTORY_TURNS", &mut config.rag.history_turns)?;
        parse_into(&get, "HISTORY_MESSAGE_CHARS", &mut config.rag.history_message_chars)?;

        if let Some(v) = get("CHUNKS_FILE") {
            config.corpus.chunks_file = PathBuf::from(v);
        }
        if let Some(v) = get("QA_DATASET_PATH") {
            config.corpus.qa_dataset_path = PathBuf::from(v);
        }
        config.corpus.max_docs = parse_opt(&get, "MAX_DOCS")?;
        config.corpus.max_chunks_per_doc = parse_opt(&get, "MAX_CHUNKS_PER_DOC")?;

        if let Some(v) = get("SERVER_HOST") {
            config.server.host = v;
        }
        parse_into(&get, "SERVER_PORT", &mut config.server.port)?;
        if let Some(v) = get("CORS_ALLOWED_ORIGINS") {
            config.server.cors_allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        config.prompts_path = get("PROMPTS_PATH").map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.embedding.dimension == 0 {
            return Err(DomainError::config("EMBEDDING_DIMENSION must be positive"));
        }
        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            return Err(DomainError::config(
                "EMBEDDING_BATCH_SIZE and EMBEDDING_CONCURRENCY must be positive",
            ));
        }
        if self.embedding.timeout_seconds == 0 || self.llm.timeout_seconds == 0 {
            return Err(DomainError::config(
                "EMBEDDING_TIMEOUT_SECONDS and LLM_TIMEOUT_SECONDS must be positive",
            ));
        }
        if self.rag.top_k == 0 {
            return Err(DomainError::config("TOP_K must be positive"));
        }
        if self.rag.context_char_budget == 0 {
            return Err(DomainError::config("CONTEXT_CHAR_BUDGET must be positive"));
        }
        if !(-1.0..=1.0).contains(&self.rag.fallback_confidence_floor) {
            return Err(DomainError::config(format!(
                "FALLBACK_CONFIDENCE_FLOOR must be within [-1, 1], got {}",
                self.rag.fallback_confidence_floor
            )));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(DomainError::config("CHUNK_OVERLAP must be smaller than CHUNK_SIZE"));
        }
        if self.index.m < 2 {
            return Err(DomainError::config("HNSW_M must be at least 2"));
        }
        if self.index.ef_construction == 0 || self.index.ef_search == 0 {
            return Err(DomainError::config("HNSW ef parameters must be positive"));
        }
        Ok(())
    }

    pub fn index_snapshot_path(&self) -> PathBuf {
        self.index.dir.join(format!("{}.json", self.index.name))
    }
}

fn parse_into<T, G>(get: &G, key: &str, slot: &mut T) -> Result<(), DomainError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *slot = parse_value(key, &raw)?;
    }
    Ok(())
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>, DomainError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key).map(|raw| parse_value(key, &raw)).transpose()
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, DomainError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| DomainError::config(format!("{key}={raw:?} is invalid: {e}")))
}

#[derive(Debug, Deserialize)]
struct RawPrompts {
    system_prompt: String,
    relevance_check_prompt: String,
    irrelevant_response: String,
    no_answer_response: String,
    error_response: String,
}

/// Prompt templates, validated once at load time.
#[derive(Debug, Clone)]
pub struct PromptsConfig {
    pub system: PromptTemplate,
    pub relevance_check: PromptTemplate,
    pub irrelevant_response: String,
    pub no_answer_response: String,
    pub error_response: String,
}

impl PromptsConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, DomainError> {
        let raw: RawPrompts = serde_yaml::from_str(yaml)
            .map_err(|e| DomainError::config(format!("invalid prompts file: {e}")))?;

        Ok(Self {
            system: PromptTemplate::parse(
                "system_prompt",
                raw.system_prompt,
                &["context", "chat_history"],
            )?,
            relevance_check: PromptTemplate::parse(
                "relevance_check_prompt",
                raw.relevance_check_prompt,
                &["question"],
            )?,
            irrelevant_response: raw.irrelevant_response.trim().to_string(),
            no_answer_response: raw.no_answer_response.trim().to_string(),
            error_response: raw.error_response.trim().to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, DomainError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            DomainError::config(format!("cannot read prompts file {}: {e}", path.display()))
        })?;
        Self::from_yaml(&yaml)
    }

    /// The prompts bundled with the crate.
    pub fn bundled() -> Result<Self, DomainError> {
        Self::from_yaml(DEFAULT_PROMPTS)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config: Config,
    pub prompts: PromptsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, DomainError> {
        let config = Config::from_env()?;
        let prompts = match &config.prompts_path {
            Some(path) => PromptsConfig::load(path)?,
            None => PromptsConfig::bundled()?,
        };
        Ok(Self { config, prompts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.index.m, 16);
        assert_eq!(config.index.ef_construction, 256);
        assert_eq!(config.index.ef_search, 64);
        assert!((config.rag.fallback_confidence_floor - 0.25).abs() < f32::EPSILON);
        assert!(config.corpus.max_docs.is_none());
        assert_eq!(config.embedding.timeout_seconds, 30);
    }

    #[test]
    fn test_embedding_timeout_parsed_and_checked() {
        let config =
            Config::from_lookup(lookup(&[("EMBEDDING_TIMEOUT_SECONDS", "5")])).unwrap();
        assert_eq!(config.embedding.timeout_seconds, 5);

        let err =
            Config::from_lookup(lookup(&[("EMBEDDING_TIMEOUT_SECONDS", "0")])).unwrap_err();
        assert!(matches!(err, DomainError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("TOP_K", "8"),
            ("LLM_MODEL", "claude-3-5-sonnet-latest"),
            ("HNSW_EF", "128"),
            ("MAX_DOCS", "2"),
            ("MAX_CHUNKS_PER_DOC", " 5 "),
            ("INDEX_DIR", "/tmp/idx"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test"),
            ("PROMPTS_PATH", ""),
        ]))
        .unwrap();

        assert_eq!(config.rag.top_k, 8);
        assert_eq!(config.llm.model, "claude-3-5-sonnet-latest");
        assert_eq!(config.index.ef_search, 128);
        assert_eq!(config.corpus.max_docs, Some(2));
        assert_eq!(config.corpus.max_chunks_per_doc, Some(5));
        assert_eq!(config.server.cors_allowed_origins.len(), 2);
        assert_eq!(config.index_snapshot_path(), PathBuf::from("/tmp/idx/postgresql_docs.json"));
        assert!(config.prompts_path.is_none());
    }

    #[test]
    fn test_unparseable_value_is_config_error() {
        let err = Config::from_lookup(lookup(&[("TOP_K", "five")])).unwrap_err();
        assert!(matches!(err, DomainError::Config(_)));
        assert!(err.to_string().contains("TOP_K"));

        let err = Config::from_lookup(lookup(&[("FALLBACK_CONFIDENCE_FLOOR", "2.5")])).unwrap_err();
        assert!(matches!(err, DomainError::Config(_)));
    }

    #[test]
    fn test_bundled_prompts_are_valid() {
        let prompts = PromptsConfig::bundled().unwrap();
        assert!(prompts.system.has_placeholder("context"));
        assert!(prompts.system.has_placeholder("chat_history"));
        assert!(prompts.relevance_check.has_placeholder("question"));
        assert!(!prompts.irrelevant_response.is_empty());
    }

    #[test]
    fn test_prompts_missing_placeholder_rejected() {
        let yaml = r#"
system_prompt: "Answer using {context} only."
relevance_check_prompt: "Is this about PostgreSQL? {question}"
irrelevant_response: "Off topic."
no_answer_response: "No answer."
error_response: "Error."
"#;
        let err = PromptsConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, DomainError::Config(_)));
        assert!(err.to_string().contains("chat_history"));
    }
}
