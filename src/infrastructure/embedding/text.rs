use async_trait::async_trait;
use rig::client::{EmbeddingsClient, ProviderClient};
use rig::embeddings::{EmbeddingModel, EmbeddingsBuilder};
use rig::providers::openai;
use std::future::Future;
use std::time::Duration;
use tracing::instrument;

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};
use crate::infrastructure::config::EmbeddingConfig;

/// OpenAI embeddings through rig. Requires `OPENAI_API_KEY`.
pub struct TextEmbedding {
    client: openai::Client,
    model: String,
    dimension: usize,
    batch_size: usize,
    timeout: Duration,
}

impl TextEmbedding {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, DomainError> {
        if std::env::var("OPENAI_API_KEY").map_or(true, |k| k.trim().is_empty()) {
            return Err(DomainError::config(
                "OPENAI_API_KEY is not set; it is required for embeddings",
            ));
        }

        Ok(Self {
            client: openai::Client::from_env(),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn to_embedding(&self, vec: Vec<f64>) -> Result<Embedding, DomainError> {
        if vec.len() != self.dimension {
            return Err(DomainError::config(format!(
                "model '{}' returned {}-dimensional vectors, EMBEDDING_DIMENSION is {}",
                self.model,
                vec.len(),
                self.dimension
            )));
        }
        Ok(Embedding::new(vec.into_iter().map(|x| x as f32).collect()))
    }
}

#[async_trait]
impl EmbeddingService for TextEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        let model = self.client.embedding_model(&self.model);

        let request = EmbeddingsBuilder::new(model)
            .document(text.to_string())
            .map_err(|e| DomainError::embedding(e.to_string()))?
            .build();
        let embeddings = bounded(self.timeout, &self.model, request)
            .await?
            .map_err(|e| DomainError::embedding(e.to_string()))?;

        let (_doc, emb) = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::embedding("no embedding returned"))?;
        self.to_embedding(emb.first().vec)
    }

    /// Sends `texts` in requests of at most `batch_size` inputs. Output order
    /// matches input order.
    #[instrument(skip(self, texts), fields(count = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.client.embedding_model(&self.model);
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let request = model.embed_texts(batch.iter().map(|t| t.to_string()));
            let vectors = bounded(self.timeout, &self.model, request)
                .await?
                .map_err(|e| DomainError::embedding(e.to_string()))?;

            if vectors.len() != batch.len() {
                return Err(DomainError::embedding(format!(
                    "requested {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for v in vectors {
                out.push(self.to_embedding(v.vec)?);
            }
        }

        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Runs one embedding request, failing with `DomainError::Embedding` once
/// `timeout` elapses.
async fn bounded<F: Future>(
    timeout: Duration,
    model: &str,
    request: F,
) -> Result<F::Output, DomainError> {
    tokio::time::timeout(timeout, request).await.map_err(|_| {
        DomainError::embedding(format!(
            "embedding model '{model}' did not respond within {}s",
            timeout.as_secs_f64()
        ))
    })
}
