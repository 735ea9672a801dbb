//! Wires configuration, adapters and services into a running pipeline.

use std::sync::Arc;

use crate::application::{
    AnswerGenerator, ContextAssembler, IndexService, RagService, RagSettings, RelevanceGate,
};
use crate::domain::{
    ports::{EmbeddingService, LlmService},
    DomainError, QaItem,
};
use crate::infrastructure::{
    load_qa_dataset, AppConfig, Config, HnswIndex, IndexConfig, LiveIndex, SnapshotStore,
};

pub struct Components {
    pub embedding: Arc<dyn EmbeddingService>,
    pub live: Arc<LiveIndex>,
    pub indexer: Arc<IndexService>,
    pub rag: Arc<RagService>,
    pub qa_items: Arc<Vec<QaItem>>,
}

pub fn index_config(config: &Config) -> IndexConfig {
    IndexConfig::new(&config.index.name, config.embedding.dimension).with_graph_params(
        config.index.m,
        config.index.ef_construction,
        config.index.ef_search,
    )
}

impl Components {
    /// Loads the QA dataset and the persisted index (empty when no snapshot
    /// exists yet) and builds the services around the given adapters.
    pub async fn wire(
        app: &AppConfig,
        embedding: Arc<dyn EmbeddingService>,
        llm: Arc<dyn LlmService>,
    ) -> Result<Self, DomainError> {
        let config = &app.config;

        let qa_items = match load_qa_dataset(&config.corpus.qa_dataset_path).await {
            Ok(items) => items,
            Err(DomainError::NotFound(msg)) => {
                tracing::warn!(%msg, "QA dataset missing, fallback will return the no-answer text");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let qa_items = Arc::new(qa_items);

        let snapshots = SnapshotStore::new(&config.index.dir);
        let index_config = index_config(config);
        let initial = match snapshots.load(&config.index.name).await {
            Ok(index) => index,
            Err(DomainError::NotFound(_)) => {
                tracing::warn!(
                    path = %snapshots.path_for(&config.index.name).display(),
                    "no index snapshot found, starting with an empty index; run build-index"
                );
                HnswIndex::empty(index_config.clone())?
            }
            Err(e) => return Err(e),
        };
        if initial.config().dimension != embedding.dimension() {
            return Err(DomainError::config(format!(
                "index '{}' has dimension {}, embedding model produces {}",
                initial.name(),
                initial.config().dimension,
                embedding.dimension()
            )));
        }

        let live = Arc::new(LiveIndex::new(initial));
        let indexer = Arc::new(
            IndexService::new(embedding.clone(), live.clone(), snapshots, index_config)
                .with_batching(config.embedding.batch_size, config.embedding.concurrency)
                .with_chunking(config.chunking.chunk_size, config.chunking.chunk_overlap),
        );

        let rag = Arc::new(RagService::new(
            RelevanceGate::new(llm.clone(), app.prompts.relevance_check.clone()),
            embedding.clone(),
            live.clone(),
            ContextAssembler::new(
                app.prompts.system.clone(),
                config.rag.context_char_budget,
                config.rag.history_message_chars,
            ),
            AnswerGenerator::new(
                llm,
                embedding.clone(),
                qa_items.clone(),
                config.rag.fallback_confidence_floor,
                app.prompts.no_answer_response.clone(),
            ),
            RagSettings {
                top_k: config.rag.top_k,
                history_turns: config.rag.history_turns,
            },
            app.prompts.irrelevant_response.clone(),
        ));

        Ok(Self {
            embedding,
            live,
            indexer,
            rag,
            qa_items,
        })
    }
}
