use std::sync::Arc;

use crate::application::{IndexService, RagService};
use crate::infrastructure::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<RagService>,
    pub indexer: Option<Arc<IndexService>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(rag: Arc<RagService>, config: AppConfig) -> Self {
        Self {
            rag,
            indexer: None,
            config: Arc::new(config),
        }
    }

    pub fn with_indexer(mut self, indexer: Arc<IndexService>) -> Self {
        self.indexer = Some(indexer);
        self
    }
}
