use pgdocs_rag::api::{create_router, AppState};
use pgdocs_rag::bootstrap::Components;
use pgdocs_rag::infrastructure::{AppConfig, RigLlm, TextEmbedding};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=debug,pgdocs_rag=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let app_config = AppConfig::load()?;
    let embedding = Arc::new(TextEmbedding::from_config(&app_config.config.embedding)?);
    let llm = Arc::new(RigLlm::from_config(&app_config.config.llm)?);

    let components = Components::wire(&app_config, embedding, llm).await?;
    info!(
        entries = components.live.current().len(),
        qa_items = components.qa_items.len(),
        "pipeline initialized"
    );

    let addr = SocketAddr::new(
        app_config.config.server.host.parse()?,
        app_config.config.server.port,
    );

    let state = AppState::new(components.rag, app_config).with_indexer(components.indexer);
    let app = create_router(state);

    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
