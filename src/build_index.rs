use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pgdocs_rag::application::IndexService;
use pgdocs_rag::bootstrap::index_config;
use pgdocs_rag::infrastructure::{
    load_chunks, Config, CorpusLimits, HnswIndex, LiveIndex, SnapshotStore, TextEmbedding,
};

#[derive(Parser, Debug)]
#[command(
    name = "build-index",
    about = "Embed the chunk file and build the HNSW index snapshot"
)]
struct Cli {
    /// Chunk file produced by the chunker.
    #[arg(long, env = "CHUNKS_FILE")]
    chunks: Option<PathBuf>,

    /// Directory holding index snapshots.
    #[arg(long, env = "INDEX_DIR")]
    index_dir: Option<PathBuf>,

    /// Snapshot name.
    #[arg(long, env = "INDEX_NAME")]
    name: Option<String>,

    /// Keep only the first N distinct source documents.
    #[arg(long, env = "MAX_DOCS")]
    max_docs: Option<usize>,

    /// Keep only the first N chunks of each document.
    #[arg(long, env = "MAX_CHUNKS_PER_DOC")]
    max_chunks_per_doc: Option<usize>,

    /// Replace an existing snapshot without asking.
    #[arg(long, short = 'y')]
    yes: bool,
}

fn confirm_rebuild(path: &std::path::Path) -> Result<bool> {
    if !io::stdin().is_terminal() {
        bail!(
            "snapshot {} already exists and stdin is not a terminal; pass --yes to rebuild",
            path.display()
        );
    }

    print!("Index snapshot {} already exists. Rebuild? (yes/no): ", path.display());
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "build_index=info,pgdocs_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(chunks) = cli.chunks {
        config.corpus.chunks_file = chunks;
    }
    if let Some(dir) = cli.index_dir {
        config.index.dir = dir;
    }
    if let Some(name) = cli.name {
        config.index.name = name;
    }
    let limits = CorpusLimits {
        max_docs: cli.max_docs.or(config.corpus.max_docs),
        max_chunks_per_doc: cli.max_chunks_per_doc.or(config.corpus.max_chunks_per_doc),
    };

    let snapshots = SnapshotStore::new(&config.index.dir);
    if snapshots.exists(&config.index.name).await && !cli.yes {
        let path = snapshots.path_for(&config.index.name);
        if !confirm_rebuild(&path)? {
            info!("keeping existing index");
            return Ok(());
        }
    }

    let chunks = load_chunks(&config.corpus.chunks_file, limits)
        .await
        .with_context(|| format!("loading {}", config.corpus.chunks_file.display()))?;
    if chunks.is_empty() {
        bail!("no chunks to index in {}", config.corpus.chunks_file.display());
    }

    let embedding = Arc::new(TextEmbedding::from_config(&config.embedding)?);
    let index_config = index_config(&config);
    let live = Arc::new(LiveIndex::new(HnswIndex::empty(index_config.clone())?));
    let indexer = IndexService::new(embedding, live, snapshots.clone(), index_config)
        .with_batching(config.embedding.batch_size, config.embedding.concurrency)
        .with_chunking(config.chunking.chunk_size, config.chunking.chunk_overlap);

    let started = Instant::now();
    info!(chunks = chunks.len(), "building index");
    let stats = indexer.rebuild(chunks).await?;

    println!("Index built in {:.1}s", started.elapsed().as_secs_f64());
    println!("  name:       {}", stats.name);
    println!("  type:       {}", stats.index_type);
    println!("  entries:    {}", stats.entry_count);
    println!("  dimension:  {}", stats.dimension);
    println!("  snapshot:   {}", snapshots.path_for(&stats.name).display());

    Ok(())
}
