use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pgdocs_rag::application::Evaluator;
use pgdocs_rag::bootstrap::Components;
use pgdocs_rag::infrastructure::{load_qa_dataset, AppConfig, RigLlm, TextEmbedding};

#[derive(Parser, Debug)]
#[command(
    name = "evaluate",
    about = "Score retrieval recall and answer similarity against the QA dataset"
)]
struct Cli {
    /// QA dataset to replay.
    #[arg(long, env = "QA_DATASET_PATH")]
    dataset: Option<PathBuf>,

    /// Top-K chunks retrieved per question.
    #[arg(long, short = 'k', env = "TOP_K", default_value_t = 5)]
    k: usize,

    /// Where to write the JSON report.
    #[arg(long, default_value = "evaluation_results.json")]
    output: PathBuf,

    /// Evaluate only the first N questions.
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evaluate=info,pgdocs_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut app_config = AppConfig::load()?;
    if let Some(dataset) = cli.dataset {
        app_config.config.corpus.qa_dataset_path = dataset;
    }

    let mut items = load_qa_dataset(&app_config.config.corpus.qa_dataset_path)
        .await
        .context("loading QA dataset")?;
    if let Some(limit) = cli.limit {
        items.truncate(limit);
    }

    let embedding = Arc::new(TextEmbedding::from_config(&app_config.config.embedding)?);
    let llm = Arc::new(RigLlm::from_config(&app_config.config.llm)?);
    let components = Components::wire(&app_config, embedding, llm).await?;
    if components.live.current().is_empty() {
        anyhow::bail!("the index is empty; run build-index first");
    }

    let evaluator = Evaluator::new(components.rag.clone(), components.embedding.clone());
    let report = evaluator.run(&items, cli.k).await?;

    let json = serde_json::to_string_pretty(&report)?;
    tokio::fs::write(&cli.output, json)
        .await
        .with_context(|| format!("writing {}", cli.output.display()))?;

    println!("Evaluated {} questions (k = {})", report.total_questions, report.k);
    println!(
        "  avg recall@k:          {:.3}",
        report.overall_metrics.avg_recall_at_k
    );
    println!(
        "  avg answer similarity: {:.3}",
        report.overall_metrics.avg_answer_similarity
    );
    if report.overall_metrics.failed > 0 {
        println!(
            "  failed questions:      {} (scored as 0)",
            report.overall_metrics.failed
        );
    }
    for (category, metrics) in &report.category_metrics {
        println!(
            "  {category:<14} n={:<3} failed={:<3} recall={:.3} similarity={:.3}",
            metrics.count, metrics.failed, metrics.avg_recall_at_k, metrics.avg_answer_similarity
        );
    }
    info!(output = %cli.output.display(), run_id = %report.run_id, "report written");

    Ok(())
}
