//! doc-ingest command line
//!
//! Run with: cargo run -p doc-ingest -- process --input-dir data/input

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use doc_ingest::embeddings::EmbeddingGenerator;
use doc_ingest::processing::{ComponentHealth, ErrorTracker, IngestionOrchestrator};
use doc_ingest::vector_store::{InMemoryVectorStore, VectorStoreGateway};
use doc_ingest::IngestConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "doc-ingest",
    version,
    about = "Extract, chunk, embed and store documents for semantic search"
)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(long, short, global = true, env = "DOC_INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Qdrant URL
    #[arg(long, global = true)]
    qdrant_url: Option<String>,

    /// Target collection
    #[arg(long, global = true)]
    collection: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every supported file in the input directory
    Process {
        /// Directory scanned recursively
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Leave ingested files in place
        #[arg(long)]
        no_move: bool,

        /// Write vectors to an in-memory store instead of Qdrant
        #[arg(long)]
        dry_run: bool,
    },

    /// Ingest a single file
    ProcessFile {
        /// File to ingest
        path: PathBuf,
    },

    /// Print the most recent error log
    ShowErrors {
        /// Directory holding errors_*.json logs
        #[arg(long)]
        error_dir: Option<PathBuf>,
    },

    /// Check the vector store and the embedding model
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = IngestConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = cli.qdrant_url {
        config.vector_store.url = url;
    }
    if let Some(collection) = cli.collection {
        config.vector_store.collection = collection;
    }

    match cli.command {
        Command::Process {
            input_dir,
            no_move,
            dry_run,
        } => {
            if let Some(dir) = input_dir {
                config.paths.input_dir = dir;
            }
            if no_move || dry_run {
                config.paths.move_processed = false;
            }
            process(config, dry_run).await
        }
        Command::ProcessFile { path } => process_file(config, path).await,
        Command::ShowErrors { error_dir } => {
            show_errors(error_dir.unwrap_or_else(|| config.paths.error_dir.clone()))
        }
        Command::Health => health(config).await,
    }
}

async fn process(config: IngestConfig, dry_run: bool) -> anyhow::Result<()> {
    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Input: {}", config.paths.input_dir.display());
    tracing::info!("  - Collection: {}", config.vector_store.collection);
    tracing::info!("  - Embedding model: {} ({:?})", config.embeddings.model, config.embeddings.provider);
    tracing::info!("  - Chunk size: {}", config.chunking.chunk_size);

    let orchestrator = if dry_run {
        tracing::info!("Dry run: vectors go to an in-memory store");
        let embeddings = EmbeddingGenerator::new(&config);
        let store = VectorStoreGateway::new(Arc::new(InMemoryVectorStore::new()));
        IngestionOrchestrator::with_components(config, embeddings, store)
    } else {
        IngestionOrchestrator::new(config)?
    };

    let summary = orchestrator.run().await?;

    println!("\n{}", summary);
    if summary.failed > 0 {
        println!(
            "{}",
            style(format!("{} file(s) failed, run `doc-ingest show-errors` for details", summary.failed)).yellow()
        );
    }
    if let Some(reason) = summary.aborted {
        bail!("Run aborted: {}", reason);
    }
    Ok(())
}

async fn process_file(config: IngestConfig, path: PathBuf) -> anyhow::Result<()> {
    let orchestrator = IngestionOrchestrator::new(config)?;

    let report = orchestrator
        .process_single_file(&path)
        .await
        .with_context(|| format!("Failed to ingest {}", path.display()))?;

    println!(
        "{} {} ({}, {} chunks)",
        style("✓").green(),
        report.path.display(),
        report.file_type.display_name(),
        report.chunks
    );
    Ok(())
}

fn show_errors(error_dir: PathBuf) -> anyhow::Result<()> {
    let Some(log) = ErrorTracker::latest_log(&error_dir)? else {
        println!("No error logs found in {}", error_dir.display());
        return Ok(());
    };

    let records = ErrorTracker::read_log(&log).with_context(|| format!("Failed to read {}", log.display()))?;

    println!("{} {}", style("Error log:").bold(), log.display());
    println!("{} errors\n", records.len());

    let mut by_category: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &records {
        *by_category.entry(record.category.as_str()).or_default() += 1;
        println!(
            "{} [{}] {}",
            style(record.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            style(record.category).red(),
            record.file_path
        );
        println!("    {}", record.message);
    }

    if !by_category.is_empty() {
        println!();
        for (category, count) in by_category {
            println!("  {:<12} {}", category, count);
        }
    }
    Ok(())
}

async fn health(config: IngestConfig) -> anyhow::Result<()> {
    let orchestrator = IngestionOrchestrator::new(config)?;
    let report = orchestrator.health().await;

    print_component("Vector store", &report.vector_store);
    print_component("Embeddings", &report.embeddings);

    if !report.is_healthy() {
        bail!("Health check failed");
    }
    Ok(())
}

fn print_component(label: &str, component: &ComponentHealth) {
    let status = if component.healthy {
        style("healthy").green()
    } else {
        style("unhealthy").red()
    };
    print!("{:<14} {} ({})", label, status, component.name);
    match &component.detail {
        Some(detail) => println!(": {}", detail),
        None => println!(),
    }
}
