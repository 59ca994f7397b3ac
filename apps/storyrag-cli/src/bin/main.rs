use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use storyrag_core::config::Config;
use storyrag_core::source::DirectorySource;
use storyrag_core::types::{Meta, Personalization};
use storyrag_pipeline::AppContext;

#[derive(Parser, Debug)]
#[command(name = "storyrag")]
#[command(about = "Retrieve reference passages and generate personalized social stories")]
struct Cli {
    /// Directory holding config.toml (defaults to the current directory)
    #[arg(long, global = true, env = "STORYRAG_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk, embed and store every *.txt file under DIR, then persist the snapshot
    Ingest {
        /// Corpus directory (defaults to paths.corpus_dir)
        dir: Option<PathBuf>,
    },
    /// Show the passages retrieved for a query
    Search {
        query: String,
        /// Number of passages (defaults to rag.k)
        #[arg(short, long)]
        k: Option<usize>,
        /// Only consider chunks from this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Generate a story for one child
    Generate {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: String,
        #[arg(long)]
        situation: String,
        #[arg(long, default_value = "")]
        preferences: String,
        #[arg(long, default_value = "")]
        triggers: String,
        /// Override generation.timeout_secs for this call
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Re-embed the stored corpus and commit a fresh snapshot
    Rebuild,
    /// Print snapshot and index counts as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config_dir {
        Some(dir) => Config::load_from(dir),
        None => Config::load(),
    }
    .context("loading configuration")?;
    let settings = config.settings().context("invalid configuration")?;

    match cli.command {
        Command::Ingest { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&settings.paths.corpus_dir));
            if !dir.exists() {
                anyhow::bail!("Corpus directory does not exist: {}", dir.display());
            }
            let mut ctx = AppContext::from_settings(settings)
                .context("opening knowledge base (run `storyrag rebuild` if the snapshot is damaged)")?;
            println!("Ingesting from {}", dir.display());
            let report = ctx.ingest(&DirectorySource::new(&dir), true)?;
            let manifest = ctx.persist().context("persisting snapshot")?;
            println!("\nIngestion complete!");
            println!("  Documents:  {}", report.documents);
            println!("  Chunks:     {} ({} new, {} replaced)", report.chunks, report.inserted, report.replaced);
            println!("  Snapshot:   {} ({} entries)", manifest.snapshot_id, manifest.entries);
        }
        Command::Search { query, k, category } => {
            let k = k.unwrap_or(settings.rag.k);
            let ctx = AppContext::from_settings(settings)?;
            let retriever = ctx.retriever();
            let result = match category {
                Some(category) => {
                    let mut filter = Meta::new();
                    filter.insert("category".to_string(), category);
                    retriever.retrieve_filtered(&query, k, &filter)?
                }
                None => retriever.retrieve(&query, k)?,
            };
            println!("Found {} passages for: \"{}\"", result.len(), query);
            for (i, passage) in result.passages.iter().enumerate() {
                let chunk = &passage.chunk;
                println!("\n  {}. score={:.4}  id={}  source={}  chars={}..{}", i + 1, passage.score, chunk.id, chunk.source_id, chunk.start, chunk.end);
                println!("     {}", chunk.text.replace('\n', " "));
            }
        }
        Command::Generate { name, age, situation, preferences, triggers, timeout_secs } => {
            let ctx = AppContext::from_settings(settings)?;
            let pipeline = ctx.pipeline()?;
            let fields = Personalization { name, age, situation, preferences, triggers };
            let (result, trace) = pipeline.compose_traced(&fields, timeout_secs.map(Duration::from_secs)).await;
            tracing::debug!(stage = %trace.current(), "generation finished");
            let story = result.with_context(|| format!("story generation ended in {}", trace.current()))?;
            println!("{}", story.text);
        }
        Command::Rebuild => {
            let ctx = AppContext::rebuild_from_settings(settings).context("rebuilding from corpus")?;
            let status = ctx.status();
            println!("Rebuilt {} entries with {}", status.index_entries, status.embedder_id);
        }
        Command::Status => {
            let ctx = AppContext::from_settings(settings)?;
            println!("{}", serde_json::to_string_pretty(&ctx.status())?);
        }
    }
    Ok(())
}
