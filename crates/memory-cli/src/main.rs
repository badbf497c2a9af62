// ============================================================================
// memctl - command-line driver for session memory
// ============================================================================
// Usage:
//   memctl run script.json                   Execute memory commands (JSON array or JSONL)
//   memctl search "rust async" --format json Query a SearxNG instance
//   memctl embed "buy milk" --dimension 8    Print an embedding vector
//   memctl collections                       List collections in the local index
// ============================================================================

use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use memory_core::embeddings::{DefaultEmbedders, EmbedderProvider};
use memory_core::index::LocalIndex;
use memory_core::{MemoryCommand, MemoryConfig, SearchOptions, SearxngClient, SessionRegistry};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Session memory tool
#[derive(Parser)]
#[command(name = "memctl", version, about = "Drive short- and long-term session memory")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script of memory commands against one registry
    Run {
        /// JSON array of commands, or one command per line
        file: PathBuf,

        /// Stop at the first failed command
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Search the web through SearxNG
    Search {
        query: String,

        /// Search endpoint (default: $SEARXNG_URL)
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        categories: Option<String>,

        #[arg(long)]
        engines: Option<String>,

        #[arg(long)]
        language: Option<String>,

        #[arg(long, default_value = "1")]
        page: u32,

        /// day, month or year
        #[arg(long)]
        time_range: Option<String>,

        #[arg(long, default_value = "json")]
        format: String,

        /// 0 = off, 1 = moderate, 2 = strict
        #[arg(long)]
        safesearch: Option<u8>,
    },

    /// Embed text with the configured backend
    Embed {
        text: String,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        dimension: Option<usize>,
    },

    /// List collections in the embedded index
    Collections {
        /// Index file (default: $MEMORY_INDEX_PATH or ~/.memctl/index.redb)
        #[arg(long)]
        index_path: Option<PathBuf>,
    },
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn init_logging() -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new("warn").add_directive("memory_core=debug".parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let dotenv = dotenvy::dotenv();
    init_logging()?;
    if let Err(e) = dotenv {
        debug!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();
    let config = MemoryConfig::from_env();

    match cli.command {
        Commands::Run {
            file,
            stop_on_error,
        } => cmd_run(config, &file, stop_on_error).await,
        Commands::Search {
            query,
            url,
            categories,
            engines,
            language,
            page,
            time_range,
            format,
            safesearch,
        } => {
            let options = SearchOptions {
                categories,
                engines,
                language,
                page: Some(page),
                time_range,
                format: Some(format),
                safesearch,
                ..Default::default()
            };
            cmd_search(&config, url, &query, &options).await
        }
        Commands::Embed {
            text,
            model,
            dimension,
        } => cmd_embed(&config, &text, model, dimension).await,
        Commands::Collections { index_path } => cmd_collections(&config, index_path).await,
    }
}

fn parse_script(contents: &str) -> Result<Vec<MemoryCommand>> {
    if contents.trim_start().starts_with('[') {
        return serde_json::from_str(contents).context("Failed to parse command array");
    }

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid command on line {}", n + 1))
        })
        .collect()
}

async fn cmd_run(config: MemoryConfig, file: &Path, stop_on_error: bool) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let commands = parse_script(&contents)?;
    info!("Running {} commands from {}", commands.len(), file.display());

    let registry = SessionRegistry::from_config(config);
    let mut failures = 0;

    for command in commands {
        let response = registry.dispatch(command).await;
        println!("{}", serde_json::to_string(&response)?);

        if !response.success {
            failures += 1;
            if stop_on_error {
                break;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} command(s) failed", failures);
    }
    Ok(())
}

async fn cmd_search(
    config: &MemoryConfig,
    url: Option<String>,
    query: &str,
    options: &SearchOptions,
) -> Result<()> {
    let url = url
        .or_else(|| config.searxng_url.clone())
        .ok_or_else(|| anyhow!("No SearxNG endpoint: pass --url or set SEARXNG_URL"))?;

    let client = SearxngClient::new(&url);
    let body = client.search(query, options).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn cmd_embed(
    config: &MemoryConfig,
    text: &str,
    model: Option<String>,
    dimension: Option<usize>,
) -> Result<()> {
    let model = model.unwrap_or_else(|| config.default_embedding_model.clone());
    let dimension = dimension.unwrap_or(config.default_embedding_dim);

    let embedder = DefaultEmbedders::from_config(config)
        .build(&model, dimension)
        .await?;
    let vector = embedder.embed(text).await?;

    if vector.len() != dimension {
        eprintln!(
            "Warning: {} returned {} values, expected {}",
            model,
            vector.len(),
            dimension
        );
    }
    println!("{}", serde_json::to_string(&vector)?);
    Ok(())
}

async fn cmd_collections(config: &MemoryConfig, index_path: Option<PathBuf>) -> Result<()> {
    let path = match index_path.or_else(|| config.index_path.clone()) {
        Some(path) => path,
        None => LocalIndex::default_path()?,
    };
    let index = LocalIndex::open(&path)?;
    let collections = index.list_collections().await?;

    println!("Index: {}", index.path().display());
    if collections.is_empty() {
        println!("No collections found.");
        return Ok(());
    }

    println!(
        "{:<24}  {:>6}  {:<8}  {:>8}  {}",
        "COLLECTION", "DIMS", "DISTANCE", "POINTS", "CREATED AT"
    );
    println!("{}", "-".repeat(80));

    for col in &collections {
        println!(
            "{:<24}  {:>6}  {:<8}  {:>8}  {}",
            col.name,
            col.dimension,
            format!("{:?}", col.distance),
            col.points_count,
            format_timestamp(col.created_at)
        );
    }

    println!("\nTotal: {} collections", collections.len());
    Ok(())
}
