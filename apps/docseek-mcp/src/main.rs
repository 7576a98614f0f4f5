//! docseek - hybrid retrieval over a mixed-source corpus.
//!
//! ```bash
//! docseek serve                    # MCP server on stdio
//! docseek query "token rotation" -n 5 --source-type jira
//! docseek index                    # embed the corpus into LanceDB
//! ```
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docseek_core::config::Config;
use docseek_core::corpus::MemoryCorpus;
use docseek_core::traits::CorpusProvider;
use docseek_hybrid::SearchRequest;
use docseek_mcp::{bootstrap, mcp, output};
use docseek_vector::LanceVectorStore;

#[derive(Parser)]
#[command(name = "docseek", version, about)]
struct Cli {
    /// Directory containing config.toml (default: current directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Enable info-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run as an MCP server on stdio
    Serve,
    /// Run one query and print the results
    Query {
        query: String,
        /// Maximum number of results
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Restrict to a source type (repeatable)
        #[arg(short = 's', long = "source-type")]
        source_types: Vec<String>,
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Embed the corpus file into the LanceDB table
    Index {
        #[arg(long, default_value = "32")]
        batch_size: usize,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout carries MCP frames
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(dir: Option<PathBuf>) -> Result<Config> {
    let env_name = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let dir = dir.unwrap_or_else(|| PathBuf::from("."));
    Config::load_from(&dir, &env_name).with_context(|| format!("Failed to load config from {}", dir.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(cli.config_dir)?;

    match cli.command {
        Command::Serve => {
            let settings = config.settings()?;
            let embedder = bootstrap::load_embedder(&config, &settings)?;
            let app = bootstrap::build(&config, embedder).await?;
            #[cfg(unix)]
            bootstrap::spawn_reload_on_hangup(app.corpus.clone(), app.corpus_path.clone())?;
            mcp::run_mcp_server(app.engine).await
        }
        Command::Query { query, limit, source_types, json } => {
            let settings = config.settings()?;
            let embedder = bootstrap::load_embedder(&config, &settings)?;
            let app = bootstrap::build(&config, embedder).await?;
            let mut req = SearchRequest::new(query.clone()).source_types(source_types);
            req.limit = limit;
            let response = app.engine.search(req).await?;
            let rendered = if json { output::format_json(&response)? } else { output::format_human(&query, &response) };
            println!("{rendered}");
            Ok(())
        }
        Command::Index { batch_size } => {
            let settings = config.settings()?;
            let embedder = bootstrap::load_embedder(&config, &settings)?;
            let corpus = MemoryCorpus::load_jsonl(&bootstrap::corpus_path(&config, &settings))?;
            let lance_dir = config.resolve_path(&settings.data.lancedb_dir);
            std::fs::create_dir_all(&lance_dir).with_context(|| format!("Failed to create {}", lance_dir.display()))?;
            let store = LanceVectorStore::open(&lance_dir, &settings.data.table, embedder.dim()).await?;
            let written = store.upsert(&corpus.entries(), embedder.as_ref(), batch_size).await?;
            println!("Indexed {written} entries into {} ({} rows)", lance_dir.display(), store.count().await?);
            Ok(())
        }
    }
}
