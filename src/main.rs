//! # Markdown Keeper CLI
//!
//! Command-line entry point (`mdk`). Subcommands cover the full lifecycle:
//! database initialization, one-shot and continuous ingestion, daemon
//! control, queries, index-file generation, link checking, and the RPC
//! server.

mod chunk;
mod config;
mod daemon;
mod db;
mod embedding;
mod get;
mod indexer;
mod links;
mod models;
mod parser;
mod queue;
mod schema;
mod search;
mod server;
mod store;
mod watcher;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::Embedder;

#[derive(Parser)]
#[command(
    name = "mdk",
    about = "Markdown Keeper — a local-first Markdown indexing service with semantic search",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "markdownkeeper.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database
    Init,

    /// One-shot reconcile: snapshot the roots, diff against the index, drain
    Scan,

    /// Run the watch loop in the foreground
    Watch {
        /// Snapshot polling interval when no live notifier is available
        #[arg(long, default_value_t = 2.0)]
        interval_s: f64,

        /// Stop after this many ticks (unbounded when omitted)
        #[arg(long)]
        iterations: Option<u64>,
    },

    /// Semantic search over the index
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Retrieve a document by id
    Get {
        /// Document id
        id: i64,

        /// Include a body excerpt
        #[arg(long)]
        content: bool,

        /// Cap the excerpt to this many whitespace tokens
        #[arg(long)]
        max_tokens: Option<usize>,
    },

    /// List documents carrying a concept
    Concept {
        /// Concept name (case-insensitive)
        name: String,

        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Generate browsable Markdown index files
    Index {
        /// Output directory for the index files
        #[arg(long, default_value = "_index")]
        out_dir: PathBuf,
    },

    /// Validate stored links
    Links,

    /// Start the RPC server in the foreground
    Serve,

    /// Start the watch loop as a background daemon
    Start,

    /// Stop the background daemon
    Stop,

    /// Report daemon status
    Status,

    /// Restart the background daemon
    Restart,
}

async fn open_pool(cfg: &Config) -> Result<SqlitePool> {
    let pool = db::connect(&cfg.storage.database_path).await?;
    schema::initialize_database(&pool).await?;
    Ok(pool)
}

fn pid_file(cfg: &Config) -> PathBuf {
    cfg.storage
        .database_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("watch.pid")
}

fn daemon_command(config_path: &Path) -> Result<Vec<String>> {
    let exe = std::env::current_exe()?;
    Ok(vec![
        exe.display().to_string(),
        "--config".to_string(),
        config_path.display().to_string(),
        "watch".to_string(),
    ])
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = open_pool(&cfg).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Scan => {
            let pool = open_pool(&cfg).await?;
            let embedder = Embedder::new();
            let (_, result) = watcher::watch_once(
                &pool,
                &embedder,
                &cfg.watch.roots,
                &cfg.watch.extensions,
                None,
            )
            .await?;
            let failed = queue::count_events(&pool, "failed").await?;
            pool.close().await;
            println!("scan");
            println!("  created:  {}", result.created);
            println!("  modified: {}", result.modified);
            println!("  deleted:  {}", result.deleted);
            if failed > 0 {
                println!("  failed events: {}", failed);
            }
            println!("ok");
        }
        Commands::Watch {
            interval_s,
            iterations,
        } => {
            let pool = open_pool(&cfg).await?;
            let embedder = Embedder::new();
            let result =
                watcher::watch_loop(&pool, &embedder, &cfg.watch, interval_s, iterations).await?;
            pool.close().await;
            println!(
                "watch finished: created={} modified={} deleted={}",
                result.created, result.modified, result.deleted
            );
        }
        Commands::Search { query, limit } => {
            let pool = open_pool(&cfg).await?;
            let embedder = Embedder::new();
            let results =
                search::semantic_search_documents(&pool, &embedder, &query, limit).await?;
            pool.close().await;

            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, result) in results.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, result.score, result.title);
                println!("    path: {}", result.path);
                if let Some(ref category) = result.category {
                    println!("    category: {}", category);
                }
                println!("    id: {}", result.id);
                println!();
            }
        }
        Commands::Get {
            id,
            content,
            max_tokens,
        } => {
            let pool = open_pool(&cfg).await?;
            let record = get::get_document(&pool, id, content, max_tokens).await?;
            pool.close().await;

            let record = match record {
                Some(record) => record,
                None => {
                    eprintln!("Error: document {} not found", id);
                    std::process::exit(1);
                }
            };

            println!("--- Document ---");
            println!("id:          {}", record.id);
            println!("title:       {}", record.title);
            println!("path:        {}", record.path);
            if let Some(ref category) = record.category {
                println!("category:    {}", category);
            }
            println!("modified_at: {}", record.modified_at);
            if !record.tags.is_empty() {
                println!("tags:        {}", record.tags.join(", "));
            }
            if !record.concepts.is_empty() {
                println!("concepts:    {}", record.concepts.join(", "));
            }
            if let Some(ref body) = record.content {
                println!();
                println!("--- Content ---");
                println!("{}", body);
            }
        }
        Commands::Concept { name, limit } => {
            let pool = open_pool(&cfg).await?;
            let documents = get::find_by_concept(&pool, &name, limit).await?;
            pool.close().await;

            if documents.is_empty() {
                println!("No documents for concept '{}'.", name);
                return Ok(());
            }
            for doc in &documents {
                println!("{}  {}  ({})", doc.id, doc.title, doc.path);
            }
        }
        Commands::Index { out_dir } => {
            let pool = open_pool(&cfg).await?;
            let outs = indexer::generate_all_indexes(&pool, &out_dir).await?;
            pool.close().await;
            for path in outs {
                println!("wrote {}", path.display());
            }
        }
        Commands::Links => {
            let pool = open_pool(&cfg).await?;
            let results = links::validate_links(&pool).await?;
            pool.close().await;

            if results.is_empty() {
                println!("No links to check.");
                return Ok(());
            }
            for link in &results {
                println!("[{}] {} ({})", link.status, link.target, link.kind);
            }
            let broken = results.iter().filter(|l| l.status == "broken").count();
            println!("{} links checked, {} broken", results.len(), broken);
        }
        Commands::Serve => {
            let pool = open_pool(&cfg).await?;
            let embedder = Arc::new(Embedder::new());
            server::run_server(&cfg, pool, embedder).await?;
        }
        Commands::Start => {
            let cmd = daemon_command(&cli.config)?;
            let pid = daemon::start_background(&cmd, &pid_file(&cfg))?;
            println!("watcher running (pid {})", pid);
        }
        Commands::Stop => {
            if daemon::stop_background(&pid_file(&cfg), 5.0)? {
                println!("watcher stopped");
            } else {
                println!("watcher not running");
            }
        }
        Commands::Status => {
            let (running, pid) = daemon::status_background(&pid_file(&cfg));
            match (running, pid) {
                (true, Some(pid)) => println!("watcher running (pid {})", pid),
                (false, Some(pid)) => println!("watcher not running (stale pid {})", pid),
                _ => println!("watcher not running"),
            }
        }
        Commands::Restart => {
            let cmd = daemon_command(&cli.config)?;
            let pid = daemon::restart_background(&cmd, &pid_file(&cfg), 5.0)?;
            println!("watcher restarted (pid {})", pid);
        }
    }

    Ok(())
}
