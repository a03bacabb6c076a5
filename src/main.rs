//! docsync - keep a file index and vector store in sync with watched directories
//!
//! Entry point for the docsync daemon.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use docsync::observability::{init_metrics, init_tracing};
use docsync::{Config, SyncEngine};

/// docsync - keep a file index and vector store in sync with watched directories
#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory for the `SQLite` index and snapshot cache
    #[arg(short, long, env = "DOCSYNC_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Directories to keep in sync
    #[arg(short, long, env = "DOCSYNC_WATCH_DIRS", value_delimiter = ',')]
    watch: Vec<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DOCSYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "DOCSYNC_LOG_JSON")]
    log_json: bool,

    /// Quiet period before a burst of changes is processed (milliseconds)
    #[arg(long, env = "DOCSYNC_DEBOUNCE_MS", default_value = "200")]
    debounce_ms: u64,

    /// Minimum time between two persisted snapshots of a root (seconds)
    #[arg(long, env = "DOCSYNC_SNAPSHOT_INTERVAL_SECS", default_value = "900")]
    snapshot_interval_secs: u64,

    /// Snapshot files kept per root
    #[arg(long, env = "DOCSYNC_MAX_SNAPSHOTS", default_value = "24")]
    max_snapshots: usize,

    /// Extra ignore patterns (gitignore syntax)
    #[arg(long, env = "DOCSYNC_IGNORE", value_delimiter = ',')]
    ignore: Vec<String>,

    /// Fragment size in characters for the text parser
    #[arg(long, env = "DOCSYNC_CHUNK_SIZE", default_value = "1000")]
    chunk_size: usize,

    /// Overlap between fragments in characters
    #[arg(long, env = "DOCSYNC_CHUNK_OVERLAP", default_value = "200")]
    chunk_overlap: usize,

    /// Clear the index, snapshot cache and vector store before loading
    #[arg(long)]
    reset: bool,

    /// Print index statistics and exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!("docsync v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config {
        data_dir: cli.data_dir,
        log_level: cli.log_level,
        watch_dirs: cli.watch,
        debounce: Duration::from_millis(cli.debounce_ms),
        snapshot_interval: Duration::from_secs(cli.snapshot_interval_secs),
        max_snapshots: cli.max_snapshots,
        ignore_patterns: cli.ignore,
        chunk_size: cli.chunk_size,
        chunk_overlap: cli.chunk_overlap,
    };

    tracing::debug!(?config, "Configuration loaded");

    init_metrics();

    let engine = SyncEngine::open_default(config.clone()).context("failed to open stores")?;

    if cli.stats {
        let stats = engine.index().stats()?;
        let catalog = engine.snapshots().catalog()?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        for root in catalog {
            println!("{}: {} snapshot(s)", root.root.display(), root.snapshots.len());
        }
        return Ok(());
    }

    if cli.reset {
        engine.reset().await.context("reset failed")?;
    }

    if config.watch_dirs.is_empty() {
        tracing::warn!("No directories to watch, exiting");
        return Ok(());
    }

    for dir in &config.watch_dirs {
        engine
            .load(dir)
            .await
            .with_context(|| format!("failed to load {}", dir.display()))?;
    }

    let report = engine.reconcile().await?;
    if !report.is_consistent() {
        tracing::warn!(
            orphaned = report.orphaned_vectors.len(),
            missing = report.missing_documents.len(),
            "Stores were inconsistent at startup"
        );
    }

    tracing::info!(roots = config.watch_dirs.len(), "Watching for changes, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    engine.release_all().await;
    Ok(())
}
