#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the game data ingester.

use std::sync::Arc;
use std::time::Duration;

use armory_catalog::CollectionKind;
use armory_cli_utils::IndicatifProgress;
use armory_database::{DocumentStore, DuckDbStore, MemoryStore, paths};
use armory_ingest::config::IngestConfig;
use armory_ingest::{
    Ingester, all_collections, build_coordinator, collection, enabled_collections, http_client,
};
use armory_ingest_models::{DEFAULT_WORKERS, GapPolicy, IngestOptions};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "armory_ingest", about = "Game data ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every enabled collection through one shared worker pool
    SyncAll {
        /// Comma-separated list of collection IDs to sync (overrides `ARMORY_COLLECTIONS` env var)
        #[arg(long)]
        collections: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Ingest a single collection
    Sync {
        /// Collection identifier (e.g., "items")
        collection: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// List all configured collections
    Collections,
    /// Show stored document counts and resume markers
    Status,
}

#[derive(Args)]
struct RunArgs {
    /// Number of concurrent workers
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,
    /// Start from each collection's first ID, ignoring stored progress
    #[arg(long)]
    force: bool,
    /// Also request IDs below the resume marker that have no stored document
    #[arg(long)]
    revisit_gaps: bool,
    /// Give up on a record after this many requests in a row are throttled (429)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_throttle_attempts: Option<u32>,
    /// Keep documents in memory instead of the `DuckDB` file (dry run)
    #[arg(long)]
    in_memory: bool,
    /// Log a JSON status snapshot every N seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    status_interval: Option<u64>,
}

impl RunArgs {
    fn options(&self) -> IngestOptions {
        IngestOptions {
            workers: self.workers,
            force: self.force,
            gap_policy: if self.revisit_gaps {
                GapPolicy::Revisit
            } else {
                GapPolicy::Skip
            },
            max_throttle_attempts: self.max_throttle_attempts,
            status_interval: self.status_interval.map(Duration::from_secs),
            ..IngestOptions::default()
        }
    }

    fn store(&self) -> Result<Arc<dyn DocumentStore>, Box<dyn std::error::Error>> {
        if self.in_memory {
            log::info!("Using in-memory store; nothing will be persisted");
            Ok(Arc::new(MemoryStore::default()))
        } else {
            Ok(Arc::new(DuckDbStore::open(&paths::db_path())?))
        }
    }
}

async fn ingest(
    collections: &[armory_catalog::CollectionDefinition],
    run: &RunArgs,
    multi: &armory_cli_utils::MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    if collections.is_empty() {
        log::warn!("Nothing to ingest");
        return Ok(());
    }

    let config = IngestConfig::from_env()?;
    let store = run.store()?;
    let http = http_client()?;
    let coordinator = build_coordinator(&config, &http).await?;

    let ingester = Ingester::new(http, coordinator, store, config, run.options())
        .with_progress(IndicatifProgress::tasks_bar(multi, "Ingesting"));
    let summary = ingester.run(collections).await;

    if summary.failed > 0 {
        log::warn!(
            "{} task(s) failed; rerun to retry them (persisted records are kept)",
            summary.failed
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = armory_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Collections => {
            println!("{:<16} {:<24} {:<12} RANGE", "ID", "NAME", "KEY");
            println!("{}", "-".repeat(70));
            for c in &all_collections() {
                let range = match c.kind {
                    CollectionKind::Data { min_id, max_id } => format!("{min_id}..={max_id}"),
                    CollectionKind::Collection => "listing".to_string(),
                };
                println!("{:<16} {:<24} {:<12} {range}", c.id, c.name, c.natural_key);
            }
        }
        Commands::Status => {
            let store = DuckDbStore::open(&paths::db_path())?;
            println!(
                "{:<16} {:>10} {:>10}  LAST SYNCED",
                "ID", "DOCUMENTS", "MAX KEY"
            );
            println!("{}", "-".repeat(70));
            for c in &all_collections() {
                let stats = store.stats(&c.id).await?;
                println!(
                    "{:<16} {:>10} {:>10}  {}",
                    stats.collection,
                    stats.count,
                    stats
                        .max_key
                        .map_or_else(|| "-".to_string(), |k| k.to_string()),
                    stats.last_synced_at.as_deref().unwrap_or("never"),
                );
            }
        }
        Commands::Sync { collection: id, run } => {
            let definition = collection(&id)?;
            ingest(&[definition], &run, &multi).await?;
        }
        Commands::SyncAll { collections, run } => {
            let collections = enabled_collections(collections);
            ingest(&collections, &run, &multi).await?;
        }
    }

    Ok(())
}
