#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line driver for the GeoNames pipeline.
//!
//! `download` fetches and extracts the per-country archives, `harvest`
//! turns the extracted gazetteers into stored objects, `index` builds the
//! Tantivy index, and `run` chains all three. `search` queries a built
//! index.
//!
//! Uses `indicatif-log-bridge` (via [`geonames_cli_utils::init_logger`])
//! so log lines and progress bars share the terminal.

mod config;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use geonames_cli_utils::{IndicatifProgress, MultiProgress};
use geonames_harvest::storage::FsStorage;
use geonames_index::access::FileAccess;
use geonames_index::sink::TantivySink;
use geonames_index::{GeonamesIndex, index_storage};
use geonames_models::GeonamesConfig;

use config::Overrides;

/// File under the storage root holding record access roles.
const ACCESS_FILE: &str = "access.json";

#[derive(Parser)]
#[command(name = "geonames", about = "GeoNames download, harvest and index toolchain")]
struct Cli {
    /// TOML config file; every setting has a default
    #[arg(long, global = true, env = "GEONAMES_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and extract `<ISO>.zip` for every country in the reference table
    Download,
    /// Build stored country objects from the extracted gazetteers
    Harvest,
    /// Index every stored object into a fresh Tantivy index
    Index,
    /// Download, harvest and index in one go
    Run,
    /// Search indexed titles
    Search {
        /// Tantivy query string (e.g. `sydney`, `"new york"`)
        query: String,
        /// Maximum number of hits to print
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = geonames_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);

    let start = Instant::now();
    match cli.command {
        Commands::Download => download(&config, &multi).await?,
        Commands::Harvest => harvest(&config, &multi)?,
        Commands::Index => index(&config, &multi)?,
        Commands::Run => {
            download(&config, &multi).await?;
            harvest(&config, &multi)?;
            index(&config, &multi)?;
        }
        Commands::Search { query, limit } => {
            search(&config, &query, limit)?;
            return Ok(());
        }
    }

    log::info!("Done in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

async fn download(
    config: &GeonamesConfig,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let progress = IndicatifProgress::countries_bar(multi, "Downloading");
    let stats = geonames_download::fetch_all(&config.download, &progress).await?;

    log::info!(
        "{} countries: {} downloaded, {} already present, {} entries extracted",
        stats.countries,
        stats.downloaded,
        stats.skipped,
        stats.extracted_entries
    );
    if stats.failed_downloads > 0 || stats.invalid_archives > 0 {
        log::warn!(
            "{} downloads failed, {} archives were not valid zip files",
            stats.failed_downloads,
            stats.invalid_archives
        );
    }
    Ok(())
}

fn harvest(
    config: &GeonamesConfig,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = FsStorage::open(&config.harvest.storage_dir)?;
    let progress = IndicatifProgress::countries_bar(multi, "Harvesting");
    let ids = geonames_harvest::harvest(&config.harvest, &storage, &progress)?;
    log::info!("{} objects under {}", ids.len(), storage.root().display());
    Ok(())
}

fn index(
    config: &GeonamesConfig,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = FsStorage::open(&config.harvest.storage_dir)?;
    let mut access = FileAccess::open(storage.root().join(ACCESS_FILE))?;
    let mut sink = TantivySink::create(&config.index.index_dir, config.index.writer_heap_bytes)?;

    let progress = IndicatifProgress::objects_bar(multi, "Indexing");
    let run = index_storage(&storage, &config.index, &mut access, &mut sink, &progress)?;

    // Commit what succeeded before reporting failed objects.
    let written = sink.commit()?;
    log::info!(
        "Wrote {written} documents to {}",
        config.index.index_dir.display()
    );

    run.into_result()?;
    Ok(())
}

fn search(
    config: &GeonamesConfig,
    query: &str,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let index = GeonamesIndex::open(&config.index.index_dir)?;
    let hits = index.search(query, limit)?;

    if hits.is_empty() {
        println!("No matches for {query:?}");
        return Ok(());
    }

    println!("{:<34} {:<10} {:>7}  TITLE", "ID", "TYPE", "SCORE");
    println!("{}", "-".repeat(70));
    for hit in &hits {
        println!(
            "{:<34} {:<10} {:>7.3}  {}",
            hit.id, hit.record_type, hit.score, hit.title
        );
    }
    Ok(())
}
