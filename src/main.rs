//! accident-stats - PRF federal highway accident aggregator
//!
//! A CLI tool that turns a PRF accident CSV export into per-state
//! statistics for the accident dashboard, and optionally loads them into
//! the statistics store.
//!
//! Exit codes:
//!   0 - Success (including a load skipped because the store is unavailable)
//!   1 - Runtime error (missing input, malformed CSV or document, bad config)
//!   2 - Some regions failed to load into the store

mod analysis;
mod cli;
mod config;
mod ingest;
mod models;
mod report;
mod store;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use ingest::{IngestConfig, RecordReader};
use models::{Dimension, WeekdayNames};
use report::{AccidentDocument, SummaryMetadata, SummaryOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use store::{HttpStore, LoadOutcome, RegionStore};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Records between spinner updates while streaming the CSV.
const PROGRESS_INTERVAL: u64 = 10_000;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // The config decides the log level, so it is read before logging starts
    let (config, config_warning) = match load_config(&args).and_then(|(mut config, warning)| {
        config.merge_with_args(&args);
        config.validate()?;
        Ok((config, warning))
    }) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(config.log_level(args.quiet))?;

    info!("accident-stats v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match args.config {
        Some(ref path) => info!("Loaded config from: {}", path.display()),
        None => debug!("Config: {:?}", config),
    }
    if let Some(warning) = config_warning {
        warn!("Failed to load config, using defaults: {}", warning);
    }

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .accident-stats.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set the input format, weekday labels and store connection.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

/// Run the complete workflow. Returns the process exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    if let Some(ref uf) = args.show_region {
        return show_region(&config, uf).await;
    }
    if args.list_regions {
        return list_regions(&config).await;
    }

    // Step 1: Build or read the document
    let document = match args.from_json {
        Some(ref path) => {
            println!("📂 Reading document: {}", path.display());
            report::read_document(path)?
        }
        None => {
            let input = args
                .input
                .as_deref()
                .context("--input is required unless --from-json or --show-region is given")?;
            build_document(input, &config, args.quiet)?
        }
    };

    let duration = start_time.elapsed().as_secs_f64();

    if args.dry_run {
        print_totals(&document, duration);
        println!("\n✅ Dry run complete. Nothing was written.");
        return Ok(0);
    }

    // Step 2: Write the outputs
    if args.from_json.is_none() {
        let output = PathBuf::from(&config.general.output);
        report::write_document(&document, &output)?;
        println!("💾 Document saved to: {}", output.display());
    }

    if let Some(ref report_path) = args.report {
        let metadata = SummaryMetadata {
            source: args.source_name(),
            generated_at: Utc::now(),
            duration_seconds: Some(duration),
        };
        report::write_summary(
            &document,
            &metadata,
            &SummaryOptions::from(&config.report),
            report_path,
        )?;
        println!("📝 Summary saved to: {}", report_path.display());
    }

    print_totals(&document, duration);

    // Step 3: Load into the store
    if args.load {
        println!("\n📤 Loading regions into the store...");
        match store::load_with_config(&config.store, &document, !args.quiet).await? {
            LoadOutcome::Skipped { reason } => {
                println!("   ⚠️  Load skipped: {}", reason);
            }
            LoadOutcome::Loaded(results) => {
                println!(
                    "   Created: {} | Updated: {} | Failed: {}",
                    results.num_created, results.num_updated, results.num_failed
                );
                if results.num_failed > 0 {
                    eprintln!(
                        "\n⛔ {} of {} regions failed to load (exit code 2).",
                        results.num_failed, results.num_total
                    );
                    return Ok(2);
                }
            }
        }
    }

    println!("\n✅ Done in {:.1}s", start_time.elapsed().as_secs_f64());
    Ok(0)
}

/// Read the CSV and aggregate it into a document.
fn build_document(input: &Path, config: &Config, quiet: bool) -> Result<AccidentDocument> {
    let ingest_config = IngestConfig::from(&config.input);
    let weekdays = config.aggregation.weekday_names()?;
    let threads = config.aggregation.threads;

    println!("📥 Reading accidents: {}", input.display());
    info!(
        "Encoding {:?}, delimiter {:?}, {} thread(s)",
        ingest_config.encoding, config.input.delimiter, threads
    );

    let spinner = if quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };

    let result = if threads > 1 {
        if let Some(ref pb) = spinner {
            pb.set_message("Reading records...");
        }
        let records = ingest::read_all(input, &ingest_config)?;

        if let Some(ref pb) = spinner {
            pb.set_message(format!("Aggregating {} records...", records.len()));
        }
        analysis::aggregate_parallel(&records, &weekdays, threads)?
    } else {
        stream_aggregate(input, &ingest_config, weekdays, spinner.as_ref())?
    };

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    info!(
        "Aggregated {} records into {} regions",
        result.global.accidents,
        result.regions.len()
    );

    Ok(AccidentDocument::from_result(result))
}

/// Fold records straight from the reader without buffering the file.
fn stream_aggregate(
    input: &Path,
    ingest_config: &IngestConfig,
    weekdays: WeekdayNames,
    spinner: Option<&ProgressBar>,
) -> Result<analysis::AggregationResult> {
    let mut aggregator = analysis::Aggregator::new(weekdays);

    for record in RecordReader::open(input, ingest_config)? {
        aggregator.push(&record?);

        let seen = aggregator.records_seen();
        if seen % PROGRESS_INTERVAL == 0 {
            if let Some(pb) = spinner {
                pb.set_message(format!("{} records", seen));
            }
        }
    }

    Ok(aggregator.finish())
}

/// Print national totals and the five busiest regions.
fn print_totals(document: &AccidentDocument, duration: f64) {
    let totals = &document.totals;

    println!("\n📊 Accident Summary:");
    println!("   Regions: {}", document.region_count());
    println!("   Accidents: {}", totals.accidents);
    println!(
        "   - Deaths: {} | Severe: {} | Minor: {} | Unharmed: {}",
        totals.deaths, totals.severe_injuries, totals.minor_injuries, totals.unharmed
    );

    let ranked = analysis::rank_regions(&document.ufs, 5);
    if !ranked.is_empty() {
        println!("   Busiest regions:");
        for (uf, region) in ranked {
            println!(
                "     {} - {} accidents, {:.1} deaths per 100",
                uf,
                region.accidents,
                region.fatality_rate()
            );
        }
    }
    println!("   Duration: {:.1}s", duration);
}

/// Handle --show-region: print one stored row.
async fn show_region(config: &Config, uf: &str) -> Result<i32> {
    let uf = uf.trim().to_uppercase();

    let Some(store) = HttpStore::from_config(&config.store)? else {
        bail!("No store URL configured; set --store-url or [store] url");
    };

    let Some(row) = store.fetch(&uf).await? else {
        eprintln!("No stored statistics for region {}", uf);
        return Ok(1);
    };
    let details = row.details()?;

    println!("📍 Region {} (updated {})", row.uf, row.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("   Accidents: {}", row.total_accidents);
    println!(
        "   - Deaths: {} | Severe: {} | Minor: {} | Unharmed: {}",
        row.total_deaths, row.total_severe_injuries, row.total_minor_injuries, row.total_unharmed
    );

    let top = config.report.top_causes;
    println!("   {} (top {}):", Dimension::Cause, top);
    for cause in details.causas.iter().take(top) {
        println!("     {} - {}", cause.causa, cause.count);
    }
    println!("   {}:", Dimension::Weekday);
    for day in &details.dias {
        println!("     {} - {}", day.dia, day.count);
    }

    Ok(0)
}

/// Handle --list-regions: print every stored row, busiest first.
async fn list_regions(config: &Config) -> Result<i32> {
    let Some(store) = HttpStore::from_config(&config.store)? else {
        bail!("No store URL configured; set --store-url or [store] url");
    };

    let rows = store.fetch_all().await?;
    if rows.is_empty() {
        println!("No regions stored in index {}", config.store.index);
        return Ok(0);
    }

    println!("📍 {} stored regions:", rows.len());
    for (position, (uf, totals)) in store::rank_rows(&rows, rows.len()).iter().enumerate() {
        println!(
            "   {:>2}. {} - {} accidents, {} deaths ({:.1} per 100)",
            position + 1,
            uf,
            totals.accidents,
            totals.deaths,
            totals.fatality_rate()
        );
    }

    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so a default file that fails to parse
/// is returned as a warning for the caller to log.
fn load_config(args: &Args) -> Result<(Config, Option<String>)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Ok((Config::load(config_path)?, None));
    }

    // Try default location
    match Config::load_default() {
        Ok(config) => Ok((config.unwrap_or_default(), None)),
        Err(e) => Ok((Config::default(), Some(format!("{:#}", e)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_empty_csv_gives_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datatran_empty.csv");
        std::fs::write(&path, b"").unwrap();

        let result =
            stream_aggregate(&path, &IngestConfig::default(), WeekdayNames::default(), None)
                .unwrap();
        let document = AccidentDocument::from_result(result);
        let value: Value = serde_json::from_str(&document.to_json().unwrap()).unwrap();

        assert_eq!(value["total_acidentes"], json!(0));
        assert_eq!(value["total_mortos"], json!(0));
        assert_eq!(value["ufs"], json!({}));
        assert_eq!(value["causas_por_uf"], json!({}));
    }

    #[test]
    fn test_fixture_sequential_matches_parallel() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/datatran_sample.csv");
        let ingest_config = IngestConfig::default();

        let sequential =
            stream_aggregate(&path, &ingest_config, WeekdayNames::default(), None).unwrap();
        let records = ingest::read_all(&path, &ingest_config).unwrap();
        let parallel =
            analysis::aggregate_parallel(&records, &WeekdayNames::default(), 3).unwrap();

        let sequential_json = AccidentDocument::from_result(sequential).to_json().unwrap();
        let parallel_json = AccidentDocument::from_result(parallel).to_json().unwrap();
        assert_eq!(sequential_json, parallel_json);

        let value: Value = serde_json::from_str(&sequential_json).unwrap();
        let sp_days = value["dias_semana_por_uf"]["SP"].as_array().unwrap();
        assert_eq!(sp_days.len(), 7);
        assert!(sp_days.contains(&json!({"dia": "sábado", "count": 1})));
    }
}
