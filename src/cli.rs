//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Values left unset fall back to the
//! configuration file.

use crate::ingest::Encoding;
use crate::models::WeekdayPreset;
use clap::Parser;
use std::path::PathBuf;

/// accident-stats - PRF federal highway accident aggregator
///
/// Reads a PRF accident CSV export and writes per-state statistics as a
/// JSON document for the dashboard, optionally with a Markdown summary and
/// a push of every state into the statistics store.
///
/// Examples:
///   accident-stats --input datatran2024.csv
///   accident-stats --input datatran2024.csv --report summary.md --threads 8
///   accident-stats --input datatran2024.csv --load --store-url http://localhost:9200
///   accident-stats --from-json public/accidents-data.json --load
///   accident-stats --show-region SP
///   accident-stats --list-regions
///   accident-stats --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// PRF accident CSV to aggregate
    ///
    /// Not required with --from-json, --show-region, --list-regions or --init-config.
    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present_any = ["from_json", "show_region", "list_regions", "init_config"]
    )]
    pub input: Option<PathBuf>,

    /// Output path for the JSON document
    ///
    /// Default: from config or public/accidents-data.json
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Also write a Markdown summary to this path
    #[arg(short, long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Use an existing JSON document instead of aggregating a CSV
    #[arg(long, value_name = "FILE", conflicts_with = "input")]
    pub from_json: Option<PathBuf>,

    /// Load every region into the statistics store
    #[arg(long)]
    pub load: bool,

    /// Statistics store URL
    #[arg(long, value_name = "URL", env = "ACCIDENT_STORE_URL")]
    pub store_url: Option<String>,

    /// Index holding the region rows
    #[arg(long, value_name = "NAME")]
    pub store_index: Option<String>,

    /// Print the stored row for one region and exit
    #[arg(long, value_name = "UF", conflicts_with_all = ["input", "from_json"])]
    pub show_region: Option<String>,

    /// Print every stored region, ranked by accident count, and exit
    #[arg(long, conflicts_with_all = ["input", "from_json", "show_region"])]
    pub list_regions: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .accident-stats.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Text encoding of the input file
    #[arg(long, value_name = "ENCODING")]
    pub encoding: Option<Encoding>,

    /// Field delimiter of the input file
    #[arg(long, value_name = "CHAR")]
    pub delimiter: Option<char>,

    /// Weekday label set used to order the weekday table
    #[arg(long, value_name = "LANG")]
    pub weekdays: Option<WeekdayPreset>,

    /// Aggregate on this many threads (1 = sequential, streaming)
    #[arg(long, value_name = "NUM")]
    pub threads: Option<usize>,

    /// Number of causes listed per region in the summary
    #[arg(long, value_name = "COUNT")]
    pub top: Option<usize>,

    /// Dry run: aggregate and print the totals without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .accident-stats.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.threads == Some(0) {
            return Err("Threads must be at least 1".to_string());
        }

        if self.top == Some(0) {
            return Err("Top causes must be at least 1".to_string());
        }

        if let Some(delimiter) = self.delimiter {
            if !delimiter.is_ascii() || matches!(delimiter, '"' | '\n' | '\r') {
                return Err(format!("Unsupported delimiter: {:?}", delimiter));
            }
        }

        if let Some(ref url) = self.store_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Store URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref uf) = self.show_region {
            if uf.trim().is_empty() {
                return Err("Region code cannot be empty".to_string());
            }
        }

        if self.dry_run && self.load {
            return Err("Cannot use both --dry-run and --load".to_string());
        }

        for path in [&self.input, &self.from_json].into_iter().flatten() {
            if !path.exists() {
                return Err(format!("Input file does not exist: {}", path.display()));
            }
            if !path.is_file() {
                return Err(format!("Input path is not a file: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Name of the data source, for logs and the summary.
    pub fn source_name(&self) -> String {
        self.input
            .as_ref()
            .or(self.from_json.as_ref())
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            input: None,
            output: None,
            report: None,
            from_json: None,
            load: false,
            store_url: None,
            store_index: None,
            show_region: None,
            list_regions: false,
            config: None,
            encoding: None,
            delimiter: None,
            weekdays: None,
            threads: None,
            top: None,
            dry_run: false,
            init_config: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "accident-stats",
            "--input",
            "datatran.csv",
            "--encoding",
            "utf8",
            "--weekdays",
            "english",
            "--delimiter",
            ",",
            "--threads",
            "4",
            "--load",
        ])
        .unwrap();

        assert_eq!(args.input, Some(PathBuf::from("datatran.csv")));
        assert_eq!(args.encoding, Some(Encoding::Utf8));
        assert_eq!(args.weekdays, Some(WeekdayPreset::English));
        assert_eq!(args.delimiter, Some(','));
        assert_eq!(args.threads, Some(4));
        assert!(args.load);
    }

    #[test]
    fn test_input_required() {
        assert!(Args::try_parse_from(["accident-stats"]).is_err());
        assert!(Args::try_parse_from(["accident-stats", "--init-config"]).is_ok());
        assert!(Args::try_parse_from(["accident-stats", "--show-region", "SP"]).is_ok());
        assert!(Args::try_parse_from(["accident-stats", "--list-regions"]).is_ok());
        assert!(Args::try_parse_from([
            "accident-stats",
            "--list-regions",
            "--show-region",
            "SP"
        ])
        .is_err());
    }

    #[test]
    fn test_input_conflicts_with_from_json() {
        assert!(Args::try_parse_from([
            "accident-stats",
            "--input",
            "a.csv",
            "--from-json",
            "b.json"
        ])
        .is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.dry_run = true;
        args.load = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_numeric_limits() {
        let mut args = make_args();
        args.threads = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.top = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_delimiter_and_url() {
        let mut args = make_args();
        args.delimiter = Some('"');
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.delimiter = Some('ç');
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.store_url = Some("localhost:9200".to_string());
        assert!(args.validate().is_err());

        args.store_url = Some("http://localhost:9200".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_input() {
        let mut args = make_args();
        args.input = Some(PathBuf::from("/nonexistent/datatran.csv"));
        assert!(args.validate().is_err());

        let dir = tempfile::tempdir().unwrap();
        args.input = Some(dir.path().to_path_buf());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.init_config = true;
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_ok());
    }
}
