//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.accident-stats.toml` files.

use crate::ingest::Encoding;
use crate::models::{WeekdayNames, WeekdayPreset};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".accident-stats.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Input file format.
    #[serde(default)]
    pub input: InputConfig,

    /// Aggregation settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Statistics store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Summary settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "public/accidents-data.json".to_string()
}

/// Input file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Text encoding of the CSV.
    #[serde(default)]
    pub encoding: Encoding,

    /// Field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            delimiter: default_delimiter(),
        }
    }
}

fn default_delimiter() -> char {
    ';'
}

impl InputConfig {
    /// The delimiter as the single byte the CSV reader expects.
    ///
    /// Non-ASCII delimiters are rejected by [`Config::validate`]; this falls
    /// back to `;` if one slips through.
    pub fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .unwrap_or(b';')
    }
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Built-in weekday label set.
    #[serde(default)]
    pub weekdays: WeekdayPreset,

    /// Custom weekday labels, Monday first. Overrides `weekdays`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday_names: Option<Vec<String>>,

    /// Worker threads; 1 streams the file through a single aggregator.
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            weekdays: WeekdayPreset::default(),
            weekday_names: None,
            threads: default_threads(),
        }
    }
}

fn default_threads() -> usize {
    1
}

impl AggregationConfig {
    /// The weekday label set in effect.
    pub fn weekday_names(&self) -> Result<WeekdayNames> {
        match self.weekday_names {
            Some(ref names) => WeekdayNames::custom(names)
                .map_err(|e| anyhow!("Invalid aggregation.weekday_names: {}", e)),
            None => Ok(WeekdayNames::from_preset(self.weekdays)),
        }
    }
}

/// Statistics store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the store. Loading is skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Index holding one row per region.
    #[serde(default = "default_index")]
    pub index: String,

    /// Basic-auth user name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic-auth password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Simultaneous upserts.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            index: default_index(),
            username: None,
            password: None,
            timeout_seconds: default_timeout(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_index() -> String {
    "accident_stats".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_concurrency() -> usize {
    4
}

/// Summary generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Causes listed per region.
    #[serde(default = "default_top_causes")]
    pub top_causes: usize,

    /// Leave the "Ignorado" weather condition out of the breakdown.
    #[serde(default = "default_true")]
    pub hide_ignored_conditions: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_causes: default_top_causes(),
            hide_ignored_conditions: true,
        }
    }
}

fn default_top_causes() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if let Some(encoding) = args.encoding {
            self.input.encoding = encoding;
        }
        if let Some(delimiter) = args.delimiter {
            self.input.delimiter = delimiter;
        }

        // A preset on the command line replaces any custom label list
        if let Some(weekdays) = args.weekdays {
            self.aggregation.weekdays = weekdays;
            self.aggregation.weekday_names = None;
        }
        if let Some(threads) = args.threads {
            self.aggregation.threads = threads;
        }

        if let Some(ref url) = args.store_url {
            self.store.url = Some(url.clone());
        }
        if let Some(ref index) = args.store_index {
            self.store.index = index.clone();
        }

        if let Some(top) = args.top {
            self.report.top_causes = top;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check values serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if !self.input.delimiter.is_ascii() {
            bail!("input.delimiter must be an ASCII character");
        }
        if self.aggregation.threads == 0 {
            bail!("aggregation.threads must be at least 1");
        }
        if self.store.concurrency == 0 {
            bail!("store.concurrency must be at least 1");
        }
        if self.report.top_causes == 0 {
            bail!("report.top_causes must be at least 1");
        }
        self.aggregation.weekday_names()?;

        Ok(())
    }

    /// Log level for the run: `quiet` wins, then `general.verbose`.
    pub fn log_level(&self, quiet: bool) -> tracing::Level {
        if quiet {
            tracing::Level::ERROR
        } else if self.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.output, "public/accidents-data.json");
        assert_eq!(config.input.encoding, Encoding::Latin1);
        assert_eq!(config.input.delimiter_byte(), b';');
        assert_eq!(config.aggregation.threads, 1);
        assert_eq!(config.store.url, None);
        assert_eq!(config.store.index, "accident_stats");
        assert_eq!(config.report.top_causes, 10);
        assert!(config.report.hide_ignored_conditions);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "dist/data.json"
verbose = true

[input]
encoding = "utf8"
delimiter = ","

[aggregation]
weekdays = "english"
threads = 8

[store]
url = "http://localhost:9200"
username = "elastic"
concurrency = 2

[report]
top_causes = 5
hide_ignored_conditions = false
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "dist/data.json");
        assert!(config.general.verbose);
        assert_eq!(config.input.encoding, Encoding::Utf8);
        assert_eq!(config.input.delimiter_byte(), b',');
        assert_eq!(config.aggregation.threads, 8);
        assert_eq!(
            config.aggregation.weekday_names().unwrap(),
            WeekdayNames::english()
        );
        assert_eq!(config.store.url.as_deref(), Some("http://localhost:9200"));
        assert_eq!(config.store.username.as_deref(), Some("elastic"));
        assert_eq!(config.store.index, "accident_stats");
        assert_eq!(config.store.timeout_seconds, 30);
        assert_eq!(config.store.concurrency, 2);
        assert_eq!(config.report.top_causes, 5);
        assert!(!config.report.hide_ignored_conditions);
    }

    #[test]
    fn test_custom_weekday_names() {
        let toml_content = r#"
[aggregation]
weekday_names = ["Seg", "Ter", "Qua", "Qui", "Sex", "Sab", "Dom"]
"#;
        let config: Config = toml::from_str(toml_content).unwrap();
        let names = config.aggregation.weekday_names().unwrap();
        assert_eq!(names.names()[6], "Dom");

        let bad: Config = toml::from_str("[aggregation]\nweekday_names = [\"Mon\"]\n").unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.aggregation.threads = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.store.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.input.delimiter = 'ç';
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_with_args() {
        let mut config = Config::default();
        config.aggregation.weekday_names = Some(vec!["x".to_string(); 7]);

        let args = Args::try_parse_from([
            "accident-stats",
            "--input",
            "datatran.csv",
            "--output",
            "out/data.json",
            "--weekdays",
            "english",
            "--threads",
            "3",
            "--store-url",
            "http://es:9200",
            "--store-index",
            "stats",
            "--top",
            "7",
            "--verbose",
        ])
        .unwrap();
        config.merge_with_args(&args);

        assert_eq!(config.general.output, "out/data.json");
        assert!(config.general.verbose);
        assert_eq!(config.aggregation.weekday_names, None);
        assert_eq!(config.aggregation.weekdays, WeekdayPreset::English);
        assert_eq!(config.aggregation.threads, 3);
        assert_eq!(config.store.url.as_deref(), Some("http://es:9200"));
        assert_eq!(config.store.index, "stats");
        assert_eq!(config.report.top_causes, 7);
        // Unset flags leave the file's values alone
        assert_eq!(config.input.encoding, Encoding::Latin1);
    }

    #[test]
    fn test_log_level() {
        let mut config = Config::default();
        assert_eq!(config.log_level(false), tracing::Level::INFO);
        assert_eq!(config.log_level(true), tracing::Level::ERROR);

        // verbose = true in the file is enough; no --verbose needed
        config = toml::from_str("[general]\nverbose = true\n").unwrap();
        assert_eq!(config.log_level(false), tracing::Level::DEBUG);
        assert_eq!(config.log_level(true), tracing::Level::ERROR);

        let mut config = Config::default();
        let args = Args::try_parse_from(["accident-stats", "--list-regions", "-v"]).unwrap();
        config.merge_with_args(&args);
        assert_eq!(config.log_level(args.quiet), tracing::Level::DEBUG);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[report]\ntop_causes = 3\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.report.top_causes, 3);

        std::fs::write(&path, "[report\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[input]"));
        assert!(toml_str.contains("[aggregation]"));
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[report]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.store.index, "accident_stats");
    }
}
