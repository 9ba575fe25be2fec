//! CSV reader for PRF accident exports.
//!
//! The exports are semicolon-delimited, Latin-1 encoded and have one
//! header row. Records are decoded and defaulted one at a time, so the
//! file never has to be held in memory.

use crate::models::{AccidentRecord, RawRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Text encoding of the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// ISO-8859-1, as published by PRF (default)
    #[default]
    Latin1,
    /// UTF-8; invalid sequences are replaced
    Utf8,
}

impl Encoding {
    /// Decode one field.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            // Every Latin-1 byte is the Unicode code point of the same value.
            Encoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Configuration for reading an input file.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub delimiter: u8,
    pub encoding: Encoding,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delimiter: b';',
            encoding: Encoding::Latin1,
        }
    }
}

impl From<&crate::config::InputConfig> for IngestConfig {
    fn from(config: &crate::config::InputConfig) -> Self {
        Self {
            delimiter: config.delimiter_byte(),
            encoding: config.encoding,
        }
    }
}

/// Errors that abort reading an input file.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {source_name} near line {line}: {source}")]
    Csv {
        source_name: String,
        line: u64,
        #[source]
        source: csv::Error,
    },
}

/// Streaming iterator of accident records.
pub struct RecordReader<R: Read> {
    reader: csv::Reader<R>,
    headers: csv::StringRecord,
    encoding: Encoding,
    source_name: String,
    row: csv::ByteRecord,
}

impl RecordReader<File> {
    /// Open a CSV file from disk.
    pub fn open(path: &Path, config: &IngestConfig) -> Result<Self, IngestError> {
        let file = File::open(path).map_err(|source| IngestError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_reader(file, config, &path.display().to_string())
    }
}

impl<R: Read> RecordReader<R> {
    /// Wrap any reader. `source_name` is used in error messages.
    pub fn from_reader(reader: R, config: &IngestConfig, source_name: &str) -> Result<Self, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let raw_headers = reader.byte_headers().map_err(|source| IngestError::Csv {
            source_name: source_name.to_string(),
            line: 1,
            source,
        })?;

        let headers: csv::StringRecord = raw_headers
            .iter()
            .map(|field| config.encoding.decode(field).trim().to_string())
            .collect::<Vec<_>>()
            .into();

        debug!("{} columns in {}", headers.len(), source_name);

        let record_reader = Self {
            reader,
            headers,
            encoding: config.encoding,
            source_name: source_name.to_string(),
            row: csv::ByteRecord::new(),
        };

        if record_reader.headers.is_empty() {
            // An empty file has no header and no records
            warn!("{} is empty; no records will be read", source_name);
            return Ok(record_reader);
        }

        for column in record_reader.missing_columns() {
            warn!(
                "Column '{}' not found in {}; every record will use its default",
                column, source_name
            );
        }

        Ok(record_reader)
    }

    /// Expected columns absent from the header row.
    pub fn missing_columns(&self) -> Vec<&'static str> {
        RawRecord::COLUMNS
            .iter()
            .copied()
            .filter(|column| !self.headers.iter().any(|h| h == *column))
            .collect()
    }

    fn line(&self) -> u64 {
        self.row.position().map(|p| p.line()).unwrap_or(0)
    }

    fn csv_error(&self, source: csv::Error) -> IngestError {
        let line = source
            .position()
            .map(|p| p.line())
            .unwrap_or_else(|| self.line());

        IngestError::Csv {
            source_name: self.source_name.clone(),
            line,
            source,
        }
    }

    fn decode_row(&self) -> csv::StringRecord {
        self.row
            .iter()
            .map(|field| self.encoding.decode(field))
            .collect::<Vec<_>>()
            .into()
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<AccidentRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_byte_record(&mut self.row) {
            Ok(false) => None,
            Ok(true) => {
                let decoded = self.decode_row();
                let parsed = decoded
                    .deserialize::<RawRecord>(Some(&self.headers))
                    .map(AccidentRecord::from)
                    .map_err(|e| self.csv_error(e));
                Some(parsed)
            }
            Err(e) => Some(Err(self.csv_error(e))),
        }
    }
}

/// Read every record of a file into memory.
pub fn read_all(path: &Path, config: &IngestConfig) -> Result<Vec<AccidentRecord>, IngestError> {
    RecordReader::open(path, config)?.collect()
}
