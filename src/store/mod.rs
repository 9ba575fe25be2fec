//! Persistence of per-region statistics.
//!
//! Each region becomes one row keyed by its code. Loading overwrites any
//! previous row for the same region. When the backend is not configured or
//! cannot be reached the load is skipped with a warning.

pub mod http;

use crate::report::document::{
    AccidentDocument, CauseCount, ClassificationCount, ConditionCount, PhaseCount, RoadTypeCount,
    WeekdayCount,
};
use crate::analysis::rank_regions;
use crate::models::Totals;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use http::HttpStore;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid store URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Store at {url} is unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Store rejected region {uf} with status {status}: {body}")]
    Rejected {
        uf: String,
        status: u16,
        body: String,
    },

    #[error("Store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to encode region row: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The six category tables of one region, as stored in `data_json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDetails {
    pub causas: Vec<CauseCount>,
    pub dias: Vec<WeekdayCount>,
    pub fases: Vec<PhaseCount>,
    pub condicoes: Vec<ConditionCount>,
    pub pistas: Vec<RoadTypeCount>,
    pub classificacoes: Vec<ClassificationCount>,
}

/// One stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRow {
    pub uf: String,
    pub total_accidents: u64,
    pub total_deaths: u64,
    pub total_severe_injuries: u64,
    pub total_minor_injuries: u64,
    pub total_unharmed: u64,
    /// JSON-encoded [`RegionDetails`].
    pub data_json: String,
    pub updated_at: DateTime<Utc>,
}

impl RegionRow {
    /// Build the row for `uf` from a document. Tables the document lacks
    /// for this region are stored as empty lists.
    pub fn from_document(
        document: &AccidentDocument,
        uf: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Self>, StoreError> {
        let Some(totals) = document.ufs.get(uf) else {
            return Ok(None);
        };

        let details = RegionDetails {
            causas: document.causas_por_uf.get(uf).cloned().unwrap_or_default(),
            dias: document.dias_semana_por_uf.get(uf).cloned().unwrap_or_default(),
            fases: document.fase_dia_por_uf.get(uf).cloned().unwrap_or_default(),
            condicoes: document
                .condicao_metereologica_por_uf
                .get(uf)
                .cloned()
                .unwrap_or_default(),
            pistas: document.tipo_pista_por_uf.get(uf).cloned().unwrap_or_default(),
            classificacoes: document
                .classificacao_por_uf
                .get(uf)
                .cloned()
                .unwrap_or_default(),
        };

        Ok(Some(Self {
            uf: uf.to_string(),
            total_accidents: totals.accidents,
            total_deaths: totals.deaths,
            total_severe_injuries: totals.severe_injuries,
            total_minor_injuries: totals.minor_injuries,
            total_unharmed: totals.unharmed,
            data_json: serde_json::to_string(&details)?,
            updated_at,
        }))
    }

    /// Decode the nested category tables.
    pub fn details(&self) -> Result<RegionDetails, StoreError> {
        Ok(serde_json::from_str(&self.data_json)?)
    }

    /// The row's counts as document totals.
    pub fn totals(&self) -> Totals {
        Totals {
            accidents: self.total_accidents,
            deaths: self.total_deaths,
            severe_injuries: self.total_severe_injuries,
            minor_injuries: self.total_minor_injuries,
            unharmed: self.total_unharmed,
        }
    }
}

/// All rows of a document, in region order.
pub fn rows_from_document(
    document: &AccidentDocument,
    updated_at: DateTime<Utc>,
) -> Result<Vec<RegionRow>, StoreError> {
    let mut rows = Vec::with_capacity(document.ufs.len());
    for uf in document.ufs.keys() {
        if let Some(row) = RegionRow::from_document(document, uf, updated_at)? {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Stored rows ordered by accident count (highest first), truncated to `n`.
pub fn rank_rows(rows: &[RegionRow], n: usize) -> Vec<(String, Totals)> {
    let by_region: IndexMap<String, Totals> =
        rows.iter().map(|row| (row.uf.clone(), row.totals())).collect();

    rank_regions(&by_region, n)
        .into_iter()
        .map(|(uf, totals)| (uf.to_string(), *totals))
        .collect()
}

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStatus {
    Created,
    Updated,
}

/// A backend holding one row per region.
pub trait RegionStore {
    /// Check that the backend answers.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Insert the row, replacing any row with the same `uf`.
    async fn upsert(&self, row: &RegionRow) -> Result<UpsertStatus, StoreError>;

    /// Read the row for one region.
    async fn fetch(&self, uf: &str) -> Result<Option<RegionRow>, StoreError>;

    /// Read every stored row.
    async fn fetch_all(&self) -> Result<Vec<RegionRow>, StoreError>;
}

/// Tally of one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadResults {
    pub num_total: usize,
    pub num_created: usize,
    pub num_updated: usize,
    pub num_failed: usize,
}

impl AddAssign for LoadResults {
    fn add_assign(&mut self, other: Self) {
        self.num_total += other.num_total;
        self.num_created += other.num_created;
        self.num_updated += other.num_updated;
        self.num_failed += other.num_failed;
    }
}

impl LoadResults {
    fn from_status(status: &Result<UpsertStatus, StoreError>) -> Self {
        let mut results = Self {
            num_total: 1,
            ..Self::default()
        };
        match status {
            Ok(UpsertStatus::Created) => results.num_created = 1,
            Ok(UpsertStatus::Updated) => results.num_updated = 1,
            Err(_) => results.num_failed = 1,
        }
        results
    }
}

/// Result of attempting a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(LoadResults),
    Skipped { reason: String },
}

/// Upsert every region of the document, `concurrency` requests at a time.
///
/// Returns `Skipped` when the store does not answer the availability probe.
pub async fn load_document<S: RegionStore>(
    store: &S,
    document: &AccidentDocument,
    concurrency: usize,
    show_progress: bool,
) -> Result<LoadOutcome, StoreError> {
    if let Err(e) = store.ping().await {
        warn!("Cannot load accident data: store not available ({})", e);
        return Ok(LoadOutcome::Skipped {
            reason: e.to_string(),
        });
    }

    let rows = rows_from_document(document, Utc::now())?;
    info!("Loading {} regions into the store", rows.len());

    let progress_bar = if show_progress {
        let pb = ProgressBar::new(rows.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut tally = LoadResults::default();
    let mut upserts = stream::iter(rows.iter())
        .map(|row| async move { (row, store.upsert(row).await) })
        .buffer_unordered(concurrency.max(1));

    while let Some((row, status)) = upserts.next().await {
        match &status {
            Ok(s) => debug!("Region {}: {:?}", row.uf, s),
            Err(e) => warn!("Failed to upsert region {}: {}", row.uf, e),
        }
        tally += LoadResults::from_status(&status);

        if let Some(ref pb) = progress_bar {
            pb.set_message(row.uf.clone());
            pb.inc(1);
        }
    }

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Load complete");
    }

    info!(
        "Loaded {} regions ({} created, {} updated, {} failed)",
        tally.num_total, tally.num_created, tally.num_updated, tally.num_failed
    );

    Ok(LoadOutcome::Loaded(tally))
}

/// Build the configured store and load the document into it.
///
/// A missing URL or a store that cannot be built is reported as `Skipped`.
pub async fn load_with_config(
    config: &crate::config::StoreConfig,
    document: &AccidentDocument,
    show_progress: bool,
) -> Result<LoadOutcome, StoreError> {
    let store = match HttpStore::from_config(config) {
        Ok(Some(store)) => store,
        Ok(None) => {
            warn!("Cannot load accident data: no store URL configured");
            return Ok(LoadOutcome::Skipped {
                reason: "no store URL configured".to_string(),
            });
        }
        Err(e) => {
            warn!("Cannot load accident data: {}", e);
            return Ok(LoadOutcome::Skipped {
                reason: e.to_string(),
            });
        }
    };

    load_document(&store, document, config.concurrency, show_progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate;
    use crate::models::{AccidentRecord, Dimension, WeekdayNames};
    use std::sync::Mutex;

    /// In-memory backend with the same overwrite semantics as the real store.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<IndexMap<String, RegionRow>>,
        down: bool,
        reject: Option<String>,
    }

    impl RegionStore for MemoryStore {
        async fn ping(&self) -> Result<(), StoreError> {
            if self.down {
                Err(StoreError::InvalidUrl {
                    url: "memory://".to_string(),
                    reason: "down".to_string(),
                })
            } else {
                Ok(())
            }
        }

        async fn upsert(&self, row: &RegionRow) -> Result<UpsertStatus, StoreError> {
            if self.reject.as_deref() == Some(row.uf.as_str()) {
                return Err(StoreError::Rejected {
                    uf: row.uf.clone(),
                    status: 400,
                    body: "rejected".to_string(),
                });
            }

            let previous = self.rows.lock().unwrap().insert(row.uf.clone(), row.clone());
            Ok(if previous.is_some() {
                UpsertStatus::Updated
            } else {
                UpsertStatus::Created
            })
        }

        async fn fetch(&self, uf: &str) -> Result<Option<RegionRow>, StoreError> {
            Ok(self.rows.lock().unwrap().get(uf).cloned())
        }

        async fn fetch_all(&self) -> Result<Vec<RegionRow>, StoreError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    fn create_test_document(sp_deaths: u64) -> AccidentDocument {
        let records = vec![
            AccidentRecord::new("SP")
                .with_label(Dimension::Cause, "Speeding")
                .with_victims(sp_deaths, 0, 0, 0),
            AccidentRecord::new("RJ").with_label(Dimension::Cause, "Fatigue"),
        ];
        AccidentDocument::from_result(aggregate(&records, &WeekdayNames::default()))
    }

    #[test]
    fn test_region_row_from_document() {
        let document = create_test_document(2);
        let row = RegionRow::from_document(&document, "SP", Utc::now())
            .unwrap()
            .unwrap();

        assert_eq!(row.total_accidents, 1);
        assert_eq!(row.total_deaths, 2);

        let details = row.details().unwrap();
        assert_eq!(details.causas[0].causa, "Speeding");
        assert_eq!(details.dias.len(), 7);

        let blob: serde_json::Value = serde_json::from_str(&row.data_json).unwrap();
        for key in ["causas", "dias", "fases", "condicoes", "pistas", "classificacoes"] {
            assert!(blob[key].is_array(), "missing {}", key);
        }

        assert!(RegionRow::from_document(&document, "AM", Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_missing_tables_default_to_empty() {
        let mut document = create_test_document(0);
        document.causas_por_uf.clear();

        let row = RegionRow::from_document(&document, "RJ", Utc::now())
            .unwrap()
            .unwrap();
        assert!(row.details().unwrap().causas.is_empty());
    }

    #[test]
    fn test_load_and_reload_overwrites() {
        let store = MemoryStore::default();

        let first = tokio_test::block_on(load_document(&store, &create_test_document(1), 2, false)).unwrap();
        assert_eq!(
            first,
            LoadOutcome::Loaded(LoadResults {
                num_total: 2,
                num_created: 2,
                num_updated: 0,
                num_failed: 0,
            })
        );

        let second = tokio_test::block_on(load_document(&store, &create_test_document(5), 2, false)).unwrap();
        assert_eq!(
            second,
            LoadOutcome::Loaded(LoadResults {
                num_total: 2,
                num_created: 0,
                num_updated: 2,
                num_failed: 0,
            })
        );

        let sp = tokio_test::block_on(store.fetch("SP")).unwrap().unwrap();
        assert_eq!(sp.total_deaths, 5);
        assert_eq!(store.rows.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_fetch_all_returns_every_region() {
        let store = MemoryStore::default();
        assert!(tokio_test::block_on(store.fetch_all()).unwrap().is_empty());

        tokio_test::block_on(load_document(&store, &create_test_document(3), 2, false)).unwrap();

        let mut rows = tokio_test::block_on(store.fetch_all()).unwrap();
        rows.sort_by(|a, b| a.uf.cmp(&b.uf));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].uf, "RJ");
        assert_eq!(rows[1].uf, "SP");
        assert_eq!(rows[1].total_deaths, 3);

        let ranked = rank_rows(&rows, 10);
        assert_eq!(ranked[0].0, "SP");
        assert_eq!(ranked[0].1.deaths, 3);
    }

    #[test]
    fn test_unavailable_store_is_skipped() {
        let store = MemoryStore {
            down: true,
            ..MemoryStore::default()
        };

        let outcome = tokio_test::block_on(load_document(&store, &create_test_document(0), 1, false)).unwrap();
        assert!(matches!(outcome, LoadOutcome::Skipped { .. }));
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_upserts_are_tallied() {
        let store = MemoryStore {
            reject: Some("RJ".to_string()),
            ..MemoryStore::default()
        };

        let outcome = tokio_test::block_on(load_document(&store, &create_test_document(0), 4, false)).unwrap();
        match outcome {
            LoadOutcome::Loaded(results) => {
                assert_eq!(results.num_total, 2);
                assert_eq!(results.num_created, 1);
                assert_eq!(results.num_failed, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_missing_url_is_skipped() {
        let config = crate::config::StoreConfig::default();
        let outcome =
            tokio_test::block_on(load_with_config(&config, &create_test_document(0), false)).unwrap();
        assert_eq!(
            outcome,
            LoadOutcome::Skipped {
                reason: "no store URL configured".to_string()
            }
        );
    }

    #[test]
    fn test_load_results_add_assign() {
        let mut a = LoadResults {
            num_total: 1,
            num_created: 1,
            ..LoadResults::default()
        };
        a += LoadResults {
            num_total: 2,
            num_updated: 1,
            num_failed: 1,
            ..LoadResults::default()
        };
        assert_eq!(a.num_total, 3);
        assert_eq!(a.num_created, 1);
        assert_eq!(a.num_updated, 1);
        assert_eq!(a.num_failed, 1);
    }
}
