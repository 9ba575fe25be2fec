//! Accident aggregation and statistics.
//!
//! This module folds accident records into global totals, per-region
//! totals and six per-region frequency tables, then orders the tables
//! for output.

use crate::models::{
    share, AccidentRecord, CategoryFrequency, Dimension, Totals, WeekdayNames,
};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Occurrence counts per label, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: IndexMap<String, u64>,
}

impl FrequencyTable {
    /// Count one occurrence of `label`.
    pub fn increment(&mut self, label: &str) {
        match self.counts.get_mut(label) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(label.to_string(), 1);
            }
        }
    }

    /// Add every count of `other` into this table.
    pub fn merge(&mut self, other: FrequencyTable) {
        for (label, count) in other.counts {
            *self.counts.entry(label).or_insert(0) += count;
        }
    }

    /// Rows sorted by descending count. Ties keep first-seen order.
    pub fn sorted_desc(&self) -> Vec<CategoryFrequency> {
        let mut rows: Vec<CategoryFrequency> = self
            .counts
            .iter()
            .map(|(label, count)| CategoryFrequency::new(label.clone(), *count))
            .collect();

        rows.sort_by_key(|row| std::cmp::Reverse(row.count));
        rows
    }

    /// One row per canonical weekday, Monday first, zero-filled.
    ///
    /// Labels that differ from a canonical name only in case or padding
    /// are folded into that day. Other labels are left out.
    pub fn in_weekday_order(&self, weekdays: &WeekdayNames) -> Vec<CategoryFrequency> {
        let mut days = [0u64; 7];
        for (label, count) in &self.counts {
            if let Some(position) = weekdays.position(label) {
                days[position] += count;
            }
        }

        weekdays
            .names()
            .iter()
            .zip(days)
            .map(|(name, count)| CategoryFrequency::new(name.clone(), count))
            .collect()
    }
}

/// Running totals and category tables for one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionAggregate {
    pub totals: Totals,
    tables: [FrequencyTable; 6],
}

impl RegionAggregate {
    fn record(&mut self, record: &AccidentRecord) {
        self.totals.record(record);
        for dimension in Dimension::ALL {
            self.tables[dimension.index()].increment(record.label(dimension));
        }
    }

    fn merge(&mut self, other: RegionAggregate) {
        self.totals += other.totals;
        for (table, other_table) in self.tables.iter_mut().zip(other.tables) {
            table.merge(other_table);
        }
    }

    fn table(&self, dimension: Dimension) -> &FrequencyTable {
        &self.tables[dimension.index()]
    }

    fn finish(&self, weekdays: &WeekdayNames) -> RegionSummary {
        let tables = Dimension::ALL.map(|dimension| match dimension {
            Dimension::Weekday => self.table(dimension).in_weekday_order(weekdays),
            _ => self.table(dimension).sorted_desc(),
        });

        RegionSummary {
            totals: self.totals,
            tables,
        }
    }
}

/// Final totals and ordered tables for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSummary {
    pub totals: Totals,
    tables: [Vec<CategoryFrequency>; 6],
}

impl RegionSummary {
    #[cfg(test)]
    pub fn table(&self, dimension: Dimension) -> &[CategoryFrequency] {
        &self.tables[dimension.index()]
    }

    pub fn into_tables(self) -> [Vec<CategoryFrequency>; 6] {
        self.tables
    }
}

/// Output of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationResult {
    pub global: Totals,
    /// Regions in first-seen order.
    pub regions: IndexMap<String, RegionSummary>,
    /// Records whose weekday matched none of the canonical names.
    pub unmatched_weekdays: u64,
}

/// Single-pass fold over accident records.
#[derive(Debug, Clone)]
pub struct Aggregator {
    weekdays: WeekdayNames,
    global: Totals,
    regions: IndexMap<String, RegionAggregate>,
    unmatched_weekdays: u64,
}

impl Aggregator {
    pub fn new(weekdays: WeekdayNames) -> Self {
        Self {
            weekdays,
            global: Totals::default(),
            regions: IndexMap::new(),
            unmatched_weekdays: 0,
        }
    }

    /// Fold one record into the running aggregates.
    pub fn push(&mut self, record: &AccidentRecord) {
        self.global.record(record);

        if self.weekdays.position(&record.weekday).is_none() {
            self.unmatched_weekdays += 1;
        }

        match self.regions.get_mut(&record.region) {
            Some(region) => region.record(record),
            None => {
                let mut region = RegionAggregate::default();
                region.record(record);
                self.regions.insert(record.region.clone(), region);
            }
        }
    }

    /// Fold every record of an iterator.
    pub fn extend<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'a AccidentRecord>,
    {
        for record in records {
            self.push(record);
        }
    }

    /// Combine a partial aggregate built over a later slice of the input.
    ///
    /// Regions and labels already present keep their position; new ones
    /// are appended in the order `other` first saw them.
    pub fn merge(&mut self, other: Aggregator) {
        self.global += other.global;
        self.unmatched_weekdays += other.unmatched_weekdays;

        for (code, region) in other.regions {
            match self.regions.get_mut(&code) {
                Some(existing) => existing.merge(region),
                None => {
                    self.regions.insert(code, region);
                }
            }
        }
    }

    /// Number of records folded so far.
    pub fn records_seen(&self) -> u64 {
        self.global.accidents
    }

    /// Order the tables and produce the final result.
    pub fn finish(self) -> AggregationResult {
        if self.unmatched_weekdays > 0 {
            warn!(
                "{} records have a weekday outside {:?} and are missing from the weekday tables",
                self.unmatched_weekdays,
                self.weekdays.names()
            );
        }

        let regions = self
            .regions
            .iter()
            .map(|(code, region)| (code.clone(), region.finish(&self.weekdays)))
            .collect();

        debug!(
            "Aggregated {} records into {} regions",
            self.global.accidents,
            self.regions.len()
        );

        AggregationResult {
            global: self.global,
            regions,
            unmatched_weekdays: self.unmatched_weekdays,
        }
    }
}

/// Aggregate a sequence of records in one pass.
pub fn aggregate<'a, I>(records: I, weekdays: &WeekdayNames) -> AggregationResult
where
    I: IntoIterator<Item = &'a AccidentRecord>,
{
    let mut aggregator = Aggregator::new(weekdays.clone());
    aggregator.extend(records);
    aggregator.finish()
}

/// Aggregate on `threads` workers by folding contiguous chunks and
/// merging them in input order. The result equals [`aggregate`].
pub fn aggregate_parallel(
    records: &[AccidentRecord],
    weekdays: &WeekdayNames,
    threads: usize,
) -> Result<AggregationResult> {
    let threads = threads.max(1);
    if threads == 1 || records.len() < threads {
        return Ok(aggregate(records, weekdays));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("Failed to build aggregation thread pool")?;

    let chunk_size = records.len().div_ceil(threads);
    debug!(
        "Aggregating {} records in chunks of {} on {} threads",
        records.len(),
        chunk_size,
        threads
    );

    let partials: Vec<Aggregator> = pool.install(|| {
        records
            .par_chunks(chunk_size)
            .map(|chunk| {
                let mut partial = Aggregator::new(weekdays.clone());
                partial.extend(chunk);
                partial
            })
            .collect()
    });

    let mut combined = Aggregator::new(weekdays.clone());
    for partial in partials {
        combined.merge(partial);
    }

    Ok(combined.finish())
}

/// Regions ordered by accident count (highest first), truncated to `n`.
pub fn rank_regions<'a>(
    regions: impl IntoIterator<Item = (&'a String, &'a Totals)>,
    n: usize,
) -> Vec<(&'a str, &'a Totals)> {
    let mut ranked: Vec<(&str, &Totals)> = regions
        .into_iter()
        .map(|(code, totals)| (code.as_str(), totals))
        .collect();

    ranked.sort_by_key(|(_, totals)| std::cmp::Reverse(totals.accidents));
    ranked.truncate(n);
    ranked
}

/// The first `n` rows of a table with each row's share of the whole table.
pub fn top_with_share(rows: &[CategoryFrequency], n: usize) -> Vec<(&CategoryFrequency, f64)> {
    let total: u64 = rows.iter().map(|row| row.count).sum();

    rows.iter()
        .take(n)
        .map(|row| (row, share(row.count, total)))
        .collect()
}
