//! Markdown summary of an accident document.
//!
//! Renders the same derived views the dashboard shows: national figures,
//! a region ranking and the per-region category breakdowns.

use super::document::AccidentDocument;
use crate::analysis::{rank_regions, top_with_share};
use crate::models::{share, CategoryFrequency, Dimension, Totals};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Condition label the dashboard leaves out of the weather breakdown.
pub const IGNORED_CONDITION: &str = "ignorado";

/// Run information shown at the top of the summary.
#[derive(Debug, Clone)]
pub struct SummaryMetadata {
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
}

/// Presentation choices.
#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub top_causes: usize,
    pub hide_ignored_conditions: bool,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            top_causes: 10,
            hide_ignored_conditions: true,
        }
    }
}

impl From<&crate::config::ReportConfig> for SummaryOptions {
    fn from(config: &crate::config::ReportConfig) -> Self {
        Self {
            top_causes: config.top_causes,
            hide_ignored_conditions: config.hide_ignored_conditions,
        }
    }
}

/// Generate the complete Markdown summary.
pub fn generate_markdown_summary(
    document: &AccidentDocument,
    metadata: &SummaryMetadata,
    options: &SummaryOptions,
) -> String {
    let mut output = String::new();

    output.push_str("# Federal Highway Accident Statistics\n\n");
    output.push_str(&generate_metadata_section(document, metadata));
    output.push_str(&generate_national_section(&document.totals));
    output.push_str(&generate_ranking_section(document));

    for uf in document.ufs.keys() {
        output.push_str(&generate_region_section(document, uf, options));
    }

    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(document: &AccidentDocument, metadata: &SummaryMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** `{}`\n", metadata.source));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Records:** {}\n", document.totals.accidents));
    section.push_str(&format!("- **Regions:** {}\n", document.region_count()));
    if let Some(duration) = metadata.duration_seconds {
        section.push_str(&format!("- **Processing Time:** {:.1}s\n", duration));
    }
    section.push('\n');

    section
}

fn generate_national_section(totals: &Totals) -> String {
    let mut section = String::new();

    section.push_str("## National Totals\n\n");
    section.push_str("| Accidents | Deaths | Severe Injuries | Minor Injuries | Unharmed | Deaths / 100 Accidents |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} | {:.1} |\n\n",
        totals.accidents,
        totals.deaths,
        totals.severe_injuries,
        totals.minor_injuries,
        totals.unharmed,
        totals.fatality_rate()
    ));

    section
}

fn generate_ranking_section(document: &AccidentDocument) -> String {
    let mut section = String::new();

    section.push_str("## Regions by Accident Count\n\n");

    if document.ufs.is_empty() {
        section.push_str("No accidents were recorded.\n\n");
        return section;
    }

    section.push_str("| # | Region | Accidents | Deaths | Deaths / 100 Accidents |\n");
    section.push_str("|:---:|:---|:---:|:---:|:---:|\n");

    for (i, (uf, totals)) in rank_regions(&document.ufs, document.ufs.len())
        .into_iter()
        .enumerate()
    {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {:.1} |\n",
            i + 1,
            uf,
            totals.accidents,
            totals.deaths,
            totals.fatality_rate()
        ));
    }
    section.push('\n');

    section
}

fn generate_region_section(document: &AccidentDocument, uf: &str, options: &SummaryOptions) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", uf));

    if let Some(totals) = document.ufs.get(uf) {
        section.push_str(&format!(
            "*Accidents: {} | Deaths: {} | Severe: {} | Minor: {} | Unharmed: {}*\n\n",
            totals.accidents,
            totals.deaths,
            totals.severe_injuries,
            totals.minor_injuries,
            totals.unharmed
        ));
    }

    let causes = document.table(Dimension::Cause, uf).unwrap_or_default();
    section.push_str(&format!("### Top {} Causes\n\n", options.top_causes));
    if causes.is_empty() {
        section.push_str("No causes recorded.\n\n");
    } else {
        section.push_str("| Cause | Accidents | Share |\n");
        section.push_str("|:---|:---:|:---:|\n");
        for (row, pct) in top_with_share(&causes, options.top_causes) {
            section.push_str(&format!("| {} | {} | {:.1}% |\n", row.label, row.count, pct));
        }
        section.push('\n');
    }

    for dimension in [
        Dimension::Weekday,
        Dimension::Phase,
        Dimension::Condition,
        Dimension::RoadType,
        Dimension::Classification,
    ] {
        let mut rows = document.table(dimension, uf).unwrap_or_default();
        if dimension == Dimension::Condition && options.hide_ignored_conditions {
            rows.retain(|row| !row.label.eq_ignore_ascii_case(IGNORED_CONDITION));
        }
        section.push_str(&generate_table(&dimension.to_string(), &rows));
    }

    section
}

/// A two-column breakdown with each row's share of the table.
fn generate_table(title: &str, rows: &[CategoryFrequency]) -> String {
    let mut table = String::new();

    table.push_str(&format!("### {}\n\n", title));

    if rows.is_empty() {
        table.push_str("No data.\n\n");
        return table;
    }

    let total: u64 = rows.iter().map(|row| row.count).sum();

    table.push_str(&format!("| {} | Accidents | Share |\n", title));
    table.push_str("|:---|:---:|:---:|\n");
    for row in rows {
        table.push_str(&format!(
            "| {} | {} | {:.1}% |\n",
            row.label,
            row.count,
            share(row.count, total)
        ));
    }
    table.push('\n');

    table
}

fn generate_footer() -> String {
    "---\n\n*Generated by accident-stats*\n".to_string()
}

/// Write the summary to a file, creating parent directories as needed.
pub fn write_summary(
    document: &AccidentDocument,
    metadata: &SummaryMetadata,
    options: &SummaryOptions,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let content = generate_markdown_summary(document, metadata, options);
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write summary to {}", path.display()))?;

    Ok(())
}
