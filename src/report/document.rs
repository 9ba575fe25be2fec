//! The aggregated accident document.
//!
//! This is the JSON file the dashboard and the store loader read. Field
//! names and nesting are fixed; regions appear in first-seen order.

use crate::analysis::AggregationResult;
use crate::models::{CategoryFrequency, Dimension, Totals};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Access shared by the six row types of the document.
pub trait CategoryRow {
    fn label(&self) -> &str;
    fn count(&self) -> u64;
}

/// Declares one row type; each table names its label field differently.
macro_rules! category_row {
    ($(#[$meta:meta])* $name:ident, $field:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub $field: String,
            pub count: u64,
        }

        impl CategoryRow for $name {
            fn label(&self) -> &str {
                &self.$field
            }

            fn count(&self) -> u64 {
                self.count
            }
        }

        impl From<CategoryFrequency> for $name {
            fn from(row: CategoryFrequency) -> Self {
                Self {
                    $field: row.label,
                    count: row.count,
                }
            }
        }
    };
}

category_row!(
    /// `{ causa, count }`
    CauseCount,
    causa
);
category_row!(
    /// `{ dia, count }`
    WeekdayCount,
    dia
);
category_row!(
    /// `{ fase, count }`
    PhaseCount,
    fase
);
category_row!(
    /// `{ condicao, count }`
    ConditionCount,
    condicao
);
category_row!(
    /// `{ pista, count }`
    RoadTypeCount,
    pista
);
category_row!(
    /// `{ classificacao, count }`
    ClassificationCount,
    classificacao
);

/// Per-region rows of one table.
pub type RegionTables<R> = IndexMap<String, Vec<R>>;

/// The complete output document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccidentDocument {
    /// National totals (`total_acidentes`, `total_mortos`, ...).
    #[serde(flatten)]
    pub totals: Totals,
    pub ufs: IndexMap<String, Totals>,
    #[serde(default)]
    pub causas_por_uf: RegionTables<CauseCount>,
    #[serde(default)]
    pub dias_semana_por_uf: RegionTables<WeekdayCount>,
    #[serde(default)]
    pub fase_dia_por_uf: RegionTables<PhaseCount>,
    #[serde(default)]
    pub condicao_metereologica_por_uf: RegionTables<ConditionCount>,
    #[serde(default)]
    pub tipo_pista_por_uf: RegionTables<RoadTypeCount>,
    #[serde(default)]
    pub classificacao_por_uf: RegionTables<ClassificationCount>,
}

fn convert<R: From<CategoryFrequency>>(rows: Vec<CategoryFrequency>) -> Vec<R> {
    rows.into_iter().map(R::from).collect()
}

fn frequencies<R: CategoryRow>(tables: &RegionTables<R>, uf: &str) -> Option<Vec<CategoryFrequency>> {
    tables.get(uf).map(|rows| {
        rows.iter()
            .map(|row| CategoryFrequency::new(row.label(), row.count()))
            .collect()
    })
}

impl AccidentDocument {
    /// Shape an aggregation result into the document layout.
    pub fn from_result(result: AggregationResult) -> Self {
        let mut document = Self {
            totals: result.global,
            ..Self::default()
        };

        for (uf, region) in result.regions {
            document.ufs.insert(uf.clone(), region.totals);

            let [causes, weekdays, phases, conditions, road_types, classifications] =
                region.into_tables();

            document.causas_por_uf.insert(uf.clone(), convert(causes));
            document.dias_semana_por_uf.insert(uf.clone(), convert(weekdays));
            document.fase_dia_por_uf.insert(uf.clone(), convert(phases));
            document
                .condicao_metereologica_por_uf
                .insert(uf.clone(), convert(conditions));
            document.tipo_pista_por_uf.insert(uf.clone(), convert(road_types));
            document
                .classificacao_por_uf
                .insert(uf, convert(classifications));
        }

        document
    }

    /// Rows of one table for one region, if the region has that table.
    pub fn table(&self, dimension: Dimension, uf: &str) -> Option<Vec<CategoryFrequency>> {
        match dimension {
            Dimension::Cause => frequencies(&self.causas_por_uf, uf),
            Dimension::Weekday => frequencies(&self.dias_semana_por_uf, uf),
            Dimension::Phase => frequencies(&self.fase_dia_por_uf, uf),
            Dimension::Condition => frequencies(&self.condicao_metereologica_por_uf, uf),
            Dimension::RoadType => frequencies(&self.tipo_pista_por_uf, uf),
            Dimension::Classification => frequencies(&self.classificacao_por_uf, uf),
        }
    }

    /// Number of regions.
    pub fn region_count(&self) -> usize {
        self.ufs.len()
    }

    /// Pretty-printed JSON, two-space indented.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    /// Parse a document previously written by [`write_document`].
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Malformed accident document")
    }
}

/// Write the document, creating parent directories as needed.
pub fn write_document(document: &AccidentDocument, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let content = document.to_json()?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write document to {}", path.display()))?;

    info!("Wrote {} regions to {}", document.region_count(), path.display());
    Ok(())
}

/// Read a document from disk.
pub fn read_document(path: &Path) -> Result<AccidentDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document {}", path.display()))?;

    AccidentDocument::from_json(&content)
        .with_context(|| format!("Failed to parse document {}", path.display()))
}
