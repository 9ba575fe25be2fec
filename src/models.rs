//! Data models for the accident aggregator.
//!
//! This module contains the core data structures used throughout
//! the application: parsed accident records, victim totals, the six
//! categorical dimensions and the canonical weekday order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

/// Region code used when a record has no `uf`.
pub const UNKNOWN_REGION: &str = "UNKNOWN";

/// Category label used when a text field is absent or blank.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// One of the six categorical attributes counted per region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Cause,
    Weekday,
    Phase,
    Condition,
    RoadType,
    Classification,
}

impl Dimension {
    /// All dimensions, in output document order.
    pub const ALL: [Dimension; 6] = [
        Dimension::Cause,
        Dimension::Weekday,
        Dimension::Phase,
        Dimension::Condition,
        Dimension::RoadType,
        Dimension::Classification,
    ];

    /// Position of the dimension inside per-region table arrays.
    pub fn index(self) -> usize {
        match self {
            Dimension::Cause => 0,
            Dimension::Weekday => 1,
            Dimension::Phase => 2,
            Dimension::Condition => 3,
            Dimension::RoadType => 4,
            Dimension::Classification => 5,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Cause => write!(f, "Cause"),
            Dimension::Weekday => write!(f, "Weekday"),
            Dimension::Phase => write!(f, "Phase of Day"),
            Dimension::Condition => write!(f, "Weather Condition"),
            Dimension::RoadType => write!(f, "Road Type"),
            Dimension::Classification => write!(f, "Classification"),
        }
    }
}

/// Accident and victim counts, used both globally and per region.
///
/// Field names follow the output document (`total_acidentes`, ...).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(rename = "total_acidentes")]
    pub accidents: u64,
    #[serde(rename = "total_mortos")]
    pub deaths: u64,
    #[serde(rename = "total_feridos_graves")]
    pub severe_injuries: u64,
    #[serde(rename = "total_feridos_leves")]
    pub minor_injuries: u64,
    #[serde(rename = "total_ilesos")]
    pub unharmed: u64,
}

impl Totals {
    /// Count one accident and its victims.
    pub fn record(&mut self, record: &AccidentRecord) {
        self.accidents += 1;
        self.deaths += record.deaths;
        self.severe_injuries += record.severe_injuries;
        self.minor_injuries += record.minor_injuries;
        self.unharmed += record.unharmed;
    }

    /// Deaths per 100 accidents.
    pub fn fatality_rate(&self) -> f64 {
        share(self.deaths, self.accidents)
    }
}

impl AddAssign for Totals {
    fn add_assign(&mut self, other: Self) {
        self.accidents += other.accidents;
        self.deaths += other.deaths;
        self.severe_injuries += other.severe_injuries;
        self.minor_injuries += other.minor_injuries;
        self.unharmed += other.unharmed;
    }
}

/// Percentage of `count` within `total`; 0 when `total` is 0.
pub fn share(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// A row of the source CSV as found on disk.
///
/// Every field is optional: absent columns, short rows and empty cells
/// all deserialize to `None` and are defaulted in [`AccidentRecord::from`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub uf: Option<String>,
    #[serde(default)]
    pub mortos: Option<String>,
    #[serde(default)]
    pub feridos_graves: Option<String>,
    #[serde(default)]
    pub feridos_leves: Option<String>,
    #[serde(default)]
    pub ilesos: Option<String>,
    #[serde(default)]
    pub causa_acidente: Option<String>,
    #[serde(default)]
    pub dia_semana: Option<String>,
    #[serde(default)]
    pub fase_dia: Option<String>,
    #[serde(default)]
    pub condicao_metereologica: Option<String>,
    #[serde(default)]
    pub tipo_pista: Option<String>,
    #[serde(default)]
    pub classificacao_acidente: Option<String>,
}

impl RawRecord {
    /// Columns the aggregator reads, in CSV header spelling.
    pub const COLUMNS: [&'static str; 11] = [
        "uf",
        "mortos",
        "feridos_graves",
        "feridos_leves",
        "ilesos",
        "causa_acidente",
        "dia_semana",
        "fase_dia",
        "condicao_metereologica",
        "tipo_pista",
        "classificacao_acidente",
    ];
}

/// A single accident, with every field resolved to a usable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccidentRecord {
    /// Region (state) code, `UNKNOWN` when blank.
    pub region: String,
    pub deaths: u64,
    pub severe_injuries: u64,
    pub minor_injuries: u64,
    pub unharmed: u64,
    pub cause: String,
    pub weekday: String,
    pub phase: String,
    pub condition: String,
    pub road_type: String,
    pub classification: String,
}

impl AccidentRecord {
    /// Creates a record for `region` with zero victims and unknown categories.
    pub fn new(region: &str) -> Self {
        Self {
            region: label_or(region, UNKNOWN_REGION),
            deaths: 0,
            severe_injuries: 0,
            minor_injuries: 0,
            unharmed: 0,
            cause: UNKNOWN_LABEL.to_string(),
            weekday: UNKNOWN_LABEL.to_string(),
            phase: UNKNOWN_LABEL.to_string(),
            condition: UNKNOWN_LABEL.to_string(),
            road_type: UNKNOWN_LABEL.to_string(),
            classification: UNKNOWN_LABEL.to_string(),
        }
    }

    /// Returns the record's label for a dimension.
    pub fn label(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Cause => &self.cause,
            Dimension::Weekday => &self.weekday,
            Dimension::Phase => &self.phase,
            Dimension::Condition => &self.condition,
            Dimension::RoadType => &self.road_type,
            Dimension::Classification => &self.classification,
        }
    }

    /// Sets the label for a dimension, applying the blank-to-`Unknown` rule.
    pub fn with_label(mut self, dimension: Dimension, label: &str) -> Self {
        let label = label_or(label, UNKNOWN_LABEL);
        match dimension {
            Dimension::Cause => self.cause = label,
            Dimension::Weekday => self.weekday = label,
            Dimension::Phase => self.phase = label,
            Dimension::Condition => self.condition = label,
            Dimension::RoadType => self.road_type = label,
            Dimension::Classification => self.classification = label,
        }
        self
    }

    /// Sets the four victim counts.
    pub fn with_victims(mut self, deaths: u64, severe: u64, minor: u64, unharmed: u64) -> Self {
        self.deaths = deaths;
        self.severe_injuries = severe;
        self.minor_injuries = minor;
        self.unharmed = unharmed;
        self
    }
}

impl From<RawRecord> for AccidentRecord {
    fn from(raw: RawRecord) -> Self {
        fn field(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("")
        }

        AccidentRecord::new(field(&raw.uf))
            .with_victims(
                parse_count(raw.mortos.as_deref()),
                parse_count(raw.feridos_graves.as_deref()),
                parse_count(raw.feridos_leves.as_deref()),
                parse_count(raw.ilesos.as_deref()),
            )
            .with_label(Dimension::Cause, field(&raw.causa_acidente))
            .with_label(Dimension::Weekday, field(&raw.dia_semana))
            .with_label(Dimension::Phase, field(&raw.fase_dia))
            .with_label(Dimension::Condition, field(&raw.condicao_metereologica))
            .with_label(Dimension::RoadType, field(&raw.tipo_pista))
            .with_label(Dimension::Classification, field(&raw.classificacao_acidente))
    }
}

/// Parses a victim count the way the source data is usually read: the
/// leading run of ASCII digits after trimming. Anything else counts as 0.
pub fn parse_count(value: Option<&str>) -> u64 {
    let value = value.unwrap_or("").trim();
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());

    value[..end].parse().unwrap_or(0)
}

/// Trims a text field, falling back to `default` when it is blank.
fn label_or(value: &str, default: &str) -> String {
    match value.trim() {
        "" => default.to_string(),
        v => v.to_string(),
    }
}

/// A category label with its number of occurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFrequency {
    pub label: String,
    pub count: u64,
}

impl CategoryFrequency {
    pub fn new(label: impl Into<String>, count: u64) -> Self {
        Self {
            label: label.into(),
            count,
        }
    }
}

/// Built-in weekday label sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WeekdayPreset {
    /// Labels used by the PRF datasets (default)
    #[default]
    Portuguese,
    /// Monday through Sunday
    English,
}

/// The seven canonical weekday labels, Monday first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekdayNames {
    names: [String; 7],
}

impl WeekdayNames {
    /// Labels as they appear in the `dia_semana` column.
    pub fn portuguese() -> Self {
        Self::from_strs([
            "segunda-feira",
            "terça-feira",
            "quarta-feira",
            "quinta-feira",
            "sexta-feira",
            "sábado",
            "domingo",
        ])
    }

    pub fn english() -> Self {
        Self::from_strs([
            "Monday",
            "Tuesday",
            "Wednesday",
            "Thursday",
            "Friday",
            "Saturday",
            "Sunday",
        ])
    }

    pub fn from_preset(preset: WeekdayPreset) -> Self {
        match preset {
            WeekdayPreset::Portuguese => Self::portuguese(),
            WeekdayPreset::English => Self::english(),
        }
    }

    /// Builds a custom label set. Exactly seven non-blank labels are required.
    pub fn custom(names: &[String]) -> Result<Self, String> {
        if names.len() != 7 {
            return Err(format!(
                "Expected 7 weekday names, got {}",
                names.len()
            ));
        }
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err("Weekday names must not be blank".to_string());
        }

        let names: [String; 7] = std::array::from_fn(|i| names[i].trim().to_string());
        Ok(Self { names })
    }

    fn from_strs(names: [&str; 7]) -> Self {
        Self {
            names: names.map(String::from),
        }
    }

    /// Canonical labels in calendar order.
    pub fn names(&self) -> &[String; 7] {
        &self.names
    }

    /// Position (0 = Monday) of a label, ignoring case and surrounding whitespace.
    pub fn position(&self, label: &str) -> Option<usize> {
        let label = label.trim();
        self.names
            .iter()
            .position(|name| name == label || name.to_lowercase() == label.to_lowercase())
    }
}

impl Default for WeekdayNames {
    fn default() -> Self {
        Self::portuguese()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(uf: &str, mortos: &str) -> RawRecord {
        RawRecord {
            uf: Some(uf.to_string()),
            mortos: Some(mortos.to_string()),
            ..RawRecord::default()
        }
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(Some("3")), 3);
        assert_eq!(parse_count(Some(" 12 ")), 12);
        assert_eq!(parse_count(Some("2.0")), 2);
        assert_eq!(parse_count(Some("4abc")), 4);
        assert_eq!(parse_count(Some("abc")), 0);
        assert_eq!(parse_count(Some("-1")), 0);
        assert_eq!(parse_count(Some("")), 0);
        assert_eq!(parse_count(None), 0);
        assert_eq!(parse_count(Some("99999999999999999999999")), 0);
    }

    #[test]
    fn test_record_defaults() {
        let record = AccidentRecord::from(RawRecord::default());
        assert_eq!(record.region, UNKNOWN_REGION);
        assert_eq!(record.deaths, 0);
        for dimension in Dimension::ALL {
            assert_eq!(record.label(dimension), UNKNOWN_LABEL);
        }
    }

    #[test]
    fn test_blank_region_is_unknown() {
        let record = AccidentRecord::from(raw("   ", "1"));
        assert_eq!(record.region, UNKNOWN_REGION);
        assert_eq!(record.deaths, 1);
    }

    #[test]
    fn test_non_numeric_deaths_is_zero() {
        let record = AccidentRecord::from(raw("SP", "n/a"));
        assert_eq!(record.region, "SP");
        assert_eq!(record.deaths, 0);
    }

    #[test]
    fn test_labels_are_trimmed() {
        let record = AccidentRecord::new(" MG ").with_label(Dimension::Cause, "  Velocidade ");
        assert_eq!(record.region, "MG");
        assert_eq!(record.cause, "Velocidade");

        let blank = AccidentRecord::new("MG").with_label(Dimension::Phase, " ");
        assert_eq!(blank.phase, UNKNOWN_LABEL);
    }

    #[test]
    fn test_totals_add_assign() {
        let mut a = Totals {
            accidents: 1,
            deaths: 2,
            severe_injuries: 3,
            minor_injuries: 4,
            unharmed: 5,
        };
        a += a;
        assert_eq!(a.accidents, 2);
        assert_eq!(a.unharmed, 10);
    }

    #[test]
    fn test_share_and_fatality_rate() {
        assert_eq!(share(1, 4), 25.0);
        assert_eq!(share(3, 0), 0.0);

        let totals = Totals {
            accidents: 200,
            deaths: 5,
            ..Totals::default()
        };
        assert_eq!(totals.fatality_rate(), 2.5);
    }

    #[test]
    fn test_weekday_position() {
        let names = WeekdayNames::portuguese();
        assert_eq!(names.position("segunda-feira"), Some(0));
        assert_eq!(names.position(" Sábado "), Some(5));
        assert_eq!(names.position("DOMINGO"), Some(6));
        assert_eq!(names.position("Monday"), None);

        assert_eq!(WeekdayNames::english().position("monday"), Some(0));
    }

    #[test]
    fn test_custom_weekdays() {
        let names: Vec<String> = ["lun", "mar", "mer", "jeu", "ven", "sam", "dim"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let custom = WeekdayNames::custom(&names).unwrap();
        assert_eq!(custom.names()[6], "dim");

        assert!(WeekdayNames::custom(&names[..6]).is_err());
    }

    #[test]
    fn test_totals_serde_names() {
        let json = serde_json::to_string(&Totals::default()).unwrap();
        assert_eq!(
            json,
            r#"{"total_acidentes":0,"total_mortos":0,"total_feridos_graves":0,"total_feridos_leves":0,"total_ilesos":0}"#
        );
    }
}
