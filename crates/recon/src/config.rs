use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::exact::{ColumnPair, StatusColumns};
use crate::fuzzy::FuzzyColumns;
use crate::model::ColumnSelector;
use crate::new_records::{default_field_mapping, FieldMapping};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub source: SourceConfig,
    pub roster: RosterConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub exact: ExactConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub fuzzy: FuzzyConfig,
    #[serde(default)]
    pub new_records: NewRecordsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// The family workbook.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub file: String,
    /// Sheets to unpivot, in order. Empty means every sheet.
    #[serde(default)]
    pub sheets: Vec<String>,
}

/// The master roster ("General base").
#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
    pub file: String,
    #[serde(default = "default_roster_sheet")]
    pub sheet: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_group_column")]
    pub group_column: String,
    #[serde(default = "default_status_column")]
    pub status_column: String,
    #[serde(default = "default_review_column")]
    pub review_column: String,
    #[serde(default = "default_application_column")]
    pub application_column: String,
}

fn default_roster_sheet() -> String {
    "ua".into()
}

fn default_id_column() -> String {
    "id".into()
}

fn default_group_column() -> String {
    "ut".into()
}

fn default_status_column() -> String {
    StatusColumns::default().application
}

fn default_review_column() -> String {
    StatusColumns::default().review
}

fn default_application_column() -> String {
    StatusColumns::default().new_application
}

impl RosterConfig {
    pub fn status_columns(&self) -> StatusColumns {
        StatusColumns {
            application: self.status_column.clone(),
            review: self.review_column.clone(),
            new_application: self.application_column.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    #[default]
    Remove,
    Mark,
    Off,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    #[serde(default)]
    pub mode: DedupMode,
    #[serde(default = "default_dedup_columns")]
    pub columns: Vec<ColumnSelector>,
}

/// Document number of an unpivoted individual row.
fn default_dedup_columns() -> Vec<ColumnSelector> {
    vec![ColumnSelector::Position(11)]
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            mode: DedupMode::default(),
            columns: default_dedup_columns(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExactStrategy {
    #[default]
    CanonicalId,
    ColumnPairs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExactConfig {
    #[serde(default)]
    pub strategy: ExactStrategy,
    #[serde(default = "default_individual_id")]
    pub individual_id: ColumnSelector,
    #[serde(default)]
    pub pairs: Vec<ColumnPair>,
    /// Individuals file to read when unpivoting did not run in the same invocation.
    #[serde(default)]
    pub input: Option<String>,
}

fn default_individual_id() -> ColumnSelector {
    ColumnSelector::Position(11)
}

impl Default for ExactConfig {
    fn default() -> Self {
        Self {
            strategy: ExactStrategy::default(),
            individual_id: default_individual_id(),
            pairs: Vec::new(),
            input: None,
        }
    }
}

/// Household sync rewrites the updated roster in place.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FuzzyConfig {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(flatten)]
    pub columns: FuzzyColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRecordsConfig {
    #[serde(default = "default_field_mapping")]
    pub fields: Vec<FieldMapping>,
    /// Replacement for the built-in value maps.
    #[serde(default)]
    pub value_maps: Option<String>,
    /// Roster column order for new rows. Defaults to the roster header.
    #[serde(default)]
    pub schema: Option<Vec<String>>,
    #[serde(default)]
    pub input: Option<String>,
}

impl Default for NewRecordsConfig {
    fn default() -> Self {
        Self {
            fields: default_field_mapping(),
            value_maps: None,
            schema: None,
            input: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Xlsx,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_output_dir() -> String {
    "out".into()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: OutputFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl PipelineConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: PipelineConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }
        if self.source.file.trim().is_empty() {
            return Err(ReconError::ConfigValidation("source.file must not be empty".into()));
        }
        if self.roster.file.trim().is_empty() {
            return Err(ReconError::ConfigValidation("roster.file must not be empty".into()));
        }
        if self.roster.sheet.trim().is_empty() {
            return Err(ReconError::ConfigValidation("roster.sheet must not be empty".into()));
        }

        if self.dedup.mode != DedupMode::Off && self.dedup.columns.is_empty() {
            return Err(ReconError::ConfigValidation(
                "dedup.columns must name at least one column unless mode = \"off\"".into(),
            ));
        }

        if self.exact.strategy == ExactStrategy::ColumnPairs && self.exact.pairs.is_empty() {
            return Err(ReconError::ConfigValidation(
                "exact.strategy = \"column_pairs\" requires at least one entry in exact.pairs".into(),
            ));
        }

        let mut seen = HashSet::new();
        for mapping in &self.new_records.fields {
            if mapping.source_position.trim().parse::<usize>().is_err() {
                return Err(ReconError::ConfigValidation(format!(
                    "new_records.fields: '{}' maps from '{}', which is not a column number",
                    mapping.roster_field, mapping.source_position
                )));
            }
            if !seen.insert(mapping.roster_field.as_str()) {
                return Err(ReconError::ConfigValidation(format!(
                    "new_records.fields: roster field '{}' is mapped twice",
                    mapping.roster_field
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
