use log::info;
use serde::{Deserialize, Serialize};

use crate::exact::{StatusColumns, SUBMITTED, UNDER_REVIEW};
use crate::model::Table;
use crate::value_map::ValueMapper;

/// One roster field filled from a source column position.
///
/// In TOML the mapping is an ordered list of pairs: `["Surname", "7"]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct FieldMapping {
    pub roster_field: String,
    pub source_position: String,
}

impl From<(String, String)> for FieldMapping {
    fn from((roster_field, source_position): (String, String)) -> Self {
        Self { roster_field, source_position }
    }
}

impl From<FieldMapping> for (String, String) {
    fn from(m: FieldMapping) -> Self {
        (m.roster_field, m.source_position)
    }
}

impl FieldMapping {
    pub fn new(roster_field: &str, source_position: &str) -> Self {
        Self {
            roster_field: roster_field.into(),
            source_position: source_position.into(),
        }
    }
}

/// The mapping used when a pipeline declares none: person fields of an
/// unpivoted individual row into the roster's English headers.
pub fn default_field_mapping() -> Vec<FieldMapping> {
    [
        ("Surname", "7"),
        ("Name", "8"),
        ("Gender", "9"),
        ("Document type", "10"),
        ("Passport", "11"),
        ("Date of birth", "12"),
        ("Arrival date", "13"),
        ("Citizenship", "14"),
        ("Vulnerability", "15"),
        ("georgian phone", "3"),
        ("City", "4"),
    ]
    .into_iter()
    .map(|(field, pos)| FieldMapping::new(field, pos))
    .collect()
}

/// Promote still-unmatched individuals into roster-shaped rows.
///
/// Columns are `schema` in order, then any mapped field the schema lacks, then
/// the status columns if the schema lacks them. Unmapped fields, positions
/// beyond the source width and null source cells all become empty strings.
/// Every row is stamped `подано` / `на рассмотрении`.
pub fn build_new_records(
    unmatched: &Table,
    mapping: &[FieldMapping],
    schema: &[String],
    mapper: &ValueMapper,
    status: &StatusColumns,
) -> Table {
    let mut out = Table::new(schema.to_vec());
    let targets: Vec<(usize, Option<usize>)> = mapping
        .iter()
        .map(|m| {
            let target = out.ensure_column(&m.roster_field);
            let source = m
                .source_position
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&p| p < unmatched.width());
            (target, source)
        })
        .collect();
    let application = out.ensure_column(&status.application);
    let review = out.ensure_column(&status.review);

    for row in &unmatched.rows {
        let mut record: Vec<Option<String>> = vec![Some(String::new()); out.width()];
        for &(target, source) in &targets {
            let value = source
                .and_then(|p| row[p].as_deref().map(|raw| mapper.map(p, raw).to_string()))
                .unwrap_or_default();
            record[target] = Some(value);
        }
        record[application] = Some(SUBMITTED.to_string());
        record[review] = Some(UNDER_REVIEW.to_string());
        out.rows.push(record);
    }

    info!(
        "new records: {} rows, {} mapped fields (value maps v{})",
        out.len(),
        mapping.len(),
        mapper.version()
    );
    out
}
