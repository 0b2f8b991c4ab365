use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ReconError;
use crate::model::Cell;

/// The vocabulary table that ships with the engine.
pub const BUILTIN_VALUE_MAPS: &str = include_str!("../value-maps.toml");

/// Highest value-map document version this build understands.
pub const VALUE_MAPS_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ValueMapsFile {
    version: u32,
    #[serde(default)]
    columns: Vec<ColumnMapFile>,
}

#[derive(Debug, Deserialize)]
struct ColumnMapFile {
    position: String,
    #[serde(default)]
    field: Option<String>,
    entries: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// Mapper
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ColumnMap {
    field: Option<String>,
    /// (cleaned source key, roster value), in file order.
    entries: Vec<(String, String)>,
}

/// Translates raw source-language categorical values into roster vocabulary,
/// per source column.
#[derive(Debug, Clone, Default)]
pub struct ValueMapper {
    version: u32,
    columns: HashMap<usize, ColumnMap>,
}

impl ValueMapper {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let file: ValueMapsFile =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;

        if file.version == 0 || file.version > VALUE_MAPS_VERSION {
            return Err(ReconError::ConfigValidation(format!(
                "value maps version {} is not supported (expected {VALUE_MAPS_VERSION})",
                file.version
            )));
        }

        let mut columns = HashMap::new();
        for column in file.columns {
            let position: usize = column.position.trim().parse().map_err(|_| {
                ReconError::ConfigValidation(format!(
                    "value maps: position '{}' is not a column number",
                    column.position
                ))
            })?;

            let mut entries = Vec::with_capacity(column.entries.len());
            for (from, to) in column.entries {
                let key = clean(&from);
                // An empty key would be a substring of every value.
                if key.is_empty() {
                    return Err(ReconError::ConfigValidation(format!(
                        "value maps: column {position} has an empty source key"
                    )));
                }
                entries.push((key, to));
            }

            if columns
                .insert(position, ColumnMap { field: column.field, entries })
                .is_some()
            {
                return Err(ReconError::ConfigValidation(format!(
                    "value maps: column {position} is declared twice"
                )));
            }
        }

        Ok(Self { version: file.version, columns })
    }

    /// Mapper over the built-in vocabulary.
    pub fn builtin() -> Result<Self, ReconError> {
        Self::from_toml(BUILTIN_VALUE_MAPS)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Logical field name declared for a source column, if any.
    pub fn field_name(&self, position: usize) -> Option<&str> {
        self.columns.get(&position).and_then(|c| c.field.as_deref())
    }

    /// Translate `raw` for the given source column.
    ///
    /// Exact match on the cleaned value, else the first key contained in it,
    /// else `raw` unchanged.
    pub fn map<'a>(&'a self, position: usize, raw: &'a str) -> &'a str {
        let Some(column) = self.columns.get(&position) else {
            return raw;
        };
        let cleaned = clean(raw);

        if let Some((_, to)) = column.entries.iter().find(|(key, _)| *key == cleaned) {
            return to;
        }
        if let Some((_, to)) = column.entries.iter().find(|(key, _)| cleaned.contains(key.as_str())) {
            return to;
        }
        raw
    }

    pub fn map_cell(&self, position: usize, cell: &Cell) -> Cell {
        cell.as_deref().map(|raw| self.map(position, raw).to_string())
    }
}

fn clean(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_parses() {
        let mapper = ValueMapper::builtin().unwrap();
        assert_eq!(mapper.version(), 1);
        assert_eq!(mapper.field_name(4), Some("city"));
        assert_eq!(mapper.field_name(10), Some("document_type"));
    }

    #[test]
    fn exact_match_ignores_case_and_padding() {
        let mapper = ValueMapper::builtin().unwrap();
        assert_eq!(mapper.map(10, "Закордонний Паспорт"), "International Passport");
        assert_eq!(mapper.map(9, "  Жіноча "), "Female");
    }

    #[test]
    fn substring_fallback() {
        let mapper = ValueMapper::builtin().unwrap();
        assert_eq!(mapper.map(4, "тбілісі заможний район"), "Tbilisi");
        assert_eq!(mapper.map(4, "м. Батумі, вул. Руставелі"), "Batumi");
    }

    #[test]
    fn first_declared_key_wins_on_substring() {
        let mapper = ValueMapper::from_toml(
            r#"
version = 1
[[columns]]
position = "15"
entries = [["пенсіонер", "E"], ["інвалідн", "D"]]
"#,
        )
        .unwrap();
        assert_eq!(mapper.map(15, "Особа з інвалідністю, пенсіонер"), "E");
    }

    #[test]
    fn unknown_values_and_columns_pass_through() {
        let mapper = ValueMapper::builtin().unwrap();
        assert_eq!(mapper.map(4, "Шекветілі"), "Шекветілі");
        assert_eq!(mapper.map(11, "FX123456"), "FX123456");
        assert_eq!(mapper.map_cell(4, &None), None);
    }

    #[test]
    fn zero_padded_positions_name_the_same_column() {
        let mapper = ValueMapper::from_toml(
            r#"
version = 1
[[columns]]
position = "07"
entries = [["коваль", "Koval"]]
"#,
        )
        .unwrap();
        assert_eq!(mapper.map(7, "Коваль"), "Koval");
        assert_eq!(mapper.map(70, "Коваль"), "Коваль");
    }

    #[test]
    fn rejects_non_numeric_position() {
        let err = ValueMapper::from_toml(
            r#"
version = 1
[[columns]]
position = "city"
entries = [["a", "A"]]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a column number"));
    }

    #[test]
    fn rejects_empty_key() {
        let err = ValueMapper::from_toml(
            r#"
version = 1
[[columns]]
position = "4"
entries = [["  ", "Nowhere"]]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty source key"));
    }

    #[test]
    fn rejects_future_version() {
        let err = ValueMapper::from_toml("version = 2").unwrap_err();
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn rejects_duplicate_column() {
        let err = ValueMapper::from_toml(
            r#"
version = 1
[[columns]]
position = "4"
entries = [["a", "A"]]
[[columns]]
position = " 04"
entries = [["b", "B"]]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }
}
