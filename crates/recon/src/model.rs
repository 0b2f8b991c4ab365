use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Cells + tables
// ---------------------------------------------------------------------------

/// One cell. `None` is a null (empty spreadsheet cell, missing source column).
pub type Cell = Option<String>;

/// A header row plus data rows, held fully in memory.
///
/// Every row is exactly `columns.len()` wide; `push_row` pads or truncates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    /// Build an empty table from a raw spreadsheet header, renaming repeated
    /// names to `name.1`, `name.2`, ...
    pub fn with_header(raw: Vec<String>) -> Self {
        Self::new(disambiguate_headers(raw))
    }

    /// Header-less table whose columns are named by position: "0", "1", ...
    pub fn positional(width: usize) -> Self {
        Self::new((0..width).map(|i| i.to_string()).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of a column that must exist.
    pub fn require_column(&self, context: &str, name: &str) -> Result<usize, ReconError> {
        self.column_index(name).ok_or_else(|| ReconError::MissingColumn {
            context: context.into(),
            column: name.into(),
        })
    }

    /// Resolve a selector (name or position) to a column index.
    pub fn resolve(&self, context: &str, selector: &ColumnSelector) -> Result<usize, ReconError> {
        match selector {
            ColumnSelector::Position(i) if *i < self.columns.len() => Ok(*i),
            ColumnSelector::Position(i) => Err(ReconError::MissingColumn {
                context: context.into(),
                column: format!("#{i} (table has {} columns)", self.columns.len()),
            }),
            ColumnSelector::Name(name) => self.require_column(context, name),
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col)).and_then(|c| c.as_deref())
    }

    /// Value of a named column in the given row; `None` when the column is absent or null.
    pub fn value(&self, row: usize, name: &str) -> Option<&str> {
        self.column_index(name).and_then(|col| self.cell(row, col))
    }

    pub fn set(&mut self, row: usize, col: usize, value: Cell) {
        if let Some(slot) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *slot = value;
        }
    }

    /// Index of `name`, appending it (filled with nulls) when absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    /// New table with the same header and the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Parse CSV text with a header row. Empty fields become nulls.
    pub fn from_csv_str(data: &str, delimiter: u8) -> Result<Table, ReconError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ReconError::Io(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut table = Table::with_header(headers);
        for record in reader.records() {
            let record = record.map_err(|e| ReconError::Io(e.to_string()))?;
            let row = record
                .iter()
                .map(|field| if field.is_empty() { None } else { Some(field.to_string()) })
                .collect();
            table.push_row(row);
        }
        Ok(table)
    }
}

/// Disambiguate repeated header names the way spreadsheet exports are read:
/// the second `X` becomes `X.1`, the third `X.2`, skipping names already taken.
/// Blank names become `Unnamed: <position>`.
pub fn disambiguate_headers(raw: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    raw.into_iter()
        .enumerate()
        .map(|(i, name)| {
            let mut col = if name.trim().is_empty() {
                format!("Unnamed: {i}")
            } else {
                name
            };
            let mut cur = counts.get(&col).copied().unwrap_or(0);
            while cur > 0 {
                counts.insert(col.clone(), cur + 1);
                col = format!("{col}.{cur}");
                cur = counts.get(&col).copied().unwrap_or(0);
            }
            counts.insert(col.clone(), cur + 1);
            col
        })
        .collect()
}

/// One named sheet of a workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub table: Table,
}

// ---------------------------------------------------------------------------
// Column selection
// ---------------------------------------------------------------------------

/// Picks a column by header name or by zero-based position.
///
/// In TOML, integers are positions and strings are names: `columns = [11, "id"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ColumnSelector {
    Position(usize),
    Name(String),
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position(i) => write!(f, "#{i}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

impl From<usize> for ColumnSelector {
    fn from(i: usize) -> Self {
        Self::Position(i)
    }
}

impl From<&str> for ColumnSelector {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}
