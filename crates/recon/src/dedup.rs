use std::collections::{HashMap, HashSet};

use log::info;
use serde::Serialize;

use crate::error::ReconError;
use crate::model::{Cell, ColumnSelector, Table};

/// Appended by mark mode: `TRUE` when the row repeats a value in any checked column.
pub const DUPLICATE_FLAG_COLUMN: &str = "Дубликат";
/// Appended by mark mode: `Колонка '<col>': <value>` per offending column, `; `-joined.
pub const DUPLICATE_DETAILS_COLUMN: &str = "Подробности дубля";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    pub removed: usize,
    pub remaining: usize,
}

fn resolve_all(table: &Table, selectors: &[ColumnSelector]) -> Result<Vec<usize>, ReconError> {
    selectors
        .iter()
        .map(|s| table.resolve("deduplication", s))
        .collect()
}

/// Flag every row whose value in any selected column is shared with another row.
///
/// Columns are checked independently. Nulls count as equal to each other.
/// Returns the number of flagged rows.
pub fn mark_duplicates(table: &mut Table, selectors: &[ColumnSelector]) -> Result<usize, ReconError> {
    let columns = resolve_all(table, selectors)?;

    let mut details: Vec<Vec<String>> = vec![Vec::new(); table.len()];
    for &col in &columns {
        let mut counts: HashMap<&Cell, usize> = HashMap::new();
        for row in &table.rows {
            *counts.entry(&row[col]).or_insert(0) += 1;
        }
        for (i, row) in table.rows.iter().enumerate() {
            if counts[&row[col]] > 1 {
                let value = row[col].as_deref().unwrap_or("");
                details[i].push(format!("Колонка '{}': {value}", table.columns[col]));
            }
        }
    }

    let flag_col = table.ensure_column(DUPLICATE_FLAG_COLUMN);
    let details_col = table.ensure_column(DUPLICATE_DETAILS_COLUMN);

    let mut flagged = 0;
    for (i, parts) in details.into_iter().enumerate() {
        let is_dup = !parts.is_empty();
        if is_dup {
            flagged += 1;
        }
        table.set(i, flag_col, Some(if is_dup { "TRUE" } else { "FALSE" }.to_string()));
        table.set(i, details_col, is_dup.then(|| parts.join("; ")));
    }

    info!("duplicates marked: {flagged} of {} rows", table.len());
    Ok(flagged)
}

/// Drop rows whose tuple over the selected columns was already seen, keeping
/// the first occurrence in row order.
pub fn remove_duplicates(
    table: &mut Table,
    selectors: &[ColumnSelector],
) -> Result<DedupReport, ReconError> {
    let columns = resolve_all(table, selectors)?;

    let before = table.len();
    let mut seen: HashSet<Vec<Cell>> = HashSet::with_capacity(before);
    table
        .rows
        .retain(|row| seen.insert(columns.iter().map(|&c| row[c].clone()).collect()));

    let report = DedupReport {
        removed: before - table.len(),
        remaining: table.len(),
    };
    info!(
        "duplicates removed: {}, rows remaining: {}",
        report.removed, report.remaining
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[[&str; 3]]) -> Table {
        let mut t = Table::positional(3);
        for r in rows {
            t.push_row(
                r.iter()
                    .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                    .collect(),
            );
        }
        t
    }

    #[test]
    fn remove_keeps_first_occurrence() {
        let mut t = table(&[
            ["a", "P1", "first"],
            ["b", "P2", "x"],
            ["c", "P1", "second"],
        ]);
        let report = remove_duplicates(&mut t, &[1.into()]).unwrap();
        assert_eq!(report, DedupReport { removed: 1, remaining: 2 });
        assert_eq!(t.cell(0, 2), Some("first"));
        assert_eq!(t.cell(1, 1), Some("P2"));
    }

    #[test]
    fn remove_compares_tuples() {
        let mut t = table(&[
            ["a", "P1", ""],
            ["a", "P2", ""],
            ["a", "P1", ""],
        ]);
        let report = remove_duplicates(&mut t, &[0.into(), 1.into()]).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn mark_accumulates_details_in_column_order() {
        let mut t = table(&[
            ["Коваль", "P1", ""],
            ["Коваль", "P1", ""],
            ["Бондар", "P2", ""],
        ]);
        let flagged = mark_duplicates(&mut t, &[1.into(), 0.into()]).unwrap();
        assert_eq!(flagged, 2);
        assert_eq!(t.value(0, DUPLICATE_FLAG_COLUMN), Some("TRUE"));
        assert_eq!(
            t.value(0, DUPLICATE_DETAILS_COLUMN),
            Some("Колонка '1': P1; Колонка '0': Коваль")
        );
        assert_eq!(t.value(2, DUPLICATE_FLAG_COLUMN), Some("FALSE"));
        assert_eq!(t.value(2, DUPLICATE_DETAILS_COLUMN), None);
        // mark mode never drops rows
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn mark_checks_columns_independently() {
        let mut t = table(&[
            ["a", "P1", ""],
            ["b", "P1", ""],
            ["a", "P2", ""],
        ]);
        mark_duplicates(&mut t, &[0.into(), 1.into()]).unwrap();
        assert_eq!(t.value(0, DUPLICATE_DETAILS_COLUMN), Some("Колонка '0': a; Колонка '1': P1"));
        assert_eq!(t.value(1, DUPLICATE_DETAILS_COLUMN), Some("Колонка '1': P1"));
        assert_eq!(t.value(2, DUPLICATE_DETAILS_COLUMN), Some("Колонка '0': a"));
    }

    #[test]
    fn unknown_selector_is_rejected() {
        let mut t = table(&[["a", "b", "c"]]);
        assert!(remove_duplicates(&mut t, &[7.into()]).is_err());
        assert!(mark_duplicates(&mut t, &["passport".into()]).is_err());
    }
}
