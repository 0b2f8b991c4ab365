use std::collections::HashSet;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::{ColumnSelector, Table};
use crate::normalize::extract_numeric_id;

/// Application status written when a person has a registration on file.
pub const SUBMITTED: &str = "подано";
/// Review status written alongside [`SUBMITTED`].
pub const UNDER_REVIEW: &str = "на рассмотрении";

/// Roster status column names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusColumns {
    /// "Анкета": application status.
    pub application: String,
    /// "Win2024": review status.
    pub review: String,
    /// "New Application": mirrors `application`, overridden by canonical-id matches.
    pub new_application: String,
}

impl Default for StatusColumns {
    fn default() -> Self {
        Self {
            application: "Анкета".into(),
            review: "Win2024".into(),
            new_application: "New Application".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Column-pair join
// ---------------------------------------------------------------------------

/// A roster column joined against an individual column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ColumnPair {
    pub roster: String,
    pub individual: ColumnSelector,
}

#[derive(Debug, Clone)]
pub struct ColumnPairOutcome {
    /// Every roster row, in order, with both status columns set.
    pub roster: Table,
    /// Roster rows that found a partner.
    pub matched: usize,
    pub matched_individuals: Table,
    /// Individuals with no roster partner; left for fuzzy matching.
    pub unmatched_individuals: Table,
}

/// Left join of the roster onto individuals over `pairs`.
///
/// Each roster row with at least one partner gets `application = подано` and
/// `review = на рассмотрении`; every other row gets empty strings. Roster rows
/// are never duplicated or dropped. Rows with a null in any key column never join.
pub fn compare_and_mark(
    roster: &Table,
    individuals: &Table,
    pairs: &[ColumnPair],
    status: &StatusColumns,
) -> Result<ColumnPairOutcome, ReconError> {
    if pairs.is_empty() {
        return Err(ReconError::ConfigValidation(
            "column-pair join needs at least one pair".into(),
        ));
    }

    let roster_cols: Vec<usize> = pairs
        .iter()
        .map(|p| roster.require_column("roster", &p.roster))
        .collect::<Result<_, _>>()?;
    let individual_cols: Vec<usize> = pairs
        .iter()
        .map(|p| individuals.resolve("individuals", &p.individual))
        .collect::<Result<_, _>>()?;

    let key_of = |row: &[Option<String>], cols: &[usize]| -> Option<Vec<String>> {
        cols.iter().map(|&c| row[c].clone()).collect()
    };
    let individual_keys: Vec<Option<Vec<String>>> = individuals
        .rows
        .iter()
        .map(|row| key_of(row, &individual_cols))
        .collect();
    let roster_keys: Vec<Option<Vec<String>>> = roster
        .rows
        .iter()
        .map(|row| key_of(row, &roster_cols))
        .collect();
    let partners: HashSet<&Vec<String>> = individual_keys.iter().flatten().collect();
    let roster_set: HashSet<&Vec<String>> = roster_keys.iter().flatten().collect();

    let mut out = roster.clone();
    let application = out.ensure_column(&status.application);
    let review = out.ensure_column(&status.review);

    let mut matched = 0;
    for (i, key) in roster_keys.iter().enumerate() {
        let hit = key.as_ref().is_some_and(|k| partners.contains(k));
        if hit {
            matched += 1;
        }
        out.set(i, application, Some(if hit { SUBMITTED } else { "" }.to_string()));
        out.set(i, review, Some(if hit { UNDER_REVIEW } else { "" }.to_string()));
    }

    let (matched_rows, unmatched_rows): (Vec<usize>, Vec<usize>) = (0..individuals.len())
        .partition(|&i| {
            individual_keys[i]
                .as_ref()
                .is_some_and(|k| roster_set.contains(k))
        });

    info!(
        "column-pair join: {matched} of {} roster rows matched; {} individuals without a roster partner",
        roster.len(),
        unmatched_rows.len()
    );
    Ok(ColumnPairOutcome {
        roster: out,
        matched,
        matched_individuals: individuals.select_rows(&matched_rows),
        unmatched_individuals: individuals.select_rows(&unmatched_rows),
    })
}

// ---------------------------------------------------------------------------
// Canonical-id match
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CanonicalIdOutcome {
    /// Full roster with `new_application` refreshed.
    pub roster: Table,
    /// Roster rows whose canonical id no individual carries.
    pub unmatched_roster: Table,
    /// Individuals whose canonical id appears in the roster.
    pub matched_individuals: Table,
    /// Individuals with no roster counterpart (including those with no digits in their id).
    pub unmatched_individuals: Table,
}

/// Match on the digits-only token of the roster id and the individual id field.
///
/// `new_application` starts as a copy of `application` and is overwritten with
/// [`SUBMITTED`] for matched roster rows. Empty canonical ids never match.
pub fn match_canonical_ids(
    roster: &Table,
    individuals: &Table,
    roster_id: &str,
    individual_id: &ColumnSelector,
    status: &StatusColumns,
) -> Result<CanonicalIdOutcome, ReconError> {
    let roster_id_col = roster.require_column("roster", roster_id)?;
    let individual_id_col = individuals.resolve("individuals", individual_id)?;

    let canonical = |cell: Option<&str>| -> Option<String> {
        let id = extract_numeric_id(cell.unwrap_or(""));
        (!id.is_empty()).then_some(id)
    };

    let individual_ids: Vec<Option<String>> = (0..individuals.len())
        .map(|i| canonical(individuals.cell(i, individual_id_col)))
        .collect();
    let roster_ids: Vec<Option<String>> = (0..roster.len())
        .map(|i| canonical(roster.cell(i, roster_id_col)))
        .collect();

    let individual_set: HashSet<&str> = individual_ids.iter().flatten().map(String::as_str).collect();
    let roster_set: HashSet<&str> = roster_ids.iter().flatten().map(String::as_str).collect();

    let mut out = roster.clone();
    let prior = out.column_index(&status.application);
    let new_app = out.ensure_column(&status.new_application);

    let mut unmatched_roster_rows = Vec::new();
    for (i, id) in roster_ids.iter().enumerate() {
        let hit = id.as_deref().is_some_and(|id| individual_set.contains(id));
        let value = if hit {
            Some(SUBMITTED.to_string())
        } else {
            unmatched_roster_rows.push(i);
            prior.and_then(|c| roster.rows[i][c].clone())
        };
        out.set(i, new_app, value);
    }

    let (matched_rows, unmatched_rows): (Vec<usize>, Vec<usize>) = (0..individuals.len())
        .partition(|&i| {
            individual_ids[i]
                .as_deref()
                .is_some_and(|id| roster_set.contains(id))
        });

    info!(
        "canonical-id match: {} roster rows updated, {} without registration; {} individuals matched, {} unmatched",
        roster.len() - unmatched_roster_rows.len(),
        unmatched_roster_rows.len(),
        matched_rows.len(),
        unmatched_rows.len()
    );

    Ok(CanonicalIdOutcome {
        unmatched_roster: roster.select_rows(&unmatched_roster_rows),
        matched_individuals: individuals.select_rows(&matched_rows),
        unmatched_individuals: individuals.select_rows(&unmatched_rows),
        roster: out,
    })
}

// ---------------------------------------------------------------------------
// Household sync
// ---------------------------------------------------------------------------

/// Propagate [`SUBMITTED`] to every row of a household (`group_column`) in which
/// any row already has it. Blank group codes are not treated as a household.
///
/// Returns the number of rows changed; a second run returns 0.
pub fn sync_household_status(
    roster: &mut Table,
    group_column: &str,
    status_column: &str,
) -> Result<usize, ReconError> {
    let group = roster.require_column("roster", group_column)?;
    let status = roster.require_column("roster", status_column)?;

    let group_key = |row: &[Option<String>]| -> Option<String> {
        row[group]
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
    };

    let submitted: HashSet<String> = roster
        .rows
        .iter()
        .filter(|row| row[status].as_deref() == Some(SUBMITTED))
        .filter_map(|row| group_key(row))
        .collect();

    let mut changed = 0;
    for row in &mut roster.rows {
        if row[status].as_deref() == Some(SUBMITTED) {
            continue;
        }
        if group_key(row).is_some_and(|g| submitted.contains(&g)) {
            row[status] = Some(SUBMITTED.to_string());
            changed += 1;
        }
    }

    info!(
        "household sync: {changed} rows set to '{SUBMITTED}' across {} households",
        submitted.len()
    );
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(columns: &[&str], rows: &[&[&str]]) -> Table {
        let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for r in rows {
            table.push_row(
                r.iter()
                    .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                    .collect(),
            );
        }
        table
    }

    #[test]
    fn canonical_id_marks_submitted_and_partitions() {
        let roster = t(
            &["id", "ut", "Анкета"],
            &[&["UA-00231", "H1", ""], &["UA-00500", "H2", "подано ранее"], &["UA-", "H3", ""]],
        );
        let individuals = t(&["doc"], &[&["00231"], &["FX999"], &[""]]);
        let status = StatusColumns::default();

        let out =
            match_canonical_ids(&roster, &individuals, "id", &"doc".into(), &status).unwrap();

        assert_eq!(out.roster.value(0, "New Application"), Some(SUBMITTED));
        // unmatched rows keep a copy of their prior application status
        assert_eq!(out.roster.value(1, "New Application"), Some("подано ранее"));
        assert_eq!(out.roster.value(2, "New Application"), None);
        assert_eq!(out.unmatched_roster.len(), 2);
        assert_eq!(out.matched_individuals.len(), 1);
        assert_eq!(out.unmatched_individuals.len(), 2);
        assert_eq!(
            out.matched_individuals.len() + out.unmatched_individuals.len(),
            individuals.len()
        );
        // no derived id column leaks into output
        assert_eq!(out.roster.columns, vec!["id", "ut", "Анкета", "New Application"]);
    }

    #[test]
    fn canonical_id_requires_roster_id_column() {
        let roster = t(&["code"], &[&["1"]]);
        let individuals = t(&["doc"], &[&["1"]]);
        let err = match_canonical_ids(
            &roster,
            &individuals,
            "id",
            &"doc".into(),
            &StatusColumns::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReconError::MissingColumn { .. }));
    }

    #[test]
    fn column_pairs_keep_every_roster_row() {
        let roster = t(
            &["Passport", "Surname"],
            &[&["FX1", "Коваль"], &["FX2", "Бондар"], &["", "Мельник"]],
        );
        let individuals = t(&["0", "1"], &[&["FX1", "x"], &["FX1", "y"], &["", "z"], &["FX9", "w"]]);
        let pairs = vec![ColumnPair { roster: "Passport".into(), individual: 0.into() }];

        let out = compare_and_mark(&roster, &individuals, &pairs, &StatusColumns::default()).unwrap();
        assert_eq!(out.roster.len(), 3);
        assert_eq!(out.matched, 1);
        assert_eq!(out.roster.value(0, "Анкета"), Some(SUBMITTED));
        assert_eq!(out.roster.value(0, "Win2024"), Some(UNDER_REVIEW));
        assert_eq!(out.roster.value(1, "Анкета"), Some(""));
        // null keys never join, even against null partners
        assert_eq!(out.roster.value(2, "Анкета"), Some(""));
        assert_eq!(out.matched_individuals.len(), 2);
        assert_eq!(out.unmatched_individuals.len(), 2);
        assert_eq!(out.unmatched_individuals.cell(1, 0), Some("FX9"));
    }

    #[test]
    fn column_pairs_check_schema_before_joining() {
        let roster = t(&["Passport"], &[&["FX1"]]);
        let individuals = t(&["0"], &[&["FX1"]]);
        let bad_roster = vec![ColumnPair { roster: "Паспорт".into(), individual: 0.into() }];
        let bad_individual = vec![ColumnPair { roster: "Passport".into(), individual: 4.into() }];
        let status = StatusColumns::default();
        assert!(compare_and_mark(&roster, &individuals, &bad_roster, &status).is_err());
        assert!(compare_and_mark(&roster, &individuals, &bad_individual, &status).is_err());
        assert!(compare_and_mark(&roster, &individuals, &[], &status).is_err());
    }

    #[test]
    fn household_sync_is_idempotent() {
        let mut roster = t(
            &["ut", "New Application"],
            &[
                &["H1", "подано"],
                &["H1", ""],
                &["H2", ""],
                &["", "подано"],
                &["", ""],
                &["H1", "інше"],
            ],
        );
        let changed = sync_household_status(&mut roster, "ut", "New Application").unwrap();
        assert_eq!(changed, 2);
        assert_eq!(roster.value(1, "New Application"), Some(SUBMITTED));
        assert_eq!(roster.value(5, "New Application"), Some(SUBMITTED));
        assert_eq!(roster.value(2, "New Application"), None);
        // blank households do not spread status
        assert_eq!(roster.value(4, "New Application"), None);

        let snapshot = roster.clone();
        assert_eq!(sync_household_status(&mut roster, "ut", "New Application").unwrap(), 0);
        assert_eq!(roster, snapshot);
    }
}
