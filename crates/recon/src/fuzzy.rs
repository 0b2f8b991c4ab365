//! Cascading phone / birth-date matching for individuals with no exact-key match.
//!
//! Stage A links on the phone key (last six characters), stage B on the ISO
//! birth date. Within a stage the first hit on a key links every remaining
//! pool row sharing that key to every roster row carrying it, then the key is
//! closed, so a household arrives together and is never linked twice.
//!
//! Matched output is in emission order (grouped by key), not input order.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::{ColumnSelector, Table};
use crate::normalize::{parse_day_first_date, parse_roster_date, phone_key, to_iso};

/// Provenance column appended to matched rows.
pub const MATCHED_BY_COLUMN: &str = "Matched By";

/// Column names on both sides of the fuzzy match. Individual columns default
/// to the positional layout written by the unpivot stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FuzzyColumns {
    pub roster_birth_date: String,
    pub roster_phone: String,
    pub roster_group: String,
    pub roster_surname: String,
    pub roster_name: String,
    pub roster_id: String,
    pub birth_date: ColumnSelector,
    pub phone: ColumnSelector,
}

impl Default for FuzzyColumns {
    fn default() -> Self {
        Self {
            roster_birth_date: "Date of birth".into(),
            roster_phone: "georgian phone".into(),
            roster_group: "ut".into(),
            roster_surname: "Surname".into(),
            roster_name: "Name".into(),
            roster_id: "id".into(),
            birth_date: ColumnSelector::Position(12),
            phone: ColumnSelector::Position(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MatchedBy {
    Phone(String),
    DateOfBirth(String),
}

impl fmt::Display for MatchedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phone(key) => write!(f, "Phone: {key}"),
            Self::DateOfBirth(date) => write!(f, "Date of birth: {date}"),
        }
    }
}

/// One emitted link: pool row `source` paired with roster row `roster`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchLink {
    pub source: usize,
    pub roster: usize,
    pub roster_id: Option<String>,
    pub matched_by: MatchedBy,
}

#[derive(Debug, Clone)]
pub struct StageOutput {
    /// One row per link, in emission order.
    pub matched: Table,
    pub unmatched: Table,
    pub links: Vec<MatchLink>,
    /// Pool row indices left for the next stage, in input order.
    pub unmatched_rows: Vec<usize>,
}

impl StageOutput {
    /// Distinct pool rows that produced at least one link.
    pub fn matched_sources(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.links
            .iter()
            .filter(|l| seen.insert(l.source))
            .map(|l| l.source)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct FuzzyOutcome {
    pub phone: StageOutput,
    pub date: StageOutput,
    /// `date.unmatched` with the group column backfilled where a stage-B match shares the phone key.
    pub final_unmatched: Table,
    pub backfilled: usize,
}

struct Candidate {
    phone_key: Option<String>,
    birth_date: Option<String>,
}

fn by_phone(c: &Candidate) -> Option<&str> {
    c.phone_key.as_deref()
}

fn by_birth_date(c: &Candidate) -> Option<&str> {
    c.birth_date.as_deref()
}

struct RosterSide<'a> {
    table: &'a Table,
    phone: usize,
    group: usize,
    surname: usize,
    name: usize,
    id: usize,
    by_phone: HashMap<String, Vec<usize>>,
    by_birth_date: HashMap<String, Vec<usize>>,
}

impl<'a> RosterSide<'a> {
    fn index(table: &'a Table, cols: &FuzzyColumns) -> Result<Self, ReconError> {
        let birth_date = table.require_column("roster", &cols.roster_birth_date)?;
        let phone = table.require_column("roster", &cols.roster_phone)?;
        let group = table.require_column("roster", &cols.roster_group)?;
        let surname = table.require_column("roster", &cols.roster_surname)?;
        let name = table.require_column("roster", &cols.roster_name)?;
        let id = table.require_column("roster", &cols.roster_id)?;

        let mut by_phone: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_birth_date: HashMap<String, Vec<usize>> = HashMap::new();
        for r in 0..table.len() {
            if let Some(key) = table.cell(r, phone).and_then(phone_key) {
                by_phone.entry(key).or_default().push(r);
            }
            if let Some(date) = table.cell(r, birth_date).and_then(parse_roster_date) {
                by_birth_date.entry(to_iso(date)).or_default().push(r);
            }
        }
        debug!(
            "roster index: {} phone keys, {} birth dates",
            by_phone.len(),
            by_birth_date.len()
        );

        Ok(Self { table, phone, group, surname, name, id, by_phone, by_birth_date })
    }
}

/// Run both stages and the final `ut` reconciliation over `pool`.
///
/// Every output table carries the pool's birth-date column rewritten to ISO
/// (null when unparsable). Blank phones and unparsable dates never match.
pub fn cascade(roster: &Table, pool: &Table, cols: &FuzzyColumns) -> Result<FuzzyOutcome, ReconError> {
    let side = RosterSide::index(roster, cols)?;
    let birth_col = pool.resolve("unmatched individuals", &cols.birth_date)?;
    let phone_col = pool.resolve("unmatched individuals", &cols.phone)?;

    let mut normalized = pool.clone();
    let mut unparsable = 0;
    let candidates: Vec<Candidate> = (0..pool.len())
        .map(|i| {
            let raw = pool.cell(i, birth_col);
            let birth_date = raw.and_then(parse_day_first_date).map(to_iso);
            if birth_date.is_none() && raw.is_some_and(|s| !s.trim().is_empty()) {
                unparsable += 1;
                debug!("row {i}: unparsable birth date {:?}", raw.unwrap_or_default());
            }
            normalized.set(i, birth_col, birth_date.clone());
            Candidate {
                phone_key: pool.cell(i, phone_col).and_then(phone_key),
                birth_date,
            }
        })
        .collect();
    if unparsable > 0 {
        warn!("{unparsable} birth dates could not be parsed and will not match");
    }

    let all: Vec<usize> = (0..pool.len()).collect();

    let phone_links = link_stage(&side, &all, &candidates, by_phone, &side.by_phone, |k| {
        MatchedBy::Phone(k.to_string())
    });
    let phone = finish_stage(&normalized, &side, phone_col, phone_links);

    let date_links = link_stage(
        &side,
        &phone.unmatched_rows,
        &candidates,
        by_birth_date,
        &side.by_birth_date,
        |k| MatchedBy::DateOfBirth(k.to_string()),
    );
    let date = finish_stage(&normalized, &side, phone_col, date_links);

    // ut of the first stage-B link per source phone key
    let mut backfill: HashMap<&str, Option<&str>> = HashMap::new();
    for link in &date.links {
        if let Some(key) = candidates[link.source].phone_key.as_deref() {
            backfill
                .entry(key)
                .or_insert_with(|| roster.cell(link.roster, side.group));
        }
    }

    let mut final_unmatched = date.unmatched.clone();
    let group_out = final_unmatched.ensure_column(&roster.columns[side.group]);
    let mut backfilled = 0;
    for (out_row, &src) in date.unmatched_rows.iter().enumerate() {
        let key = candidates[src].phone_key.as_deref();
        if let Some(ut) = key.and_then(|k| backfill.get(k).copied()) {
            final_unmatched.set(out_row, group_out, ut.map(str::to_string));
            backfilled += 1;
        }
    }

    info!(
        "fuzzy match: {} rows in pool; phone stage {} links ({} rows), date stage {} links ({} rows); {} left, {} with ut backfilled",
        pool.len(),
        phone.links.len(),
        phone.matched_sources().len(),
        date.links.len(),
        date.matched_sources().len(),
        date.unmatched_rows.len(),
        backfilled
    );

    Ok(FuzzyOutcome { phone, date, final_unmatched, backfilled })
}

/// Link the pool rows in `rows` on `key`, closing each key after its first hit.
/// Returns the links and the rows left unmatched, both in encounter order.
fn link_stage(
    side: &RosterSide<'_>,
    rows: &[usize],
    candidates: &[Candidate],
    key: fn(&Candidate) -> Option<&str>,
    index: &HashMap<String, Vec<usize>>,
    provenance: impl Fn(&str) -> MatchedBy,
) -> (Vec<MatchLink>, Vec<usize>) {
    let mut households: HashMap<&str, Vec<usize>> = HashMap::new();
    for &r in rows {
        if let Some(k) = key(&candidates[r]) {
            households.entry(k).or_default().push(r);
        }
    }

    let mut closed: HashSet<&str> = HashSet::new();
    let mut links = Vec::new();
    let mut unmatched = Vec::new();

    for &r in rows {
        let Some(k) = key(&candidates[r]) else {
            unmatched.push(r);
            continue;
        };
        if closed.contains(k) {
            continue;
        }
        let Some(roster_rows) = index.get(k) else {
            unmatched.push(r);
            continue;
        };
        for &source in &households[k] {
            for &roster in roster_rows {
                links.push(MatchLink {
                    source,
                    roster,
                    roster_id: side.table.cell(roster, side.id).map(str::to_string),
                    matched_by: provenance(k),
                });
            }
        }
        closed.insert(k);
    }

    (links, unmatched)
}

fn finish_stage(
    normalized: &Table,
    side: &RosterSide<'_>,
    phone_col: usize,
    (links, unmatched_rows): (Vec<MatchLink>, Vec<usize>),
) -> StageOutput {
    let roster = side.table;
    let mut matched = Table::new(normalized.columns.clone());
    let group = matched.ensure_column(&roster.columns[side.group]);
    let surname = matched.ensure_column(&roster.columns[side.surname]);
    let name = matched.ensure_column(&roster.columns[side.name]);
    let matched_by = matched.ensure_column(MATCHED_BY_COLUMN);

    for link in &links {
        let mut row = normalized.rows[link.source].clone();
        row.resize(matched.width(), None);
        row[group] = roster.rows[link.roster][side.group].clone();
        row[surname] = roster.rows[link.roster][side.surname].clone();
        row[name] = roster.rows[link.roster][side.name].clone();
        row[phone_col] = roster.rows[link.roster][side.phone].clone();
        row[matched_by] = Some(link.matched_by.to_string());
        matched.rows.push(row);
    }

    StageOutput {
        unmatched: normalized.select_rows(&unmatched_rows),
        matched,
        links,
        unmatched_rows,
    }
}
