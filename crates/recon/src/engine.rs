use std::collections::BTreeMap;
use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::{DedupConfig, DedupMode, ExactStrategy, PipelineConfig};
use crate::error::ReconError;
use crate::exact::{compare_and_mark, match_canonical_ids, sync_household_status};
use crate::fuzzy::{cascade, FuzzyOutcome};
use crate::model::{Sheet, Table};
use crate::new_records::build_new_records;
use crate::summary::{
    ExactSummary, FuzzySummary, NewRecordsSummary, RunSummary, SyncSummary, UnpivotSummary,
};
use crate::unpivot::FamilyProcessor;
use crate::value_map::ValueMapper;

// ---------------------------------------------------------------------------
// Output names (file stems in the output directory)
// ---------------------------------------------------------------------------

pub const PROCESSED_FAMILY_DATA: &str = "processed_family_data";
pub const ROSTER_UPDATED: &str = "roster_updated";
pub const ROSTER_COMPARED: &str = "roster_compared";
pub const UNMATCHED_ROSTER: &str = "unmatched_roster";
pub const UNMATCHED_INDIVIDUALS: &str = "unmatched_individuals";
pub const MATCHED_BY_PHONE: &str = "matched_by_phone";
pub const UNMATCHED_AFTER_PHONE: &str = "unmatched_after_phone";
pub const MATCHED_BY_DATE: &str = "matched_by_date";
pub const UNMATCHED_AFTER_DATE: &str = "unmatched_after_date";
pub const FINAL_UNMATCHED: &str = "final_unmatched";
pub const NEW_ROSTER_RECORDS: &str = "new_roster_records";

// ---------------------------------------------------------------------------
// Stage selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Unpivot,
    ExactMatch,
    HouseholdSync,
    FuzzyMatch,
    NewRecords,
}

impl Stage {
    /// Every stage, in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::Unpivot,
        Stage::ExactMatch,
        Stage::HouseholdSync,
        Stage::FuzzyMatch,
        Stage::NewRecords,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unpivot => write!(f, "unpivot"),
            Self::ExactMatch => write!(f, "exact_match"),
            Self::HouseholdSync => write!(f, "household_sync"),
            Self::FuzzyMatch => write!(f, "fuzzy_match"),
            Self::NewRecords => write!(f, "new_records"),
        }
    }
}

/// The stages to run, always held in pipeline order without repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSelection {
    stages: Vec<Stage>,
}

impl StageSelection {
    pub fn all() -> Self {
        Self { stages: Stage::ALL.to_vec() }
    }

    pub fn only(stages: impl IntoIterator<Item = Stage>) -> Self {
        let mut stages: Vec<Stage> = stages.into_iter().collect();
        stages.sort();
        stages.dedup();
        Self { stages }
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

impl Default for StageSelection {
    fn default() -> Self {
        Self::all()
    }
}

// ---------------------------------------------------------------------------
// Workspace seam
// ---------------------------------------------------------------------------

/// Where the driver reads inputs and writes stage outputs.
pub trait Workspace {
    /// Sheets of the family workbook, in workbook order.
    fn family_sheets(&mut self) -> Result<Vec<Sheet>, ReconError>;
    fn roster(&mut self) -> Result<Table, ReconError>;
    fn value_maps(&mut self) -> Result<ValueMapper, ReconError>;
    /// A table written by an earlier run under `name`, or the file at `path` when given.
    fn read_table(&mut self, name: &str, path: Option<&str>) -> Result<Table, ReconError>;
    /// Persist a stage output; returns where it went.
    fn write_table(&mut self, name: &str, table: &Table) -> Result<String, ReconError>;
}

/// In-memory workspace: inputs handed in up front, outputs kept by name.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    pub sheets: Vec<Sheet>,
    pub roster: Table,
    pub value_maps: Option<ValueMapper>,
    pub files: BTreeMap<String, Table>,
    pub roster_loads: usize,
}

impl MemoryWorkspace {
    pub fn new(sheets: Vec<Sheet>, roster: Table) -> Self {
        Self { sheets, roster, ..Self::default() }
    }

    pub fn output(&self, name: &str) -> Option<&Table> {
        self.files.get(name)
    }
}

impl Workspace for MemoryWorkspace {
    fn family_sheets(&mut self) -> Result<Vec<Sheet>, ReconError> {
        Ok(self.sheets.clone())
    }

    fn roster(&mut self) -> Result<Table, ReconError> {
        self.roster_loads += 1;
        Ok(self.roster.clone())
    }

    fn value_maps(&mut self) -> Result<ValueMapper, ReconError> {
        match &self.value_maps {
            Some(mapper) => Ok(mapper.clone()),
            None => ValueMapper::builtin(),
        }
    }

    fn read_table(&mut self, name: &str, path: Option<&str>) -> Result<Table, ReconError> {
        let key = path.unwrap_or(name);
        self.files.get(key).cloned().ok_or_else(|| ReconError::Load {
            file: key.to_string(),
            sheet: None,
            message: "no such table".into(),
        })
    }

    fn write_table(&mut self, name: &str, table: &Table) -> Result<String, ReconError> {
        self.files.insert(name.to_string(), table.clone());
        Ok(name.to_string())
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UnpivotOutput {
    pub individuals: Table,
    pub summary: UnpivotSummary,
}

/// Unpivot every sheet, then deduplicate per `dedup`.
pub fn unpivot_stage(dedup: &DedupConfig, sheets: Vec<Sheet>) -> Result<UnpivotOutput, ReconError> {
    let sheet_count = sheets.len();
    let families = sheets.iter().map(|s| s.table.len()).sum();

    let mut processor = FamilyProcessor::new(sheets);
    let individuals = processor.distribute_family_members().len();

    let (mut removed, mut flagged) = (0, 0);
    match dedup.mode {
        DedupMode::Remove => removed = processor.remove_duplicates(&dedup.columns)?.removed,
        DedupMode::Mark => flagged = processor.mark_duplicates(&dedup.columns)?,
        DedupMode::Off => {}
    }
    let table = processor.into_result()?;

    Ok(UnpivotOutput {
        summary: UnpivotSummary {
            sheets: sheet_count,
            families,
            individuals,
            dedup_mode: dedup.mode,
            duplicates_removed: removed,
            duplicates_flagged: flagged,
            remaining: table.len(),
        },
        individuals: table,
    })
}

/// Result of either exact-key strategy.
#[derive(Debug, Clone)]
pub struct ExactOutput {
    pub strategy: ExactStrategy,
    pub roster: Table,
    /// Canonical-id strategy only.
    pub unmatched_roster: Option<Table>,
    pub matched_individuals: Table,
    pub unmatched_individuals: Table,
    pub roster_matched: usize,
}

impl ExactOutput {
    pub fn summary(&self) -> ExactSummary {
        ExactSummary {
            strategy: self.strategy,
            roster_rows: self.roster.len(),
            roster_matched: self.roster_matched,
            individuals_matched: self.matched_individuals.len(),
            individuals_unmatched: self.unmatched_individuals.len(),
        }
    }

    pub fn named_outputs(&self) -> Vec<(&'static str, &Table)> {
        let mut out = vec![(roster_output_name(self.strategy), &self.roster)];
        if let Some(unmatched) = &self.unmatched_roster {
            out.push((UNMATCHED_ROSTER, unmatched));
        }
        out.push((UNMATCHED_INDIVIDUALS, &self.unmatched_individuals));
        out
    }
}

/// File stem of the roster written by the exact stage and rewritten by household sync.
pub fn roster_output_name(strategy: ExactStrategy) -> &'static str {
    match strategy {
        ExactStrategy::CanonicalId => ROSTER_UPDATED,
        ExactStrategy::ColumnPairs => ROSTER_COMPARED,
    }
}

pub fn exact_stage(
    config: &PipelineConfig,
    roster: &Table,
    individuals: &Table,
) -> Result<ExactOutput, ReconError> {
    let status = config.roster.status_columns();
    match config.exact.strategy {
        ExactStrategy::CanonicalId => {
            let out = match_canonical_ids(
                roster,
                individuals,
                &config.roster.id_column,
                &config.exact.individual_id,
                &status,
            )?;
            Ok(ExactOutput {
                strategy: ExactStrategy::CanonicalId,
                roster_matched: roster.len() - out.unmatched_roster.len(),
                roster: out.roster,
                unmatched_roster: Some(out.unmatched_roster),
                matched_individuals: out.matched_individuals,
                unmatched_individuals: out.unmatched_individuals,
            })
        }
        ExactStrategy::ColumnPairs => {
            let out = compare_and_mark(roster, individuals, &config.exact.pairs, &status)?;
            Ok(ExactOutput {
                strategy: ExactStrategy::ColumnPairs,
                roster_matched: out.matched,
                roster: out.roster,
                unmatched_roster: None,
                matched_individuals: out.matched_individuals,
                unmatched_individuals: out.unmatched_individuals,
            })
        }
    }
}

/// Status column household sync propagates: "New Application" after a
/// canonical-id match, "Анкета" after a column-pair join.
pub fn sync_status_column(config: &PipelineConfig) -> &str {
    match config.exact.strategy {
        ExactStrategy::CanonicalId => &config.roster.application_column,
        ExactStrategy::ColumnPairs => &config.roster.status_column,
    }
}

pub fn household_sync_stage(
    config: &PipelineConfig,
    roster: &mut Table,
) -> Result<SyncSummary, ReconError> {
    let rows_changed =
        sync_household_status(roster, &config.roster.group_column, sync_status_column(config))?;
    Ok(SyncSummary { rows_changed })
}

pub fn fuzzy_stage(
    config: &PipelineConfig,
    roster: &Table,
    pool: &Table,
) -> Result<FuzzyOutcome, ReconError> {
    cascade(roster, pool, &config.fuzzy.columns)
}

pub fn fuzzy_summary(pool: usize, out: &FuzzyOutcome) -> FuzzySummary {
    FuzzySummary {
        pool,
        phone_links: out.phone.links.len(),
        matched_by_phone: out.phone.matched_sources().len(),
        unmatched_after_phone: out.phone.unmatched_rows.len(),
        date_links: out.date.links.len(),
        matched_by_date: out.date.matched_sources().len(),
        unmatched_after_date: out.date.unmatched_rows.len(),
        ut_backfilled: out.backfilled,
    }
}

pub fn fuzzy_outputs(out: &FuzzyOutcome) -> [(&'static str, &Table); 5] {
    [
        (MATCHED_BY_PHONE, &out.phone.matched),
        (UNMATCHED_AFTER_PHONE, &out.phone.unmatched),
        (MATCHED_BY_DATE, &out.date.matched),
        (UNMATCHED_AFTER_DATE, &out.date.unmatched),
        (FINAL_UNMATCHED, &out.final_unmatched),
    ]
}

pub fn new_records_stage(
    config: &PipelineConfig,
    roster_header: &[String],
    unmatched: &Table,
    mapper: &ValueMapper,
) -> (Table, NewRecordsSummary) {
    let schema = config.new_records.schema.as_deref().unwrap_or(roster_header);
    let table = build_new_records(
        unmatched,
        &config.new_records.fields,
        schema,
        mapper,
        &config.roster.status_columns(),
    );
    let summary = NewRecordsSummary {
        records: table.len(),
        mapped_fields: config.new_records.fields.len(),
        value_maps_version: mapper.version(),
    };
    (table, summary)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Loads the roster on first use and keeps it for the rest of the run.
struct RosterCache(Option<Table>);

impl RosterCache {
    fn get(&mut self, ws: &mut impl Workspace) -> Result<&Table, ReconError> {
        if self.0.is_none() {
            self.0 = Some(ws.roster()?);
        }
        self.0
            .as_ref()
            .ok_or_else(|| ReconError::State("roster not loaded".into()))
    }
}

fn write(
    ws: &mut impl Workspace,
    summary: &mut RunSummary,
    name: &str,
    table: &Table,
) -> Result<(), ReconError> {
    let location = ws.write_table(name, table)?;
    info!("wrote {} rows to {location}", table.len());
    summary.outputs.push(location);
    Ok(())
}

/// Run the selected stages in pipeline order.
///
/// A stage hands its output to the next one in memory. When the producing
/// stage is not selected, the input is read back from the workspace: the
/// stage's `input` override if configured, else the producer's output name.
pub fn run(
    config: &PipelineConfig,
    selection: &StageSelection,
    ws: &mut impl Workspace,
) -> Result<RunSummary, ReconError> {
    if selection.is_empty() {
        return Err(ReconError::State("no stages selected".into()));
    }

    let mut summary = RunSummary::new(&config.name);
    summary.stages = selection.stages().to_vec();

    let mut roster = RosterCache(None);
    let mut individuals: Option<Table> = None;
    let mut updated_roster: Option<Table> = None;
    let mut pool: Option<Table> = None;
    let mut final_unmatched: Option<Table> = None;

    for &stage in selection.stages() {
        info!("stage {stage}: starting");
        match stage {
            Stage::Unpivot => {
                let out = unpivot_stage(&config.dedup, ws.family_sheets()?)?;
                write(ws, &mut summary, PROCESSED_FAMILY_DATA, &out.individuals)?;
                summary.unpivot = Some(out.summary);
                individuals = Some(out.individuals);
            }
            Stage::ExactMatch => {
                let input = match individuals.take() {
                    Some(t) => t,
                    None => ws.read_table(PROCESSED_FAMILY_DATA, config.exact.input.as_deref())?,
                };
                let out = exact_stage(config, roster.get(ws)?, &input)?;
                for (name, table) in out.named_outputs() {
                    write(ws, &mut summary, name, table)?;
                }
                summary.exact = Some(out.summary());
                updated_roster = Some(out.roster);
                pool = Some(out.unmatched_individuals);
            }
            Stage::HouseholdSync => {
                let name = roster_output_name(config.exact.strategy);
                let mut table = match updated_roster.take() {
                    Some(t) => t,
                    None => ws.read_table(name, config.sync.input.as_deref())?,
                };
                let out = household_sync_stage(config, &mut table)?;
                write(ws, &mut summary, name, &table)?;
                summary.household_sync = Some(out);
            }
            Stage::FuzzyMatch => {
                let input = match pool.take() {
                    Some(t) => t,
                    None => ws.read_table(UNMATCHED_INDIVIDUALS, config.fuzzy.input.as_deref())?,
                };
                let out = fuzzy_stage(config, roster.get(ws)?, &input)?;
                for (name, table) in fuzzy_outputs(&out) {
                    write(ws, &mut summary, name, table)?;
                }
                summary.fuzzy = Some(fuzzy_summary(input.len(), &out));
                final_unmatched = Some(out.final_unmatched);
            }
            Stage::NewRecords => {
                let input = match final_unmatched.take() {
                    Some(t) => t,
                    None => ws.read_table(FINAL_UNMATCHED, config.new_records.input.as_deref())?,
                };
                let mapper = ws.value_maps()?;
                let header = match &config.new_records.schema {
                    Some(schema) => schema.clone(),
                    None => roster.get(ws)?.columns.clone(),
                };
                let (table, out) = new_records_stage(config, &header, &input, &mapper);
                write(ws, &mut summary, NEW_ROSTER_RECORDS, &table)?;
                summary.new_records = Some(out);
            }
        }
    }

    Ok(summary)
}
