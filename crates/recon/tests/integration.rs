use std::path::PathBuf;

use rosterlink_recon::config::{DedupMode, ExactStrategy};
use rosterlink_recon::dedup::{DUPLICATE_DETAILS_COLUMN, DUPLICATE_FLAG_COLUMN};
use rosterlink_recon::engine::{
    self, FINAL_UNMATCHED, MATCHED_BY_DATE, MATCHED_BY_PHONE, NEW_ROSTER_RECORDS,
    PROCESSED_FAMILY_DATA, ROSTER_COMPARED, ROSTER_UPDATED, UNMATCHED_AFTER_DATE,
    UNMATCHED_INDIVIDUALS, UNMATCHED_ROSTER,
};
use rosterlink_recon::exact::{SUBMITTED, UNDER_REVIEW};
use rosterlink_recon::fuzzy::MATCHED_BY_COLUMN;
use rosterlink_recon::{MemoryWorkspace, PipelineConfig, Sheet, Stage, StageSelection, Table};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_csv(name: &str) -> Table {
    let path = fixtures_dir().join(name);
    let data = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    Table::from_csv_str(&data, b',').unwrap()
}

fn workspace() -> MemoryWorkspace {
    let sheets = vec![
        Sheet { name: "Tbilisi".into(), table: load_csv("families_tbilisi.csv") },
        Sheet { name: "Batumi".into(), table: load_csv("families_batumi.csv") },
    ];
    MemoryWorkspace::new(sheets, load_csv("roster.csv"))
}

const PIPELINE: &str = r#"
name = "Fixture intake"

[source]
file = "families.xlsx"

[roster]
file = "roster.csv"

[fuzzy]
birth_date = 12
phone = 3

[new_records]
fields = [
    ["Surname", "7"],
    ["Name", "8"],
    ["Gender", "9"],
    ["Document type", "10"],
    ["Passport", "11"],
    ["Date of birth", "12"],
    ["Arrival date", "13"],
    ["Citizenship", "14"],
    ["Vulnerability", "15"],
    ["georgian phone", "3"],
    ["City", "4"],
    ["ut", "22"],
]
"#;

fn config() -> PipelineConfig {
    PipelineConfig::from_toml(PIPELINE).unwrap()
}

fn with_section(extra: &str) -> PipelineConfig {
    PipelineConfig::from_toml(&format!("{PIPELINE}\n{extra}")).unwrap()
}

// -------------------------------------------------------------------------
// Full run
// -------------------------------------------------------------------------

#[test]
fn full_pipeline_counts() {
    let mut ws = workspace();
    let summary = engine::run(&config(), &StageSelection::all(), &mut ws).unwrap();

    let unpivot = summary.unpivot.as_ref().unwrap();
    assert_eq!(unpivot.sheets, 2);
    assert_eq!(unpivot.families, 5);
    assert_eq!(unpivot.individuals, 7);
    assert_eq!(unpivot.dedup_mode, DedupMode::Remove);
    assert_eq!(unpivot.duplicates_removed, 1);
    assert_eq!(unpivot.remaining, 6);

    let exact = summary.exact.as_ref().unwrap();
    assert_eq!(exact.roster_rows, 5);
    assert_eq!(exact.roster_matched, 2);
    assert_eq!(exact.individuals_matched, 2);
    assert_eq!(exact.individuals_unmatched, 4);

    assert_eq!(summary.household_sync.as_ref().unwrap().rows_changed, 2);

    let fuzzy = summary.fuzzy.as_ref().unwrap();
    assert_eq!(fuzzy.pool, 4);
    assert_eq!(fuzzy.phone_links, 2);
    assert_eq!(fuzzy.matched_by_phone, 1);
    assert_eq!(fuzzy.unmatched_after_phone, 3);
    assert_eq!(fuzzy.date_links, 1);
    assert_eq!(fuzzy.matched_by_date, 1);
    assert_eq!(fuzzy.unmatched_after_date, 2);
    assert_eq!(fuzzy.ut_backfilled, 2);

    assert_eq!(summary.new_records.as_ref().unwrap().records, 2);

    // the roster is read once per run
    assert_eq!(ws.roster_loads, 1);
    assert_eq!(summary.outputs.len(), 11);
}

#[test]
fn minimal_config_runs_every_stage() {
    let config = PipelineConfig::from_toml(
        r#"
name = "Defaults only"

[source]
file = "families.xlsx"

[roster]
file = "roster.csv"
"#,
    )
    .unwrap();
    let mut ws = workspace();
    let summary = engine::run(&config, &StageSelection::all(), &mut ws).unwrap();

    let fuzzy = summary.fuzzy.as_ref().unwrap();
    assert_eq!(fuzzy.pool, 4);
    assert_eq!(fuzzy.matched_by_phone, 1);
    assert_eq!(fuzzy.matched_by_date, 1);
    assert_eq!(summary.new_records.as_ref().unwrap().records, 2);
    assert_eq!(summary.outputs.len(), 11);
    assert!(ws.output(NEW_ROSTER_RECORDS).is_some());
}

#[test]
fn unpivot_keeps_head_then_members_in_sheet_order() {
    let mut ws = workspace();
    engine::run(&config(), &StageSelection::only([Stage::Unpivot]), &mut ws).unwrap();
    let individuals = ws.output(PROCESSED_FAMILY_DATA).unwrap();

    let surnames: Vec<_> = (0..individuals.len())
        .map(|i| (individuals.cell(i, 7).unwrap_or(""), individuals.cell(i, 8).unwrap_or("")))
        .collect();
    assert_eq!(
        surnames,
        vec![
            ("Коваль", "Олена"),
            ("Коваль", "Петро"),
            ("Бондар", "Ірина"),
            ("Ткач", "Марія"),
            ("Ткач", "Софія"),
            ("Гнатюк", "Олег"),
        ]
    );

    // member rows share the family prefix and tail, take person fields from the block
    assert_eq!(individuals.cell(1, 0), Some("T-1"));
    assert_eq!(individuals.cell(1, 3), Some("995599123456"));
    assert_eq!(individuals.cell(1, 11), Some("FX100002"));
    assert_eq!(individuals.cell(1, 16), Some("@T-1"));
    assert_eq!(individuals.cell(4, 10), Some("ID-картка"));
    assert_eq!(individuals.cell(4, 11), None);
}

#[test]
fn roster_statuses_after_household_sync() {
    let mut ws = workspace();
    engine::run(&config(), &StageSelection::all(), &mut ws).unwrap();
    let roster = ws.output(ROSTER_UPDATED).unwrap();

    let statuses: Vec<Option<&str>> =
        (0..roster.len()).map(|i| roster.value(i, "New Application")).collect();
    assert_eq!(
        statuses,
        vec![Some(SUBMITTED), Some(SUBMITTED), Some("архів"), Some(SUBMITTED), Some(SUBMITTED)]
    );

    let unmatched = ws.output(UNMATCHED_ROSTER).unwrap();
    assert_eq!(unmatched.len(), 3);
    assert!(unmatched.column_index("New Application").is_none());
}

#[test]
fn fuzzy_outputs_carry_provenance() {
    let mut ws = workspace();
    engine::run(&config(), &StageSelection::all(), &mut ws).unwrap();

    let by_phone = ws.output(MATCHED_BY_PHONE).unwrap();
    assert_eq!(by_phone.len(), 2);
    assert_eq!(by_phone.value(0, "Name"), Some("Олена"));
    assert_eq!(by_phone.value(1, "Name"), Some("Петро"));
    assert_eq!(by_phone.value(0, "12"), Some("2004-07-01"));
    assert_eq!(by_phone.value(0, MATCHED_BY_COLUMN), Some("Phone: 123456"));

    let by_date = ws.output(MATCHED_BY_DATE).unwrap();
    assert_eq!(by_date.len(), 1);
    assert_eq!(by_date.value(0, "Surname"), Some("Мельник"));
    assert_eq!(by_date.value(0, "ut"), Some("H2"));
    assert_eq!(by_date.value(0, "3"), Some("995511222333"));
    assert_eq!(by_date.value(0, MATCHED_BY_COLUMN), Some("Date of birth: 2000-05-01"));

    let after_date = ws.output(UNMATCHED_AFTER_DATE).unwrap();
    assert!(after_date.column_index("ut").is_none());

    let final_unmatched = ws.output(FINAL_UNMATCHED).unwrap();
    assert_eq!(final_unmatched.len(), 2);
    assert_eq!(final_unmatched.value(0, "ut"), Some("H2"));
    assert_eq!(final_unmatched.value(1, "ut"), Some("H2"));
    assert_eq!(final_unmatched.value(0, "12"), Some("1999-09-09"));
    assert_eq!(final_unmatched.value(1, "12"), None);
}

#[test]
fn new_records_follow_roster_schema() {
    let mut ws = workspace();
    engine::run(&config(), &StageSelection::all(), &mut ws).unwrap();
    let records = ws.output(NEW_ROSTER_RECORDS).unwrap();
    let roster = load_csv("roster.csv");

    assert_eq!(&records.columns[..roster.width()], roster.columns.as_slice());
    assert_eq!(records.columns.last().map(String::as_str), Some("Arrival date"));

    assert_eq!(records.value(0, "Surname"), Some("Ткач"));
    assert_eq!(records.value(0, "City"), Some("Batumi"));
    assert_eq!(records.value(0, "Gender"), Some("Female"));
    assert_eq!(records.value(0, "Document type"), Some("International Passport"));
    assert_eq!(records.value(0, "Citizenship"), Some("Ukraine"));
    assert_eq!(records.value(0, "Vulnerability"), Some("P"));
    assert_eq!(records.value(0, "Date of birth"), Some("1999-09-09"));
    assert_eq!(records.value(0, "ut"), Some("H2"));
    assert_eq!(records.value(0, "id"), Some(""));
    assert_eq!(records.value(0, "Анкета"), Some(SUBMITTED));
    assert_eq!(records.value(0, "Win2024"), Some(UNDER_REVIEW));

    assert_eq!(records.value(1, "Name"), Some("Софія"));
    assert_eq!(records.value(1, "Document type"), Some("ID Card"));
    assert_eq!(records.value(1, "Passport"), Some(""));
    assert_eq!(records.value(1, "Date of birth"), Some(""));
}

// -------------------------------------------------------------------------
// Partitions
// -------------------------------------------------------------------------

#[test]
fn exact_match_partitions_individuals() {
    let config = config();
    let mut ws = workspace();
    engine::run(&config, &StageSelection::only([Stage::Unpivot]), &mut ws).unwrap();
    let individuals = ws.output(PROCESSED_FAMILY_DATA).unwrap().clone();

    let out = engine::exact_stage(&config, &load_csv("roster.csv"), &individuals).unwrap();
    let mut rows: Vec<_> = out
        .matched_individuals
        .rows
        .iter()
        .chain(out.unmatched_individuals.rows.iter())
        .cloned()
        .collect();
    let mut expected = individuals.rows.clone();
    rows.sort();
    expected.sort();
    assert_eq!(rows, expected);
}

#[test]
fn fuzzy_stage_boundaries_partition_the_pool() {
    let config = config();
    let mut ws = workspace();
    let summary = engine::run(&config, &StageSelection::all(), &mut ws).unwrap();
    let f = summary.fuzzy.unwrap();
    assert_eq!(f.matched_by_phone + f.unmatched_after_phone, f.pool);
    assert_eq!(f.matched_by_date + f.unmatched_after_date, f.unmatched_after_phone);
}

// -------------------------------------------------------------------------
// Stage selection
// -------------------------------------------------------------------------

#[test]
fn later_stages_resume_from_written_outputs() {
    let config = config();
    let mut ws = workspace();
    engine::run(&config, &StageSelection::only([Stage::Unpivot, Stage::ExactMatch]), &mut ws)
        .unwrap();
    assert!(ws.output(UNMATCHED_INDIVIDUALS).is_some());

    let sync = StageSelection::only([Stage::HouseholdSync]);
    let first = engine::run(&config, &sync, &mut ws).unwrap();
    assert_eq!(first.household_sync.unwrap().rows_changed, 2);
    let after_first = ws.output(ROSTER_UPDATED).unwrap().clone();

    let second = engine::run(&config, &sync, &mut ws).unwrap();
    assert_eq!(second.household_sync.unwrap().rows_changed, 0);
    assert_eq!(ws.output(ROSTER_UPDATED).unwrap(), &after_first);

    let rest = engine::run(
        &config,
        &StageSelection::only([Stage::FuzzyMatch, Stage::NewRecords]),
        &mut ws,
    )
    .unwrap();
    assert_eq!(rest.fuzzy.unwrap().pool, 4);
    assert_eq!(rest.new_records.unwrap().records, 2);
}

#[test]
fn stage_input_override_is_used_when_predecessor_did_not_run() {
    let config = with_section("[sync]\ninput = \"edited_roster\"\n");
    let mut ws = workspace();
    let mut edited = load_csv("roster.csv");
    let status = edited.ensure_column("New Application");
    edited.set(2, status, Some(SUBMITTED.into()));
    ws.files.insert("edited_roster".into(), edited);

    let summary =
        engine::run(&config, &StageSelection::only([Stage::HouseholdSync]), &mut ws).unwrap();
    assert_eq!(summary.household_sync.unwrap().rows_changed, 0);

    let mut edited = load_csv("roster.csv");
    let status = edited.ensure_column("New Application");
    edited.set(0, status, Some(SUBMITTED.into()));
    ws.files.insert("edited_roster".into(), edited);
    let summary =
        engine::run(&config, &StageSelection::only([Stage::HouseholdSync]), &mut ws).unwrap();
    assert_eq!(summary.household_sync.unwrap().rows_changed, 1);
    assert_eq!(ws.output(ROSTER_UPDATED).unwrap().value(1, "New Application"), Some(SUBMITTED));
}

// -------------------------------------------------------------------------
// Alternative modes
// -------------------------------------------------------------------------

#[test]
fn mark_mode_keeps_every_individual() {
    let config = with_section("[dedup]\nmode = \"mark\"\ncolumns = [11]\n");
    let mut ws = workspace();
    let summary = engine::run(&config, &StageSelection::only([Stage::Unpivot]), &mut ws).unwrap();
    let unpivot = summary.unpivot.unwrap();
    assert_eq!(unpivot.remaining, 7);
    assert_eq!(unpivot.duplicates_flagged, 2);

    let individuals = ws.output(PROCESSED_FAMILY_DATA).unwrap();
    assert_eq!(individuals.value(0, DUPLICATE_FLAG_COLUMN), Some("TRUE"));
    assert_eq!(individuals.value(0, DUPLICATE_DETAILS_COLUMN), Some("Колонка '11': FX100001"));
    assert_eq!(individuals.value(1, DUPLICATE_FLAG_COLUMN), Some("FALSE"));
}

#[test]
fn column_pair_strategy_marks_roster_rows() {
    let config = with_section(
        "[exact]\nstrategy = \"column_pairs\"\npairs = [{ roster = \"Passport\", individual = 11 }]\n",
    );
    assert_eq!(config.exact.strategy, ExactStrategy::ColumnPairs);
    let mut ws = workspace();
    let summary = engine::run(
        &config,
        &StageSelection::only([Stage::Unpivot, Stage::ExactMatch, Stage::HouseholdSync]),
        &mut ws,
    )
    .unwrap();
    assert_eq!(summary.exact.unwrap().roster_matched, 2);
    assert_eq!(summary.household_sync.unwrap().rows_changed, 2);

    let roster = ws.output(ROSTER_COMPARED).unwrap();
    assert_eq!(roster.len(), 5);
    let statuses: Vec<_> = (0..roster.len()).map(|i| roster.value(i, "Анкета")).collect();
    assert_eq!(
        statuses,
        vec![Some(SUBMITTED), Some(SUBMITTED), Some(""), Some(SUBMITTED), Some(SUBMITTED)]
    );
    assert_eq!(roster.value(0, "Win2024"), Some(UNDER_REVIEW));
    assert_eq!(roster.value(1, "Win2024"), Some(""));
    assert!(ws.output(ROSTER_UPDATED).is_none());
}
