use serde::Serialize;

use crate::config::{DedupMode, ExactStrategy};
use crate::engine::Stage;

/// Row counts for one pipeline run, reported on stderr or as JSON.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub pipeline: String,
    pub engine_version: String,
    pub run_at: String,
    pub stages: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unpivot: Option<UnpivotSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact: Option<ExactSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub household_sync: Option<SyncSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuzzy: Option<FuzzySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_records: Option<NewRecordsSummary>,
    /// Files written, in write order.
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnpivotSummary {
    pub sheets: usize,
    pub families: usize,
    pub individuals: usize,
    pub dedup_mode: DedupMode,
    pub duplicates_removed: usize,
    pub duplicates_flagged: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExactSummary {
    pub strategy: ExactStrategy,
    pub roster_rows: usize,
    pub roster_matched: usize,
    pub individuals_matched: usize,
    pub individuals_unmatched: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub rows_changed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FuzzySummary {
    pub pool: usize,
    pub phone_links: usize,
    pub matched_by_phone: usize,
    pub unmatched_after_phone: usize,
    pub date_links: usize,
    pub matched_by_date: usize,
    pub unmatched_after_date: usize,
    pub ut_backfilled: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRecordsSummary {
    pub records: usize,
    pub mapped_fields: usize,
    pub value_maps_version: u32,
}

impl RunSummary {
    pub fn new(pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            ..Self::default()
        }
    }

    /// One human-readable line per stage that ran.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(u) = &self.unpivot {
            let dedup = match u.dedup_mode {
                DedupMode::Remove => format!("{} duplicates removed", u.duplicates_removed),
                DedupMode::Mark => format!("{} rows flagged as duplicates", u.duplicates_flagged),
                DedupMode::Off => "no deduplication".to_string(),
            };
            lines.push(format!(
                "unpivot: {} families from {} sheets -> {} individuals; {dedup}; {} remaining",
                u.families, u.sheets, u.individuals, u.remaining
            ));
        }
        if let Some(e) = &self.exact {
            lines.push(format!(
                "exact match: {} of {} roster rows matched; {} individuals matched, {} unmatched",
                e.roster_matched, e.roster_rows, e.individuals_matched, e.individuals_unmatched
            ));
        }
        if let Some(s) = &self.household_sync {
            lines.push(format!("household sync: {} rows updated", s.rows_changed));
        }
        if let Some(f) = &self.fuzzy {
            lines.push(format!(
                "fuzzy match: {} rows; {} by phone, {} by birth date, {} unmatched ({} with ut backfilled)",
                f.pool, f.matched_by_phone, f.matched_by_date, f.unmatched_after_date, f.ut_backfilled
            ));
        }
        if let Some(n) = &self.new_records {
            lines.push(format!(
                "new records: {} rows, {} mapped fields",
                n.records, n.mapped_fields
            ));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_cover_only_stages_that_ran() {
        let mut summary = RunSummary::new("test");
        summary.household_sync = Some(SyncSummary { rows_changed: 3 });
        assert_eq!(summary.lines(), vec!["household sync: 3 rows updated"]);
    }

    #[test]
    fn json_omits_stages_that_did_not_run() {
        let mut summary = RunSummary::new("test");
        summary.stages = vec![Stage::HouseholdSync];
        summary.household_sync = Some(SyncSummary { rows_changed: 0 });
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["stages"][0], "household_sync");
        assert_eq!(json["household_sync"]["rows_changed"], 0);
        assert!(json.get("fuzzy").is_none());
        assert_eq!(json["engine_version"], env!("CARGO_PKG_VERSION"));
    }
}
