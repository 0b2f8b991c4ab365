//! Family rows → individual rows.
//!
//! A family export carries the head of family in its first 22 columns and up to
//! five optional member blocks after them. Each block's headers repeat the same
//! stems, disambiguated by a numeric suffix. The suffix is NOT uniform inside a
//! block: the form duplicated some questions one block earlier than others, so
//! block `i` reads some stems with `.{i-1}` and others with `.{i}`.
//! [`MEMBER_FIELDS`] records which is which.

use log::{debug, info};

use crate::dedup::{self, DedupReport};
use crate::error::ReconError;
use crate::model::{Cell, ColumnSelector, Sheet, Table};

/// Columns of the head-of-family slice copied into every individual row.
pub const COMMON_WIDTH: usize = 22;
/// Leading family-level columns shared by member rows.
pub const SHARED_PREFIX: usize = 7;
/// Member rows resume copying the common slice from this position.
pub const TAIL_START: usize = 16;
/// Member blocks read per family. Members beyond this are dropped.
pub const MAX_MEMBER_BLOCKS: usize = 5;
/// Add-member answer that emits a row.
pub const ADD_MEMBER_YES: &str = "Так";

/// Which numeric suffix a member-block field uses for block `i` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixOffset {
    /// `""` for block 1, `.{i-1}` afterwards.
    Previous,
    /// `.{i}`.
    Current,
}

impl SuffixOffset {
    pub fn suffix(self, block: usize) -> String {
        match self {
            Self::Previous if block <= 1 => String::new(),
            Self::Previous => format!(".{}", block - 1),
            Self::Current => format!(".{block}"),
        }
    }
}

/// A header stem inside a member block plus its suffix rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberField {
    pub stem: &'static str,
    pub offset: SuffixOffset,
}

impl MemberField {
    pub fn header(&self, block: usize) -> String {
        format!("{}{}", self.stem, self.offset.suffix(block))
    }
}

/// "Add a family member currently in Georgia" flag.
pub const ADD_MEMBER_FLAG: MemberField = MemberField {
    stem: "Додати члена сімʼї що перебуває зараз Грузії",
    offset: SuffixOffset::Previous,
};

/// Person-level fields of a member block, in individual-row order (positions 7..=15).
pub const MEMBER_FIELDS: [MemberField; 9] = [
    MemberField { stem: "Прізвище (за паспортом)", offset: SuffixOffset::Current },
    MemberField { stem: "Імʼя (за паспортом)", offset: SuffixOffset::Current },
    MemberField { stem: "Стать", offset: SuffixOffset::Current },
    MemberField {
        stem: "Оберіть закордонний паспорт члена родини. В разі відсутності вкажіть інший документ",
        offset: SuffixOffset::Previous,
    },
    MemberField {
        stem: "Серія та номер закордонного паспорту або іншого ідентифікаційного документу члена родини",
        offset: SuffixOffset::Previous,
    },
    MemberField { stem: "Дата народження", offset: SuffixOffset::Current },
    MemberField { stem: "Дата приїзду до Грузії", offset: SuffixOffset::Current },
    MemberField { stem: "Громадянство", offset: SuffixOffset::Current },
    MemberField {
        stem: "Чи відноситься цей член родини до однієї з груп вразливості?",
        offset: SuffixOffset::Previous,
    },
];

/// Column indices of one member block in a particular sheet. `None` = header absent.
struct BlockColumns {
    flag: Option<usize>,
    fields: [Option<usize>; 9],
}

/// Apostrophe spellings legacy exports substitute for `ʼ` (U+02BC).
const APOSTROPHES: [char; 3] = ['ʼ', '’', '\''];

fn fold_apostrophes(s: &str) -> String {
    s.chars()
        .map(|c| if APOSTROPHES.contains(&c) { 'ʼ' } else { c })
        .collect()
}

fn header_index(table: &Table, header: &str) -> Option<usize> {
    table.column_index(header).or_else(|| {
        let wanted = fold_apostrophes(header);
        table.columns.iter().position(|c| fold_apostrophes(c) == wanted)
    })
}

fn block_columns(table: &Table) -> Vec<BlockColumns> {
    (1..=MAX_MEMBER_BLOCKS)
        .map(|block| BlockColumns {
            flag: header_index(table, &ADD_MEMBER_FLAG.header(block)),
            fields: MEMBER_FIELDS.map(|f| header_index(table, &f.header(block))),
        })
        .collect()
}

/// Expand every family row of `table` into individual rows, appending to `out`.
fn unpivot_into(table: &Table, out: &mut Table) -> usize {
    let blocks = block_columns(table);
    let before = out.len();

    for row in &table.rows {
        let mut common: Vec<Cell> = row.iter().take(COMMON_WIDTH).cloned().collect();
        common.resize(COMMON_WIDTH, None);

        out.push_row(common.clone());

        for (i, block) in blocks.iter().enumerate() {
            let added = block
                .flag
                .and_then(|c| row.get(c))
                .and_then(|c| c.as_deref())
                .is_some_and(|v| v == ADD_MEMBER_YES);
            if !added {
                continue;
            }

            let mut member: Vec<Cell> = Vec::with_capacity(COMMON_WIDTH);
            member.extend_from_slice(&common[..SHARED_PREFIX]);
            member.extend(
                block
                    .fields
                    .iter()
                    .map(|col| col.and_then(|c| row.get(c).cloned().flatten())),
            );
            member.extend_from_slice(&common[TAIL_START..]);
            debug!("member block {} -> {} fields", i + 1, member.len());
            out.push_row(member);
        }
    }

    out.len() - before
}

/// Unpivot one family table into a positional individual table ("0".."21").
pub fn unpivot_table(table: &Table) -> Table {
    let mut out = Table::positional(COMMON_WIDTH);
    unpivot_into(table, &mut out);
    out
}

/// Unpivot every sheet in order and concatenate the individuals.
pub fn unpivot_sheets(sheets: &[Sheet]) -> Table {
    let mut out = Table::positional(COMMON_WIDTH);
    for sheet in sheets {
        debug!("sheet '{}' columns: {:?}", sheet.name, sheet.table.columns);
        let emitted = unpivot_into(&sheet.table, &mut out);
        info!(
            "sheet '{}': {} families -> {} individuals",
            sheet.name,
            sheet.table.len(),
            emitted
        );
    }
    out
}

// ---------------------------------------------------------------------------
// Stateful front end
// ---------------------------------------------------------------------------

/// Holds the family workbook and, once [`distribute_family_members`] ran, the
/// individual table. Deduplication is only available after that.
///
/// [`distribute_family_members`]: FamilyProcessor::distribute_family_members
#[derive(Debug)]
pub struct FamilyProcessor {
    sheets: Vec<Sheet>,
    result: Option<Table>,
}

impl FamilyProcessor {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets, result: None }
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn distribute_family_members(&mut self) -> &Table {
        self.result.insert(unpivot_sheets(&self.sheets))
    }

    pub fn result(&self) -> Result<&Table, ReconError> {
        self.result.as_ref().ok_or_else(not_distributed)
    }

    pub fn into_result(self) -> Result<Table, ReconError> {
        self.result.ok_or_else(not_distributed)
    }

    /// Flag rows with non-unique values; returns the number of rows flagged.
    pub fn mark_duplicates(&mut self, selectors: &[ColumnSelector]) -> Result<usize, ReconError> {
        let table = self.result.as_mut().ok_or_else(not_distributed)?;
        dedup::mark_duplicates(table, selectors)
    }

    pub fn remove_duplicates(
        &mut self,
        selectors: &[ColumnSelector],
    ) -> Result<DedupReport, ReconError> {
        let table = self.result.as_mut().ok_or_else(not_distributed)?;
        dedup::remove_duplicates(table, selectors)
    }
}

fn not_distributed() -> ReconError {
    ReconError::State(
        "no individual rows yet: run distribute_family_members() before deduplicating".into(),
    )
}
