// Tabular file I/O: format chosen by extension

pub mod csv;
pub mod xlsx;

use std::path::Path;

use rosterlink_recon::{ReconError, Sheet, Table};

/// Spreadsheet and text formats this crate reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Workbook,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, ReconError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Ok(Self::Csv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Self::Workbook),
            _ => Err(ReconError::Load {
                file: path.display().to_string(),
                sheet: None,
                message: format!("unsupported file type '.{ext}' (expected xlsx, xls, ods or csv)"),
            }),
        }
    }
}

/// Every sheet of a workbook, or only the named ones in the given order.
///
/// A CSV file is a single sheet named after the file stem; the filter does not apply.
pub fn load_sheets(path: &Path, only: &[String]) -> Result<Vec<Sheet>, ReconError> {
    match FileFormat::from_path(path)? {
        FileFormat::Workbook => xlsx::import(path, only),
        FileFormat::Csv => Ok(vec![Sheet {
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            table: csv::import(path)?,
        }]),
    }
}

/// One table. `sheet` picks a workbook sheet (`None` = first) and is ignored for CSV.
pub fn load_table(path: &Path, sheet: Option<&str>) -> Result<Table, ReconError> {
    match FileFormat::from_path(path)? {
        FileFormat::Workbook => xlsx::import_sheet(path, sheet),
        FileFormat::Csv => csv::import(path),
    }
}

/// Write one table; xlsx outputs get a single sheet called `sheet_name`.
pub fn save_table(path: &Path, sheet_name: &str, table: &Table) -> Result<(), ReconError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("csv") => csv::export(table, path),
        Some("xlsx") => xlsx::export(table, path, sheet_name),
        _ => Err(ReconError::Io(format!(
            "{}: can only write .xlsx or .csv",
            path.display()
        ))),
    }
}
