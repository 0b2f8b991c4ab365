// Excel import (xlsx, xls, xlsb, ods via calamine) and xlsx export

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::Timelike;
use log::debug;
use rust_xlsxwriter::{Format, Workbook};

use rosterlink_recon::{Cell, ReconError, Sheet, Table};

/// Excel caps sheet names at 31 characters.
const MAX_SHEET_NAME: usize = 31;

/// Read every sheet (or only `only`, in that order) with the first row as header.
pub fn import(path: &Path, only: &[String]) -> Result<Vec<Sheet>, ReconError> {
    let file = path.display().to_string();
    let mut workbook = open_workbook_auto(path).map_err(|e| ReconError::Load {
        file: file.clone(),
        sheet: None,
        message: e.to_string(),
    })?;

    let available: Vec<String> = workbook.sheet_names().to_vec();
    if available.is_empty() {
        return Err(ReconError::Load {
            file,
            sheet: None,
            message: "workbook contains no sheets".into(),
        });
    }

    let wanted: Vec<String> = if only.is_empty() {
        available.clone()
    } else {
        only.to_vec()
    };

    let mut sheets = Vec::with_capacity(wanted.len());
    for name in wanted {
        if !available.contains(&name) {
            return Err(ReconError::MissingSheet { file, sheet: name });
        }
        let range = workbook.worksheet_range(&name).map_err(|e| ReconError::Load {
            file: file.clone(),
            sheet: Some(name.clone()),
            message: e.to_string(),
        })?;
        let table = range_to_table(&range);
        debug!("{file} [{name}]: {} rows x {} columns", table.len(), table.width());
        sheets.push(Sheet { name, table });
    }
    Ok(sheets)
}

/// Read one sheet by name; `None` reads the first sheet.
pub fn import_sheet(path: &Path, sheet: Option<&str>) -> Result<Table, ReconError> {
    let only: Vec<String> = sheet.map(|s| vec![s.to_string()]).unwrap_or_default();
    let mut sheets = import(path, &only)?;
    Ok(sheets.remove(0).table)
}

fn range_to_table(range: &Range<Data>) -> Table {
    // Data may not begin at A1; keep positions aligned with sheet columns.
    let (_, start_col) = range.start().unwrap_or((0, 0));
    let pad = start_col as usize;

    let mut rows = range.rows();
    let header: Vec<String> = match rows.next() {
        Some(first) => std::iter::repeat(String::new())
            .take(pad)
            .chain(first.iter().map(|c| cell_text(c).unwrap_or_default()))
            .collect(),
        None => return Table::default(),
    };

    let mut table = Table::with_header(header);
    for row in rows {
        let cells: Vec<Cell> = std::iter::repeat(None)
            .take(pad)
            .chain(row.iter().map(cell_text))
            .collect();
        // Trailing all-empty rows inside the used range are not records
        if cells.iter().all(Option::is_none) {
            continue;
        }
        table.push_row(cells);
    }
    table
}

/// Text form of one spreadsheet cell. Empty cells and empty strings are null.
pub fn cell_text(cell: &Data) -> Cell {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        // Integral floats print without a decimal part so phone numbers keep their digits
        Data::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
        Data::Float(n) => Some(n.to_string()),
        Data::Int(n) => Some(n.to_string()),
        Data::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::Error(e) => Some(format!("#{e:?}")),
        Data::DateTime(dt) => Some(match dt.as_datetime() {
            Some(t) if t.num_seconds_from_midnight() == 0 => t.format("%Y-%m-%d").to_string(),
            Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        }),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
    }
}

/// Write one table as a single-sheet workbook: bold frozen header, text cells.
pub fn export(table: &Table, path: &Path, sheet_name: &str) -> Result<(), ReconError> {
    let xlsx_err = |e: rust_xlsxwriter::XlsxError| ReconError::Io(format!("{}: {e}", path.display()));

    let mut workbook = Workbook::new();
    let name: String = sheet_name.chars().take(MAX_SHEET_NAME).collect();
    let worksheet = workbook.add_worksheet().set_name(&name).map_err(xlsx_err)?;

    let header_format = Format::new().set_bold();
    for (col, title) in table.columns.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, title, &header_format)
            .map_err(xlsx_err)?;
    }
    worksheet.set_freeze_panes(1, 0).map_err(xlsx_err)?;

    for (r, row) in table.rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            if let Some(value) = cell {
                worksheet
                    .write_string(r as u32 + 1, col as u16, value)
                    .map_err(xlsx_err)?;
            }
        }
    }

    workbook.save(path).map_err(xlsx_err)?;
    Ok(())
}
