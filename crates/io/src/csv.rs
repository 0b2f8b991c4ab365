// CSV/TSV import/export

use std::io::Read;
use std::path::Path;

use rosterlink_recon::{ReconError, Table};

pub fn import(path: &Path) -> Result<Table, ReconError> {
    let content = read_file_as_utf8(path)?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    let delimiter = sniff_delimiter(content);
    Table::from_csv_str(content, delimiter).map_err(|e| load_error(path, e))
}

/// Delimiters tried in order. Ukrainian and Georgian Excel locales export with
/// `;`, so it comes first and wins ties.
const DELIMITERS: [u8; 4] = [b';', b',', b'\t', b'|'];

/// Records sampled per candidate delimiter.
const SNIFF_RECORDS: usize = 10;

/// Pick the delimiter whose header is wider than one field and which the most
/// sampled records agree with, weighted by header width. Quoted fields may
/// span lines. Falls back to `,`.
pub fn sniff_delimiter(content: &str) -> u8 {
    let mut best = (b',', 0);
    for delim in DELIMITERS {
        let widths = record_widths(content, delim);
        let Some(&header) = widths.first() else {
            continue;
        };
        if header < 2 {
            continue;
        }
        let agreeing = widths.iter().filter(|&&w| w == header).count();
        if agreeing * header > best.1 {
            best = (delim, agreeing * header);
        }
    }
    best.0
}

fn record_widths(content: &str, delimiter: u8) -> Vec<usize> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes())
        .records()
        .take(SNIFF_RECORDS)
        .map_while(Result::ok)
        .map(|r| r.len())
        .collect()
}

/// Read a file as UTF-8, falling back to Windows-1251 (Cyrillic Excel exports).
pub fn read_file_as_utf8(path: &Path) -> Result<String, ReconError> {
    let mut file = std::fs::File::open(path).map_err(|e| load_error(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| load_error(path, e))?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            log::warn!("{}: not UTF-8, decoding as Windows-1251", path.display());
            encoding_rs::WINDOWS_1251
                .decode_without_bom_handling_and_without_replacement(&bytes)
                .map(|s| s.into_owned())
                .ok_or_else(|| load_error(path, "neither UTF-8 nor Windows-1251"))
        }
    }
}

/// Write header plus rows, nulls as empty fields. Every record is header-wide.
pub fn export(table: &Table, path: &Path) -> Result<(), ReconError> {
    let io_err = |e: csv::Error| ReconError::Io(format!("{}: {e}", path.display()));

    let mut writer = csv::WriterBuilder::new().from_path(path).map_err(io_err)?;
    writer.write_record(&table.columns).map_err(io_err)?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))
            .map_err(io_err)?;
    }
    writer
        .flush()
        .map_err(|e| ReconError::Io(format!("{}: {e}", path.display())))?;
    Ok(())
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> ReconError {
    ReconError::Load {
        file: path.display().to_string(),
        sheet: None,
        message: e.to_string(),
    }
}
