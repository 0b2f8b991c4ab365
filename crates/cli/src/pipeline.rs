//! File-backed workspace: inputs resolved against the config file's
//! directory, stage outputs written to `[output] dir` as `<name>.<ext>`.

use std::path::{Path, PathBuf};

use log::debug;

use rosterlink_recon::config::OutputFormat;
use rosterlink_recon::engine::{ROSTER_COMPARED, ROSTER_UPDATED};
use rosterlink_recon::{PipelineConfig, ReconError, Sheet, Table, ValueMapper, Workspace};

/// Sheet name for every output that is not a roster.
const DEFAULT_SHEET: &str = "Sheet1";

pub struct FileWorkspace {
    base_dir: PathBuf,
    out_dir: PathBuf,
    format: OutputFormat,
    source_file: PathBuf,
    source_sheets: Vec<String>,
    roster_file: PathBuf,
    roster_sheet: String,
    value_maps: Option<PathBuf>,
}

impl FileWorkspace {
    pub fn new(config: &PipelineConfig, config_path: &Path) -> Self {
        let base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            out_dir: base_dir.join(&config.output.dir),
            format: config.output.format,
            source_file: base_dir.join(&config.source.file),
            source_sheets: config.source.sheets.clone(),
            roster_file: base_dir.join(&config.roster.file),
            roster_sheet: config.roster.sheet.clone(),
            value_maps: config.new_records.value_maps.as_ref().map(|p| base_dir.join(p)),
            base_dir,
        }
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.out_dir.join(format!("{name}.{}", self.format.extension()))
    }

    fn sheet_for(&self, name: &str) -> &str {
        if name == ROSTER_UPDATED || name == ROSTER_COMPARED {
            &self.roster_sheet
        } else {
            DEFAULT_SHEET
        }
    }
}

impl Workspace for FileWorkspace {
    fn family_sheets(&mut self) -> Result<Vec<Sheet>, ReconError> {
        rosterlink_io::load_sheets(&self.source_file, &self.source_sheets)
    }

    fn roster(&mut self) -> Result<Table, ReconError> {
        rosterlink_io::load_table(&self.roster_file, Some(&self.roster_sheet))
    }

    fn value_maps(&mut self) -> Result<ValueMapper, ReconError> {
        match &self.value_maps {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| ReconError::Load {
                    file: path.display().to_string(),
                    sheet: None,
                    message: e.to_string(),
                })?;
                ValueMapper::from_toml(&text)
            }
            None => ValueMapper::builtin(),
        }
    }

    fn read_table(&mut self, name: &str, path: Option<&str>) -> Result<Table, ReconError> {
        let path = match path {
            Some(p) => self.base_dir.join(p),
            None => self.output_path(name),
        };
        if !path.exists() {
            return Err(ReconError::Load {
                file: path.display().to_string(),
                sheet: None,
                message: format!("'{name}' not found; run the stage that produces it first"),
            });
        }
        debug!("reading {name} from {}", path.display());
        rosterlink_io::load_table(&path, None)
    }

    fn write_table(&mut self, name: &str, table: &Table) -> Result<String, ReconError> {
        std::fs::create_dir_all(&self.out_dir)
            .map_err(|e| ReconError::Io(format!("{}: {e}", self.out_dir.display())))?;
        let path = self.output_path(name);
        rosterlink_io::save_table(&path, self.sheet_for(name), table)?;
        Ok(path.display().to_string())
    }
}
