// rosterlink CLI - family workbook unpivoting and roster reconciliation

mod exit_codes;
mod pipeline;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::info;

use exit_codes::{recon_exit_code, EXIT_ERROR, EXIT_INVALID_CONFIG, EXIT_SUCCESS, EXIT_WRITE};
use pipeline::FileWorkspace;
use rosterlink_recon::exact::{sync_household_status, StatusColumns};
use rosterlink_recon::{PipelineConfig, ReconError, Stage, StageSelection};

#[derive(Parser)]
#[command(name = "rosterlink")]
#[command(about = "Unpivot household registration workbooks and reconcile them against a master roster")]
#[command(version)]
#[command(long_version = long_version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline (or selected stages) from a TOML config
    #[command(after_help = "\
Examples:
  rosterlink run winter.pipeline.toml
  rosterlink run winter.pipeline.toml --stage fuzzy_match --stage new_records
  rosterlink run winter.pipeline.toml --json --output summary.json

Stages run in pipeline order. A stage whose producer is not selected reads
the producer's output from the output directory.")]
    Run {
        /// Path to the .pipeline.toml config file
        #[arg(env = "ROSTERLINK_CONFIG")]
        config: PathBuf,

        /// Stage to run (repeatable); default is every stage
        #[arg(long = "stage", value_enum)]
        stages: Vec<StageArg>,

        /// Print the run summary as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON run summary to a file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Parse and validate a pipeline config without running it
    Validate {
        /// Path to the .pipeline.toml config file
        #[arg(env = "ROSTERLINK_CONFIG")]
        config: PathBuf,
    },

    /// Propagate "submitted" status across households in a roster file
    #[command(after_help = "\
Examples:
  rosterlink sync roster_updated.xlsx
  rosterlink sync general.xlsx --sheet ua --output general_synced.xlsx")]
    Sync {
        /// Roster workbook or CSV
        roster: PathBuf,

        /// Roster sheet (ignored for CSV)
        #[arg(long, default_value = "ua")]
        sheet: String,

        /// Household code column
        #[arg(long, default_value = "ut")]
        group_column: String,

        /// Status column to propagate
        #[arg(long, default_value_t = StatusColumns::default().new_application)]
        status_column: String,

        /// Where to write the result (default: <roster>_synced.<ext> next to the input)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "snake_case")]
enum StageArg {
    Unpivot,
    ExactMatch,
    HouseholdSync,
    FuzzyMatch,
    NewRecords,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Unpivot => Stage::Unpivot,
            StageArg::ExactMatch => Stage::ExactMatch,
            StageArg::HouseholdSync => Stage::HouseholdSync,
            StageArg::FuzzyMatch => Stage::FuzzyMatch,
            StageArg::NewRecords => Stage::NewRecords,
        }
    }
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  rosterlink-recon ", env!("CARGO_PKG_VERSION"),
    )
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, stages, json, output } => cmd_run(config, stages, json, output),
        Commands::Validate { config } => cmd_validate(config),
        Commands::Sync { roster, sheet, group_column, status_column, output } => {
            cmd_sync(roster, sheet, group_column, status_column, output)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let hint = match &err {
            ReconError::MissingSheet { .. } => {
                Some("check [roster] sheet and [source] sheets in the config".to_string())
            }
            ReconError::MissingColumn { context, .. } if context == "roster" => {
                Some("roster column names are set in [roster] and [fuzzy]".to_string())
            }
            ReconError::MissingColumn { .. } => {
                Some("individual columns are selected by position (0-21) or by name".to_string())
            }
            ReconError::Load { message, .. } if message.contains("run the stage") => {
                Some("add the producing --stage, or set `input` on the stage in the config".to_string())
            }
            _ => None,
        };
        Self { code: recon_exit_code(&err), message: err.to_string(), hint }
    }
}

// ============================================================================
// run / validate
// ============================================================================

fn load_config(path: &Path) -> Result<PipelineConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CliError::new(EXIT_INVALID_CONFIG, format!("cannot read config {}: {e}", path.display()))
    })?;
    Ok(PipelineConfig::from_toml(&text)?)
}

fn cmd_run(
    config_path: PathBuf,
    stages: Vec<StageArg>,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let selection = if stages.is_empty() {
        StageSelection::all()
    } else {
        StageSelection::only(stages.into_iter().map(Stage::from))
    };

    let mut workspace = FileWorkspace::new(&config, &config_path);
    let summary = rosterlink_recon::run(&config, &selection, &mut workspace)?;

    let json_str = serde_json::to_string_pretty(&summary)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::new(EXIT_WRITE, format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    // Human summary to stderr
    for line in summary.lines() {
        eprintln!("{line}");
    }
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let sheets = if config.source.sheets.is_empty() {
        "all sheets".to_string()
    } else {
        config.source.sheets.join(", ")
    };
    eprintln!(
        "valid: pipeline '{}' ({}; {} strategy; {} mapped fields; output {} as {})",
        config.name,
        sheets,
        serde_json::to_value(config.exact.strategy)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        config.new_records.fields.len(),
        config.output.dir,
        config.output.format.extension(),
    );
    Ok(())
}

// ============================================================================
// sync
// ============================================================================

fn synced_path(roster: &Path) -> PathBuf {
    let stem = roster
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "roster".to_string());
    let ext = match roster.extension().and_then(|e| e.to_str()) {
        Some(e) if e.eq_ignore_ascii_case("csv") => "csv",
        _ => "xlsx",
    };
    roster.with_file_name(format!("{stem}_synced.{ext}"))
}

fn cmd_sync(
    roster_path: PathBuf,
    sheet: String,
    group_column: String,
    status_column: String,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let mut roster = rosterlink_io::load_table(&roster_path, Some(&sheet))?;
    let changed = sync_household_status(&mut roster, &group_column, &status_column)?;

    let out = output.unwrap_or_else(|| synced_path(&roster_path));
    rosterlink_io::save_table(&out, &sheet, &roster).map_err(|e| {
        CliError::from(e).with_hint("--output must end in .xlsx or .csv")
    })?;
    info!("household sync: {changed} rows updated");
    eprintln!("wrote {} ({changed} rows updated)", out.display());
    Ok(())
}
