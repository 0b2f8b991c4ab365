use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty selector list, bad field mapping, etc.).
    ConfigValidation(String),
    /// Workbook or CSV could not be opened or decoded.
    Load {
        file: String,
        sheet: Option<String>,
        message: String,
    },
    /// A named sheet does not exist in the workbook.
    MissingSheet { file: String, sheet: String },
    /// A required column is absent from the data.
    MissingColumn { context: String, column: String },
    /// An operation ran before the stage it depends on.
    State(String),
    /// Write failure.
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Load { file, sheet: Some(sheet), message } => {
                write!(f, "cannot load '{file}' (sheet '{sheet}'): {message}")
            }
            Self::Load { file, sheet: None, message } => {
                write!(f, "cannot load '{file}': {message}")
            }
            Self::MissingSheet { file, sheet } => {
                write!(f, "'{file}': sheet '{sheet}' not found")
            }
            Self::MissingColumn { context, column } => {
                write!(f, "{context}: missing column '{column}'")
            }
            Self::State(msg) => write!(f, "precondition failed: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
