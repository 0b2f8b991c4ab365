//! CLI Exit Code Registry
//!
//! Single source of truth for `rosterlink` exit codes. Scripts that chain
//! stages rely on them.
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | Success                                             |
//! | 1    | General error (unspecified)                         |
//! | 2    | Usage error (bad arguments; clap's own exit code)   |
//! | 3    | Pipeline config could not be parsed or is invalid   |
//! | 4    | Input could not be loaded, or a sheet/column is missing |
//! | 5    | A stage ran without what it depends on              |
//! | 6    | An output could not be written                      |

use rosterlink_recon::ReconError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
#[allow(dead_code)]
pub const EXIT_USAGE: u8 = 2;

/// Config file unreadable, malformed TOML, or failed validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Workbook/CSV unreadable, or a required sheet or column is absent.
pub const EXIT_LOAD: u8 = 4;

/// Stage ordering problem (e.g. nothing selected).
pub const EXIT_STATE: u8 = 5;

/// Output directory or file could not be written.
pub const EXIT_WRITE: u8 = 6;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::Load { .. } | ReconError::MissingSheet { .. } | ReconError::MissingColumn { .. } => {
            EXIT_LOAD
        }
        ReconError::State(_) => EXIT_STATE,
        ReconError::Io(_) => EXIT_WRITE,
    }
}
