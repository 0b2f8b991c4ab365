//! `rosterlink-recon`: household unpivoting and roster record linkage.
//!
//! Pure engine crate: receives pre-loaded tables, returns reshaped and matched
//! tables. File access goes through the [`engine::Workspace`] trait.

pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod exact;
pub mod fuzzy;
pub mod model;
pub mod new_records;
pub mod normalize;
pub mod summary;
pub mod unpivot;
pub mod value_map;

pub use config::PipelineConfig;
pub use engine::{run, MemoryWorkspace, Stage, StageSelection, Workspace};
pub use error::ReconError;
pub use model::{Cell, ColumnSelector, Sheet, Table};
pub use summary::RunSummary;
pub use value_map::ValueMapper;
