use thiserror::Error;

use crate::assemble::AssembleError;
use crate::config::ConfigError;
use crate::storage::StorageError;
use crate::workbook::WorkbookError;

/// Hard failures of a pipeline operation.
///
/// Validation, feasibility and solve outcomes are reported as status data;
/// only unreadable or unwritable artifacts end up here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error("Stored input failed validation: {}", .0.join(", "))]
    Invalid(Vec<String>),
    #[error("No solve has run yet, nothing to report")]
    NotSolved,
}
