pub mod assemble;
pub mod build;
pub mod config;
pub mod error;
pub mod feasibility;
pub mod pipeline;
pub mod project;
pub mod records;
pub mod schema;
pub mod storage;
pub mod table;
pub mod validate;
pub mod workbook;

pub use assemble::{AssembleError, Dataset, EdgeKey, FeasibleEdge};
pub use build::{IndexSets, NetworkModel};
pub use config::{Config, ConfigError};
pub use error::PipelineError;
pub use feasibility::{FeasibilityReport, FeasibilityStatus};
pub use pipeline::{Pipeline, Run, RunState, SolveRecord, UploadInfo, UploadOutcome, input_template};
pub use project::{Projection, Totals};
pub use storage::{Artifact, Storage, StorageError};
pub use table::{Cell, Table};
pub use validate::{Check, SheetStatus, ValidationReport, validate};
pub use workbook::{StatusRecord, Workbook, WorkbookError, WorkbookReader};
