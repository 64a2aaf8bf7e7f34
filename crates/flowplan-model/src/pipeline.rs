//! Pipeline operations for one user.
//!
//! Every stage reads its predecessor's artifact back from storage and
//! persists its own before returning, carrying the status record forward.
//! The in-memory [`Run`] only lives for one import → solve → report pass.

use std::fmt;
use std::time::Instant;

use flowplan_solver::{MilpProblem, Solution, Solver, SolverStatus, TerminationCondition};
use serde::Serialize;
use tracing::{info, warn};

use crate::assemble::Dataset;
use crate::build::NetworkModel;
use crate::config::{Config, ConfigError, TIMESTAMP_FORMAT};
use crate::error::PipelineError;
use crate::feasibility::{self, FEASIBILITY_SHEET, FeasibilityReport, FeasibilityStatus};
use crate::project::Projection;
use crate::schema::SHEETS;
use crate::storage::{Artifact, Storage};
use crate::table::Table;
use crate::validate::{VALIDATION_SHEET, ValidationReport, validate};
use crate::workbook::{StatusRecord, Workbook, WorkbookError, WorkbookReader};

/// Caller-supplied facts about an upload
#[derive(Debug, Clone, Default)]
pub struct UploadInfo {
    /// Client address
    pub origin: Option<String>,
    pub filename: Option<String>,
    /// Upload time; stamped from the configured clock when absent
    pub datetime: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub validation: ValidationReport,
    /// Present only when validation passed
    pub feasibility: Option<FeasibilityStatus>,
}

impl UploadOutcome {
    /// Whether the solve may proceed
    pub fn ready(&self) -> bool {
        !self.validation.has_errors() && self.feasibility.is_some_and(|f| f.all_pass())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    DataLoaded,
    Built,
    Solving,
    Solved,
    SolveFailed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::DataLoaded => "data_loaded",
            RunState::Built => "built",
            RunState::Solving => "solving",
            RunState::Solved => "solved",
            RunState::SolveFailed => "solve_failed",
        })
    }
}

/// Outcome of one solve, as stamped into the status record
#[derive(Debug, Clone, Serialize)]
pub struct SolveRecord {
    pub start_time: String,
    pub end_time: String,
    pub solvetime_sec: f64,
    pub solver_status: SolverStatus,
    pub termination_condition: TerminationCondition,
    pub message: Option<String>,
    pub objective: Option<f64>,
    /// Constraints the returned values fail to satisfy
    pub violations: usize,
}

impl SolveRecord {
    pub fn write_to(&self, status: &mut StatusRecord) {
        status.set("optimize_start_time", &self.start_time);
        status.set("optimize_end_time", &self.end_time);
        status.set("optimize_solvetime_sec", self.solvetime_sec);
        status.set("optimize_solver_status", self.solver_status);
        status.set("optimize_termination_condition", self.termination_condition);
        status.set("optimize_message", self.message.as_deref().unwrap_or_default());
    }
}

/// In-memory state of one import → solve → report pass
#[derive(Debug)]
pub struct Run {
    pub dataset: Dataset,
    state: RunState,
    model: Option<NetworkModel>,
    solution: Option<Solution>,
    record: Option<SolveRecord>,
}

impl Run {
    pub fn new(dataset: Dataset) -> Self {
        info!(state = %RunState::DataLoaded, "run state");
        Self {
            dataset,
            state: RunState::DataLoaded,
            model: None,
            solution: None,
            record: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, state: RunState) {
        info!(from = %self.state, to = %state, "run state");
        self.state = state;
    }

    /// Build the model if needed; callers may adjust it before solving
    pub fn model_mut(&mut self) -> &mut NetworkModel {
        if self.model.is_none() {
            self.transition(RunState::Built);
        }
        let dataset = &self.dataset;
        self.model.get_or_insert_with(|| NetworkModel::build(dataset))
    }

    pub fn model(&self) -> Option<&NetworkModel> {
        self.model.as_ref()
    }

    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    pub fn record(&self) -> Option<&SolveRecord> {
        self.record.as_ref()
    }

    /// Solve the model with `solver`. Failures end up in the record.
    pub fn solve(&mut self, solver: &Solver, config: &Config) -> SolveRecord {
        self.solve_by(config, |problem| solver.solve(problem))
    }

    fn solve_by(
        &mut self,
        config: &Config,
        dispatch: impl FnOnce(&MilpProblem) -> Solution,
    ) -> SolveRecord {
        self.model_mut();
        self.transition(RunState::Solving);

        let start = config.clock.now();
        let started = Instant::now();
        let solution = match &self.model {
            Some(model) => dispatch(&model.problem),
            None => Solution::error("model was not built"),
        };
        let elapsed = started.elapsed().as_secs_f64();
        let end = config.clock.now();

        let record = SolveRecord {
            start_time: start.format(TIMESTAMP_FORMAT).to_string(),
            end_time: end.format(TIMESTAMP_FORMAT).to_string(),
            solvetime_sec: elapsed,
            solver_status: solution.status,
            termination_condition: solution.termination,
            message: solution.message.clone(),
            objective: solution.objective_value,
            violations: solution.violations.len(),
        };
        if solution.is_optimal() {
            self.transition(RunState::Solved);
        } else {
            warn!(
                status = %solution.status,
                termination = %solution.termination,
                detail = solution.message.as_deref().unwrap_or_default(),
                "solve did not reach an optimum"
            );
            self.transition(RunState::SolveFailed);
        }

        self.solution = Some(solution);
        self.record = Some(record.clone());
        record
    }

    /// Reports of the last solve
    pub fn projection(&self) -> Option<Projection> {
        Some(Projection::new(
            &self.dataset,
            self.model.as_ref()?,
            self.solution.as_ref()?,
        ))
    }
}

/// Pipeline operations bound to one user namespace
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
    storage: Storage,
    user: String,
}

impl Pipeline {
    pub fn new(config: &Config, user: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            config: config.clone(),
            storage: Storage::new(config, user)?,
            user: user.to_string(),
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Validate an upload and persist the cleaned input artifact.
    ///
    /// A new upload supersedes the previous run: stale diagnostics and
    /// reports are removed. When validation passes the data is imported and
    /// checked for feasibility straight away.
    pub fn upload(&self, bytes: Vec<u8>, info: UploadInfo) -> Result<UploadOutcome, PipelineError> {
        for stale in [Artifact::Error, Artifact::Output, Artifact::Plot] {
            self.storage.remove(stale)?;
        }

        let mut status = StatusRecord::new();
        status.set("upload_user", &self.user);
        status.set("upload_ip", info.origin.unwrap_or_default());
        status.set("upload_filename", info.filename.unwrap_or_default());
        status.set(
            "upload_datetime",
            info.datetime.unwrap_or_else(|| self.config.clock.timestamp()),
        );
        status.set("validate_sheet_datetime", self.config.clock.timestamp());

        let validation = validate(bytes, status);
        self.storage
            .save(Artifact::Input, &validation.workbook.to_bytes()?)?;

        let feasibility = if validation.report.has_errors() {
            let failed: Vec<&str> = validation.report.failed().map(|(n, _)| n).collect();
            warn!(?failed, "upload failed validation");
            None
        } else {
            let run = self.import()?;
            Some(self.check_feasibility(&run)?.status)
        };

        Ok(UploadOutcome {
            validation: validation.report,
            feasibility,
        })
    }

    /// Load the persisted input artifact into a fresh run.
    ///
    /// Refuses an input whose validation sheet flags any table.
    pub fn import(&self) -> Result<Run, PipelineError> {
        let mut reader = WorkbookReader::new(self.storage.load(Artifact::Input)?)?;
        if reader.has_sheet(VALIDATION_SHEET) {
            let failed = ValidationReport::failed_in(&reader.table(VALIDATION_SHEET)?);
            if !failed.is_empty() {
                return Err(PipelineError::Invalid(failed));
            }
        }
        Ok(Run::new(Dataset::from_reader(&mut reader)?))
    }

    /// Run the aggregate checks and persist the diagnostics artifact
    pub fn check_feasibility(&self, run: &Run) -> Result<FeasibilityReport, PipelineError> {
        let report = feasibility::check(&run.dataset);

        let mut status = self.stored_status(Artifact::Input)?;
        status.set("validate_datetime", self.config.clock.timestamp());
        let mut workbook = Workbook::new(status);
        workbook.push(FEASIBILITY_SHEET, report.status.to_table());
        for (name, table) in &report.details {
            workbook.push(*name, table.clone());
        }
        self.storage.save(Artifact::Error, &workbook.to_bytes()?)?;
        Ok(report)
    }

    /// Solve with the named backend, or the configured default.
    ///
    /// An unknown backend name is recorded as an unavailable solver.
    pub fn optimize(&self, run: &mut Run, backend: Option<&str>) -> Result<SolveRecord, PipelineError> {
        match self.config.solver(backend) {
            Ok(solver) => Ok(self.optimize_with(run, &solver)),
            Err(ConfigError::Backend(e)) => {
                let message = e.to_string();
                Ok(run.solve_by(&self.config, |_| Solution::unavailable(message)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn optimize_with(&self, run: &mut Run, solver: &Solver) -> SolveRecord {
        run.solve(solver, &self.config)
    }

    /// Persist the visualization artifact
    pub fn write_plot_report(&self, run: &Run) -> Result<Projection, PipelineError> {
        self.write_report(run, Artifact::Plot, "plot_datetime", Projection::plot_sheets)
    }

    /// Persist the tabular output artifact
    pub fn write_output_report(&self, run: &Run) -> Result<Projection, PipelineError> {
        self.write_report(run, Artifact::Output, "output_datetime", Projection::output_sheets)
    }

    fn write_report(
        &self,
        run: &Run,
        artifact: Artifact,
        stamp: &str,
        sheets: fn(&Projection) -> Vec<(&'static str, Table)>,
    ) -> Result<Projection, PipelineError> {
        let (Some(record), Some(projection)) = (run.record(), run.projection()) else {
            return Err(PipelineError::NotSolved);
        };

        let mut status = self.latest_status()?;
        record.write_to(&mut status);
        status.set(stamp, self.config.clock.timestamp());

        let mut workbook = Workbook::new(status);
        for (name, table) in sheets(&projection) {
            workbook.push(name, table);
        }
        self.storage.save(artifact, &workbook.to_bytes()?)?;
        info!(artifact = %artifact, "wrote report");
        Ok(projection)
    }

    /// Fetch an artifact for download
    pub fn retrieve(&self, artifact: Artifact) -> Result<Vec<u8>, PipelineError> {
        match artifact {
            Artifact::InputTemplate => Ok(input_template()?),
            stored => Ok(self.storage.load(stored)?),
        }
    }

    /// Status record of the most advanced persisted stage
    pub fn latest_status(&self) -> Result<StatusRecord, PipelineError> {
        if self.storage.exists(Artifact::Error) {
            self.stored_status(Artifact::Error)
        } else {
            self.stored_status(Artifact::Input)
        }
    }

    fn stored_status(&self, artifact: Artifact) -> Result<StatusRecord, PipelineError> {
        let bytes = self.storage.load(artifact)?;
        Ok(WorkbookReader::new(bytes)?.status()?)
    }
}

/// Header-only upload workbook covering every declared sheet
pub fn input_template() -> Result<Vec<u8>, WorkbookError> {
    let mut workbook = Workbook::new(StatusRecord::new());
    for sheet in SHEETS {
        workbook.push(sheet.name, sheet.empty_table());
    }
    workbook.to_bytes()
}
