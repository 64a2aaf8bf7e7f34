use std::fmt;

use crate::problem::ConstraintViolation;

/// The result of handing a MILP problem to a backend
#[derive(Debug, Clone)]
pub struct Solution {
    /// Solver status
    pub status: SolverStatus,
    /// Why the solver stopped
    pub termination: TerminationCondition,
    /// Backend message, verbatim, when it reported one
    pub message: Option<String>,
    /// Value of every variable, `None` when no feasible solution was produced
    pub values: Option<Vec<f64>>,
    /// Objective value of `values`
    pub objective_value: Option<f64>,
    /// Constraints the returned values fail to satisfy
    pub violations: Vec<ConstraintViolation>,
}

/// Did the solver run to completion?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SolverStatus {
    /// Solver ran and produced a definite answer
    Ok,
    /// Solver ran but the answer is not a usable solution
    Warning,
    /// Solver failed internally
    Error,
    /// Solver could not be started
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TerminationCondition {
    /// An optimal solution was found
    Optimal,
    /// No assignment satisfies all constraints
    Infeasible,
    /// The objective has no finite optimum
    Unbounded,
    /// The solver executable could not be found
    Unavailable,
    /// Any other failure reported by the backend
    Error,
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SolverStatus::Ok => "ok",
            SolverStatus::Warning => "warning",
            SolverStatus::Error => "error",
            SolverStatus::Aborted => "aborted",
        })
    }
}

impl fmt::Display for TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminationCondition::Optimal => "optimal",
            TerminationCondition::Infeasible => "infeasible",
            TerminationCondition::Unbounded => "unbounded",
            TerminationCondition::Unavailable => "unavailable",
            TerminationCondition::Error => "error",
        })
    }
}

impl Solution {
    pub fn optimal(values: Vec<f64>, objective_value: f64) -> Self {
        Self {
            status: SolverStatus::Ok,
            termination: TerminationCondition::Optimal,
            message: None,
            values: Some(values),
            objective_value: Some(objective_value),
            violations: Vec::new(),
        }
    }

    pub fn infeasible() -> Self {
        Self::failed(SolverStatus::Warning, TerminationCondition::Infeasible, None)
    }

    pub fn unbounded() -> Self {
        Self::failed(SolverStatus::Warning, TerminationCondition::Unbounded, None)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::failed(
            SolverStatus::Aborted,
            TerminationCondition::Unavailable,
            Some(message.into()),
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::failed(
            SolverStatus::Error,
            TerminationCondition::Error,
            Some(message.into()),
        )
    }

    fn failed(
        status: SolverStatus,
        termination: TerminationCondition,
        message: Option<String>,
    ) -> Self {
        Self {
            status,
            termination,
            message,
            values: None,
            objective_value: None,
            violations: Vec::new(),
        }
    }

    /// Attach the backend's own wording of the outcome
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_optimal(&self) -> bool {
        self.termination == TerminationCondition::Optimal
    }

    /// Value of one variable, if the solve produced values
    pub fn value(&self, index: usize) -> Option<f64> {
        self.values.as_ref().and_then(|v| v.get(index).copied())
    }
}
