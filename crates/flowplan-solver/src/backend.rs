use std::ffi::OsStr;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use good_lp::solvers::lp_solvers::{CbcSolver, GlpkSolver, LpSolver};
use good_lp::solvers::{ResolutionError, Solution as _, Solver as LpBackend, SolverModel};
use good_lp::{Expression, ProblemVariables, constraint, variable};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::problem::{ConstraintOp, MilpProblem, Sense, VariableKind};
use crate::solution::Solution;

/// Solver backends a problem can be dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Backend {
    /// COIN-OR branch and cut, run as an external process
    Cbc,
    /// GNU linear programming kit (`glpsol`), run as an external process
    Glpk,
    /// Pure-Rust branch and bound, run in-process
    Microlp,
}

#[derive(Debug, Error)]
#[error("Unknown solver backend: {0} (expected cbc, glpk or microlp)")]
pub struct UnknownBackend(pub String);

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Cbc, Backend::Glpk, Backend::Microlp];

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Cbc => "cbc",
            Backend::Glpk => "glpk",
            Backend::Microlp => "microlp",
        }
    }

    /// Executable looked up on PATH for external backends
    pub fn binary_name(&self) -> Option<&'static str> {
        match self {
            Backend::Cbc => Some("cbc"),
            Backend::Glpk => Some("glpsol"),
            Backend::Microlp => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backend::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownBackend(s.to_string()))
    }
}

/// Dispatches MILP problems to a configured backend
#[derive(Debug, Clone)]
pub struct Solver {
    backend: Backend,
    /// Explicit executable for external backends
    executable: Option<PathBuf>,
    /// Relative tolerance when auditing returned values against the constraints
    tolerance: f64,
}

impl Solver {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            executable: None,
            tolerance: 1e-6,
        }
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Locate the executable for an external backend.
    ///
    /// A configured path (absolute, or a bare name) wins over the backend's
    /// default binary name; both are resolved through PATH rules. In-process
    /// backends resolve to `None`.
    pub fn resolve_executable(&self) -> Result<Option<PathBuf>, String> {
        let Some(binary) = self.backend.binary_name() else {
            return Ok(None);
        };
        let candidate = self
            .executable
            .as_deref()
            .map(|p| p.as_os_str())
            .unwrap_or_else(|| OsStr::new(binary));

        which::which(candidate).map(Some).map_err(|e| {
            format!(
                "{} solver executable {} not found: {}",
                self.backend,
                candidate.to_string_lossy(),
                e
            )
        })
    }

    /// Solve the problem. Failures are reported in the returned status, never raised.
    pub fn solve(&self, problem: &MilpProblem) -> Solution {
        debug!(
            backend = %self.backend,
            variables = problem.num_variables(),
            binaries = problem.num_binaries(),
            constraints = problem.num_constraints(),
            "dispatching problem"
        );
        let started = Instant::now();

        let result = match self.backend {
            Backend::Microlp => run(problem, good_lp::solvers::microlp::microlp),
            Backend::Cbc | Backend::Glpk => {
                let executable = match self.resolve_executable() {
                    Ok(Some(path)) => path.to_string_lossy().into_owned(),
                    Ok(None) => return Solution::error("backend has no executable"),
                    Err(message) => {
                        warn!("{}", message);
                        return Solution::unavailable(message);
                    }
                };
                if self.backend == Backend::Cbc {
                    run(problem, LpSolver(CbcSolver::new().command_name(executable)))
                } else {
                    run(problem, LpSolver(GlpkSolver::new().command_name(executable)))
                }
            }
        };

        let solution = match result {
            Ok(values) => {
                let objective = problem.evaluate_objective(&values);
                let violations = problem.violations(&values, self.tolerance);
                for v in &violations {
                    warn!(
                        constraint = %v.constraint,
                        required = v.required,
                        actual = v.actual,
                        "solution violates constraint"
                    );
                }
                let mut solution = Solution::optimal(values, objective);
                solution.violations = violations;
                solution
            }
            Err(e @ ResolutionError::Infeasible) => Solution::infeasible().with_message(e.to_string()),
            Err(e @ ResolutionError::Unbounded) => Solution::unbounded().with_message(e.to_string()),
            Err(e) => Solution::error(e.to_string()),
        };

        info!(
            backend = %self.backend,
            status = %solution.status,
            termination = %solution.termination,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "solve finished"
        );
        solution
    }
}

/// Translate the problem into `good_lp` terms and solve it with `solver`
fn run<S>(problem: &MilpProblem, solver: S) -> Result<Vec<f64>, ResolutionError>
where
    S: LpBackend,
    S::Model: SolverModel<Error = ResolutionError>,
{
    let mut vars = ProblemVariables::new();
    let handles: Vec<good_lp::Variable> = problem
        .variables
        .iter()
        .map(|v| {
            let mut def = variable().min(v.lower);
            if let Some(upper) = v.upper {
                def = def.max(upper);
            }
            if v.kind == VariableKind::Binary {
                def = def.integer();
            }
            vars.add(def)
        })
        .collect();

    let linear = |terms: &[(usize, f64)]| {
        let mut expr = Expression::from(0.0);
        for &(j, coef) in terms {
            expr += coef * handles[j];
        }
        expr
    };

    let objective = linear(&problem.objective.terms);
    let unsolved = match problem.objective.sense {
        Sense::Maximize => vars.maximise(objective),
        Sense::Minimize => vars.minimise(objective),
    };
    let mut model = unsolved.using(solver);

    for c in &problem.constraints {
        let lhs = linear(&c.terms);
        let rhs = c.rhs;
        let constraint = match c.op {
            ConstraintOp::Le => constraint!(lhs <= rhs),
            ConstraintOp::Ge => constraint!(lhs >= rhs),
            ConstraintOp::Eq => constraint!(lhs == rhs),
        };
        model.add_constraint(constraint);
    }

    let solution = model.solve()?;
    Ok(handles.iter().map(|v| solution.value(*v)).collect())
}
