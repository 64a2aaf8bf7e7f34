mod backend;
mod problem;
mod solution;

pub use backend::{Backend, Solver, UnknownBackend};
pub use problem::{
    Constraint, ConstraintOp, ConstraintViolation, MilpProblem, Objective, Sense, Variable,
    VariableKind,
};
pub use solution::{Solution, SolverStatus, TerminationCondition};
