/// Represents a mixed-integer linear programming problem
#[derive(Debug, Clone)]
pub struct MilpProblem {
    /// Decision variables, referenced by index from constraints and objective
    pub variables: Vec<Variable>,
    /// Objective function
    pub objective: Objective,
    /// Constraints
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone)]
pub struct Variable {
    /// Variable name (for diagnostics)
    pub name: String,
    pub kind: VariableKind,
    /// Lower bound
    pub lower: f64,
    /// Upper bound, `None` when unbounded above
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VariableKind {
    /// Non-negative real
    Continuous,
    /// Integer restricted to {0, 1}
    Binary,
}

#[derive(Debug, Clone)]
pub struct Objective {
    /// Sparse (variable index, coefficient) terms
    pub terms: Vec<(usize, f64)>,
    /// Whether to minimize or maximize
    pub sense: Sense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sense {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    /// Name/label for the constraint (for diagnostics)
    pub name: String,
    /// Sparse (variable index, coefficient) terms
    pub terms: Vec<(usize, f64)>,
    /// Comparison operator
    pub op: ConstraintOp,
    /// Right-hand side value
    pub rhs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

/// A constraint not satisfied by a candidate assignment
#[derive(Debug, Clone)]
pub struct ConstraintViolation {
    /// Constraint name
    pub constraint: String,
    /// Required value (from constraint RHS)
    pub required: f64,
    /// Actual left-hand side value
    pub actual: f64,
    /// How much the constraint is violated by
    pub violation_amount: f64,
}

impl MilpProblem {
    pub fn new(sense: Sense) -> Self {
        Self {
            variables: Vec::new(),
            objective: Objective {
                terms: Vec::new(),
                sense,
            },
            constraints: Vec::new(),
        }
    }

    /// Add a variable and return its index
    pub fn add_variable(&mut self, name: impl Into<String>, kind: VariableKind) -> usize {
        let upper = match kind {
            VariableKind::Continuous => None,
            VariableKind::Binary => Some(1.0),
        };
        self.variables.push(Variable {
            name: name.into(),
            kind,
            lower: 0.0,
            upper,
        });
        self.variables.len() - 1
    }

    /// Tighten a variable's bounds, e.g. to fix a binary decision
    pub fn set_bounds(&mut self, index: usize, lower: f64, upper: Option<f64>) {
        if let Some(var) = self.variables.get_mut(index) {
            var.lower = lower;
            var.upper = upper;
        }
    }

    pub fn set_objective(&mut self, terms: Vec<(usize, f64)>) {
        self.objective.terms = terms;
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        terms: Vec<(usize, f64)>,
        op: ConstraintOp,
        rhs: f64,
    ) {
        self.constraints.push(Constraint {
            name: name.into(),
            terms,
            op,
            rhs,
        });
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn num_binaries(&self) -> usize {
        self.variables
            .iter()
            .filter(|v| v.kind == VariableKind::Binary)
            .count()
    }

    /// Objective value of an assignment
    pub fn evaluate_objective(&self, values: &[f64]) -> f64 {
        dot(&self.objective.terms, values)
    }

    /// Find which constraints are violated by a given assignment
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        for c in &self.constraints {
            let lhs = dot(&c.terms, values);
            // Scale tolerance with the magnitude of the bound
            let tol = tolerance * c.rhs.abs().max(1.0);

            let violation_amount = match c.op {
                ConstraintOp::Le if lhs > c.rhs + tol => lhs - c.rhs,
                ConstraintOp::Ge if lhs < c.rhs - tol => c.rhs - lhs,
                ConstraintOp::Eq if (lhs - c.rhs).abs() > tol => (lhs - c.rhs).abs(),
                _ => continue,
            };

            violations.push(ConstraintViolation {
                constraint: c.name.clone(),
                required: c.rhs,
                actual: lhs,
                violation_amount,
            });
        }

        violations
    }
}

fn dot(terms: &[(usize, f64)], values: &[f64]) -> f64 {
    terms
        .iter()
        .map(|&(j, coef)| coef * values.get(j).copied().unwrap_or(0.0))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_variables_are_bounded() {
        let mut problem = MilpProblem::new(Sense::Maximize);
        let x = problem.add_variable("x", VariableKind::Continuous);
        let y = problem.add_variable("y", VariableKind::Binary);

        assert_eq!(problem.variables[x].upper, None);
        assert_eq!(problem.variables[y].upper, Some(1.0));
        assert_eq!(problem.num_binaries(), 1);
    }

    #[test]
    fn test_violations() {
        // x + y <= 4, x >= 1, x - y == 0
        let mut problem = MilpProblem::new(Sense::Minimize);
        let x = problem.add_variable("x", VariableKind::Continuous);
        let y = problem.add_variable("y", VariableKind::Continuous);
        problem.add_constraint("sum", vec![(x, 1.0), (y, 1.0)], ConstraintOp::Le, 4.0);
        problem.add_constraint("x_min", vec![(x, 1.0)], ConstraintOp::Ge, 1.0);
        problem.add_constraint("balance", vec![(x, 1.0), (y, -1.0)], ConstraintOp::Eq, 0.0);

        assert!(problem.violations(&[2.0, 2.0], 1e-9).is_empty());

        let violations = problem.violations(&[0.0, 5.0], 1e-9);
        let names: Vec<&str> = violations.iter().map(|v| v.constraint.as_str()).collect();
        assert_eq!(names, vec!["sum", "x_min", "balance"]);
        assert!((violations[0].violation_amount - 1.0).abs() < 1e-9);
        assert!((violations[2].actual + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_objective() {
        let mut problem = MilpProblem::new(Sense::Maximize);
        let x = problem.add_variable("x", VariableKind::Continuous);
        let open = problem.add_variable("open", VariableKind::Binary);
        problem.set_objective(vec![(x, 3.0), (open, -10.0)]);

        assert!((problem.evaluate_objective(&[50.0, 1.0]) - 140.0).abs() < 1e-9);
    }
}
