use std::fmt;

/// Result of an optimization run.
#[derive(Debug, Clone)]
pub struct OptimResult {
    /// Solution point.
    pub x: Vec<f64>,
    /// Objective value at the solution.
    pub value: f64,
    /// Constraint values at the solution.
    pub constraints: Vec<f64>,
    /// Constraint multipliers at the solution.
    pub multipliers: Vec<f64>,
    /// Reason for termination.
    pub termination: TerminationReason,
}

impl OptimResult {
    /// Whether the solver reports a (locally) optimal point.
    pub fn is_success(&self) -> bool {
        matches!(
            self.termination,
            TerminationReason::Optimal | TerminationReason::AcceptableLevel
        )
    }
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TerminationReason {
    /// Converged to the requested tolerance.
    Optimal,
    /// Converged to the acceptable tolerance only.
    AcceptableLevel,
    /// A feasible point was found (square problems).
    FeasiblePoint,
    /// The problem appears locally infeasible.
    Infeasible,
    /// Reached the maximum number of iterations.
    MaxIterations,
    /// Reached the time limit.
    MaxTime,
    /// Iterates diverged; the problem may be unbounded.
    Diverging,
    /// Step size fell below machine precision.
    StepSize,
    /// A user callback asked to stop.
    UserStop,
    /// A numerical error occurred (NaN, failed restoration, bad step).
    NumericalError,
    /// The problem or the options were rejected.
    InvalidProblem,
    /// Any other internal failure.
    InternalError,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Optimal => write!(f, "optimal solution found"),
            TerminationReason::AcceptableLevel => write!(f, "solved to acceptable level"),
            TerminationReason::FeasiblePoint => write!(f, "feasible point found"),
            TerminationReason::Infeasible => write!(f, "problem is infeasible"),
            TerminationReason::MaxIterations => write!(f, "maximum iterations reached"),
            TerminationReason::MaxTime => write!(f, "time limit reached"),
            TerminationReason::Diverging => write!(f, "iterates diverging"),
            TerminationReason::StepSize => write!(f, "step size below tolerance"),
            TerminationReason::UserStop => write!(f, "stopped by user"),
            TerminationReason::NumericalError => write!(f, "numerical error"),
            TerminationReason::InvalidProblem => write!(f, "invalid problem definition"),
            TerminationReason::InternalError => write!(f, "internal solver error"),
        }
    }
}
