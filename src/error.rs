use thiserror::Error;

/// Errors raised while instantiating an [`OptimizationFunction`](crate::OptimizationFunction).
///
/// These only cover shape problems detected up front. Failures inside user
/// callbacks or the AD backend are not caught here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdError {
    /// The initial point has no entries.
    #[error("initial point is empty")]
    EmptyPoint,

    /// A supplied sparsity prototype does not match the problem shape.
    #[error("{name} prototype is {got_rows}x{got_cols}, expected {rows}x{cols}")]
    PrototypeShape {
        name: &'static str,
        rows: usize,
        cols: usize,
        got_rows: usize,
        got_cols: usize,
    },

    /// The number of per-constraint Hessian prototypes differs from `num_cons`.
    #[error("expected {expected} constraint Hessian prototypes, got {got}")]
    ConsHessPrototypeCount { expected: usize, got: usize },

    /// A constraint derivative was supplied for an unconstrained problem.
    #[error("{slot} supplied but num_cons is 0")]
    UnusedConstraintSlot { slot: &'static str },
}
