use thiserror::Error;

/// Errors raised while setting up or running a solve.
#[derive(Debug, Error)]
pub enum SolveError {
    /// A bound vector does not match the problem dimension.
    #[error("{name} has length {got}, expected {expected}")]
    BoundLength {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    /// The initial point does not match the problem dimension.
    #[error("initial point has length {got}, expected {expected}")]
    InitialPoint { expected: usize, got: usize },

    /// The solver rejected an option name or value.
    #[error("solver rejected option {name}")]
    InvalidOption { name: String },

    /// The solver could not be created for this problem.
    #[cfg(feature = "ipopt")]
    #[error("failed to create Ipopt problem: {0}")]
    Create(#[from] ipopt::CreateError),
}
