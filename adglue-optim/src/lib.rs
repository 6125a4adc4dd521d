//! Solver-side glue for `adglue`.
//!
//! [`SolverOptions`] holds the solver-agnostic arguments. Each
//! [`OptimizerBackend`] turns them into its own option record, warning
//! about the ones it cannot honor. With the `ipopt` feature,
//! [`IpoptProblem`] feeds an [`adglue::InstantiatedFunction`] to Ipopt.

pub mod backend;
pub mod error;
#[cfg(feature = "ipopt")]
pub mod nlp;
pub mod options;
pub mod result;
pub mod solvers;

pub use backend::{IgnoredOption, OptimizerBackend, Translated};
pub use error::SolveError;
#[cfg(feature = "ipopt")]
pub use nlp::{solve, IpoptProblem};
pub use options::{Callback, OptionValue, SolverOptions};
pub use result::{OptimResult, TerminationReason};
pub use solvers::ipopt::{Ipopt, IpoptOptions};
pub use solvers::juniper::{
    BranchStrategy, Juniper, JuniperOptions, TraverseStrategy, UnknownStrategy,
};
