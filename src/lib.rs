//! Forward-mode derivative synthesis for optimization problems.
//!
//! An [`OptimizationFunction`] carries a differentiable [`Objective`] and
//! any derivative callbacks the caller already has. [`instantiate_function`]
//! keeps the supplied callbacks, synthesizes the missing ones with
//! forward-mode dual numbers from `num-dual`, and binds the problem
//! parameters so every callback of the resulting [`InstantiatedFunction`]
//! only takes the point (and multipliers or direction where relevant).
//!
//! With [`AdBackend::SparseForwardDiff`], Hessians and constraint Jacobians
//! are computed from compressed products using a greedy coloring of their
//! sparsity pattern.

pub mod api;
pub mod error;
pub mod function;
pub mod instantiate;
pub mod sparse;

pub use api::{
    gradient, hessian, hvp_dense, jacobian, jvp, sparse_hessian, sparse_jacobian, DualFn,
};
pub use error::AdError;
pub use function::{InstantiatedFunction, Objective, OptimizationFunction};
pub use instantiate::{instantiate_function, AdBackend};
pub use sparse::{column_coloring, greedy_coloring, Coloring, SparsityPattern};

/// Re-export of the dual-number types user objectives are written against.
pub use num_dual::{Dual64, DualNum, HyperDual64};
