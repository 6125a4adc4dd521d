//! Problem description and its instantiated (parameter-free) form.

use std::fmt;
use std::sync::Arc;

use num_dual::DualNum;

use crate::sparse::SparsityPattern;

/// A differentiable model: objective and optional constraints.
///
/// Both methods are generic over the scalar type so the same code runs on
/// plain `f64` values and on the dual numbers used to synthesize
/// derivatives. `p` is the fixed parameter vector of the problem.
///
/// ```
/// use adglue::Objective;
/// use num_dual::DualNum;
///
/// struct Rosenbrock;
///
/// impl Objective for Rosenbrock {
///     fn value<D: DualNum<f64> + Copy>(&self, x: &[D], p: &[f64]) -> D {
///         let a = D::from(p[0]) - x[0];
///         let b = x[1] - x[0] * x[0];
///         a * a + b * b * D::from(p[1])
///     }
/// }
///
/// assert_eq!(Rosenbrock.value(&[1.0, 1.0], &[1.0, 100.0]), 0.0);
/// ```
pub trait Objective: Send + Sync {
    /// Objective value at `x`.
    fn value<D: DualNum<f64> + Copy>(&self, x: &[D], p: &[f64]) -> D;

    /// Write the constraint values at `x` into `res`.
    ///
    /// Only called when the problem is instantiated with `num_cons > 0`;
    /// `res` then has `num_cons` entries, initialized to zero.
    fn constraints<D: DualNum<f64> + Copy>(&self, x: &[D], p: &[f64], res: &mut [D]) {
        let _ = (x, p, res);
    }
}

/// User gradient: `grad(G, x, p)`.
pub type GradFn = Arc<dyn Fn(&mut [f64], &[f64], &[f64]) + Send + Sync>;
/// User Hessian (or constraint Jacobian): `hess(H, x, p)`.
pub type MatFn = Arc<dyn Fn(&mut [Vec<f64>], &[f64], &[f64]) + Send + Sync>;
/// User Hessian-vector product: `hv(Hv, x, v, p)`.
pub type HvFn = Arc<dyn Fn(&mut [f64], &[f64], &[f64], &[f64]) + Send + Sync>;
/// User constraint Hessians: `cons_h(H, x, p)` with one matrix per constraint.
pub type ConsHessFn = Arc<dyn Fn(&mut [Vec<Vec<f64>>], &[f64], &[f64]) + Send + Sync>;
/// User Lagrangian Hessian: `lag_h(H, x, σ, μ, p)` for `σ·∇²f + Σ μᵢ ∇²cᵢ`.
pub type LagHessFn = Arc<dyn Fn(&mut [Vec<f64>], &[f64], f64, &[f64], &[f64]) + Send + Sync>;

/// Problem description: a model plus optional derivative callbacks and
/// sparsity hints. Empty slots are filled in by
/// [`instantiate_function`](crate::instantiate_function).
pub struct OptimizationFunction<O> {
    pub objective: O,
    pub grad: Option<GradFn>,
    pub hess: Option<MatFn>,
    pub hv: Option<HvFn>,
    pub cons_j: Option<MatFn>,
    pub cons_h: Option<ConsHessFn>,
    pub lag_h: Option<LagHessFn>,
    pub hess_prototype: Option<SparsityPattern>,
    pub cons_jac_prototype: Option<SparsityPattern>,
    pub cons_hess_prototype: Option<Vec<SparsityPattern>>,
}

impl<O: Objective> OptimizationFunction<O> {
    pub fn new(objective: O) -> Self {
        OptimizationFunction {
            objective,
            grad: None,
            hess: None,
            hv: None,
            cons_j: None,
            cons_h: None,
            lag_h: None,
            hess_prototype: None,
            cons_jac_prototype: None,
            cons_hess_prototype: None,
        }
    }

    pub fn with_grad(mut self, grad: impl Fn(&mut [f64], &[f64], &[f64]) + Send + Sync + 'static) -> Self {
        self.grad = Some(Arc::new(grad));
        self
    }

    pub fn with_hess(
        mut self,
        hess: impl Fn(&mut [Vec<f64>], &[f64], &[f64]) + Send + Sync + 'static,
    ) -> Self {
        self.hess = Some(Arc::new(hess));
        self
    }

    pub fn with_hv(
        mut self,
        hv: impl Fn(&mut [f64], &[f64], &[f64], &[f64]) + Send + Sync + 'static,
    ) -> Self {
        self.hv = Some(Arc::new(hv));
        self
    }

    pub fn with_cons_j(
        mut self,
        cons_j: impl Fn(&mut [Vec<f64>], &[f64], &[f64]) + Send + Sync + 'static,
    ) -> Self {
        self.cons_j = Some(Arc::new(cons_j));
        self
    }

    pub fn with_cons_h(
        mut self,
        cons_h: impl Fn(&mut [Vec<Vec<f64>>], &[f64], &[f64]) + Send + Sync + 'static,
    ) -> Self {
        self.cons_h = Some(Arc::new(cons_h));
        self
    }

    pub fn with_lag_h(
        mut self,
        lag_h: impl Fn(&mut [Vec<f64>], &[f64], f64, &[f64], &[f64]) + Send + Sync + 'static,
    ) -> Self {
        self.lag_h = Some(Arc::new(lag_h));
        self
    }

    pub fn with_hess_prototype(mut self, pattern: SparsityPattern) -> Self {
        self.hess_prototype = Some(pattern);
        self
    }

    pub fn with_cons_jac_prototype(mut self, pattern: SparsityPattern) -> Self {
        self.cons_jac_prototype = Some(pattern);
        self
    }

    pub fn with_cons_hess_prototype(mut self, patterns: Vec<SparsityPattern>) -> Self {
        self.cons_hess_prototype = Some(patterns);
        self
    }
}

pub type ValueFn = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;
pub type BoundGradFn = Arc<dyn Fn(&mut [f64], &[f64]) + Send + Sync>;
pub type BoundMatFn = Arc<dyn Fn(&mut [Vec<f64>], &[f64]) + Send + Sync>;
pub type BoundHvFn = Box<dyn Fn(&mut [f64], &[f64], &[f64]) + Send + Sync>;
pub type BoundConsFn = Box<dyn Fn(&mut [f64], &[f64]) + Send + Sync>;
pub type BoundConsHessFn = Arc<dyn Fn(&mut [Vec<Vec<f64>>], &[f64]) + Send + Sync>;
pub type BoundLagHessFn = Box<dyn Fn(&mut [Vec<f64>], &[f64], f64, &[f64]) + Send + Sync>;

/// A problem with every derivative slot resolved and the parameters bound.
///
/// Matrix outputs are dense and row-major; callers must pass buffers of the
/// right shape (`dim x dim` for Hessians, `num_cons x dim` for the
/// constraint Jacobian).
pub struct InstantiatedFunction {
    pub dim: usize,
    pub num_cons: usize,
    pub f: ValueFn,
    pub grad: BoundGradFn,
    pub hess: BoundMatFn,
    pub hv: BoundHvFn,
    pub cons: Option<BoundConsFn>,
    pub cons_j: Option<BoundMatFn>,
    pub cons_h: Option<BoundConsHessFn>,
    pub lag_h: BoundLagHessFn,
    pub hess_prototype: Option<SparsityPattern>,
    pub cons_jac_prototype: Option<SparsityPattern>,
    pub cons_hess_prototype: Option<Vec<SparsityPattern>>,
    /// Union of the objective and constraint Hessian patterns, when all are known.
    pub lag_hess_prototype: Option<SparsityPattern>,
}

impl InstantiatedFunction {
    /// Zeroed `dim x dim` buffer for `hess` and `lag_h`.
    pub fn hess_buffer(&self) -> Vec<Vec<f64>> {
        vec![vec![0.0; self.dim]; self.dim]
    }

    /// Zeroed `num_cons x dim` buffer for `cons_j`.
    pub fn jac_buffer(&self) -> Vec<Vec<f64>> {
        vec![vec![0.0; self.dim]; self.num_cons]
    }

    /// Zeroed buffers for `cons_h`, one `dim x dim` matrix per constraint.
    pub fn cons_hess_buffer(&self) -> Vec<Vec<Vec<f64>>> {
        vec![self.hess_buffer(); self.num_cons]
    }
}

impl fmt::Debug for InstantiatedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstantiatedFunction")
            .field("dim", &self.dim)
            .field("num_cons", &self.num_cons)
            .field("has_cons", &self.cons.is_some())
            .field("hess_prototype", &self.hess_prototype)
            .field("cons_jac_prototype", &self.cons_jac_prototype)
            .field("lag_hess_prototype", &self.lag_hess_prototype)
            .finish_non_exhaustive()
    }
}
