//! Fill in the derivative slots of an [`OptimizationFunction`].

use std::sync::Arc;

use num_dual::DualNum;
use tracing::debug;

use crate::api::{self, DualFn};
use crate::error::AdError;
use crate::function::{
    BoundConsFn, BoundConsHessFn, BoundGradFn, BoundHvFn, BoundLagHessFn, BoundMatFn,
    InstantiatedFunction, Objective, OptimizationFunction, ValueFn,
};
use crate::sparse::{
    column_coloring, detect_hessian_sparsity, detect_jacobian_sparsity, greedy_coloring, Coloring,
    SparsityPattern,
};

/// Differentiation backend used for synthesized derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdBackend {
    /// Dense forward mode: one pass per input (or input pair for Hessians).
    #[default]
    ForwardDiff,
    /// Forward mode with sparsity patterns and coloring. Prototypes on the
    /// problem are used when present, otherwise patterns are detected at
    /// the instantiation point.
    SparseForwardDiff,
}

impl AdBackend {
    pub fn is_sparse(&self) -> bool {
        matches!(self, AdBackend::SparseForwardDiff)
    }
}

/// Resolve every derivative slot of `f` and bind the parameters `p`.
///
/// Callbacks already present on `f` are kept and only wrapped to pass `p`.
/// Missing ones are synthesized with forward-mode AD through `backend`.
/// The Hessian-vector product, when missing, materializes the full Hessian
/// and multiplies it by the vector.
///
/// `x` is the point used for sparsity detection and shape checks.
pub fn instantiate_function<O: Objective + 'static>(
    f: OptimizationFunction<O>,
    x: &[f64],
    backend: AdBackend,
    p: &[f64],
    num_cons: usize,
) -> Result<InstantiatedFunction, AdError> {
    let n = x.len();
    validate(&f, n, num_cons)?;

    let hess_synthesized = f.hess.is_none();
    let cons_h_synthesized = f.cons_h.is_none();

    let OptimizationFunction {
        objective,
        grad,
        hess,
        hv,
        cons_j,
        cons_h,
        lag_h,
        hess_prototype,
        cons_jac_prototype,
        cons_hess_prototype,
    } = f;
    let obj = Arc::new(objective);
    let p: Arc<[f64]> = Arc::from(p);

    let f_val: ValueFn = {
        let (obj, p) = (obj.clone(), p.clone());
        Box::new(move |x: &[f64]| obj.value(x, &p))
    };

    let grad: BoundGradFn = match grad {
        Some(user) => {
            let p = p.clone();
            Arc::new(move |g: &mut [f64], x: &[f64]| user(g, x, &p))
        }
        None => {
            debug!(dim = n, "synthesizing gradient with forward mode");
            let (obj, p) = (obj.clone(), p.clone());
            Arc::new(move |g: &mut [f64], x: &[f64]| {
                g.copy_from_slice(&api::gradient(|xd| obj.value(xd, &p), x));
            })
        }
    };

    let hess_prototype = hess_prototype.map(|pat| symmetrize(pat, n));
    let (hess, hess_prototype): (BoundMatFn, _) = match hess {
        Some(user) => {
            let p = p.clone();
            let wrapped: BoundMatFn = Arc::new(move |h: &mut [Vec<f64>], x: &[f64]| user(h, x, &p));
            (wrapped, hess_prototype)
        }
        None if backend.is_sparse() => {
            let pattern = hess_prototype
                .unwrap_or_else(|| detect_hessian_sparsity(|xd| obj.value(xd, &p), x));
            let coloring = greedy_coloring(&pattern);
            debug!(
                nnz = pattern.nnz(),
                colors = coloring.num_colors,
                "synthesizing colored Hessian"
            );
            let (obj, p, pat) = (obj.clone(), p.clone(), pattern.clone());
            let synthesized: BoundMatFn = Arc::new(move |h: &mut [Vec<f64>], x: &[f64]| {
                let value = ObjectiveValue { obj: &*obj, p: &p };
                let m = api::sparse_hessian(&value, x, &pat, &coloring);
                copy_matrix(h, &m);
            });
            (synthesized, Some(pattern))
        }
        None => {
            debug!(dim = n, "synthesizing dense Hessian");
            let (obj, p) = (obj.clone(), p.clone());
            let synthesized: BoundMatFn = Arc::new(move |h: &mut [Vec<f64>], x: &[f64]| {
                copy_matrix(h, &api::hessian(|xd| obj.value(xd, &p), x));
            });
            (synthesized, hess_prototype)
        }
    };

    let hv: BoundHvFn = match hv {
        Some(user) => {
            let p = p.clone();
            Box::new(move |out: &mut [f64], x: &[f64], v: &[f64]| user(out, x, v, &p))
        }
        None => {
            let hess = hess.clone();
            Box::new(move |out: &mut [f64], x: &[f64], v: &[f64]| {
                let mut h = vec![vec![0.0; x.len()]; x.len()];
                hess(&mut h, x);
                out.copy_from_slice(&api::hvp_dense(&h, v));
            })
        }
    };

    if num_cons == 0 {
        let lag_h: BoundLagHessFn = match lag_h {
            Some(user) => {
                let p = p.clone();
                Box::new(move |h: &mut [Vec<f64>], x: &[f64], sigma: f64, mu: &[f64]| {
                    user(h, x, sigma, mu, &p)
                })
            }
            None => {
                let hess = hess.clone();
                Box::new(move |h: &mut [Vec<f64>], x: &[f64], sigma: f64, _mu: &[f64]| {
                    hess(h, x);
                    scale_matrix(h, sigma);
                })
            }
        };
        return Ok(InstantiatedFunction {
            dim: n,
            num_cons,
            f: f_val,
            grad,
            hess,
            hv,
            cons: None,
            cons_j: None,
            cons_h: None,
            lag_h,
            lag_hess_prototype: hess_prototype.clone(),
            hess_prototype,
            cons_jac_prototype: None,
            cons_hess_prototype: None,
        });
    }

    let cons: BoundConsFn = {
        let (obj, p) = (obj.clone(), p.clone());
        Box::new(move |res: &mut [f64], x: &[f64]| {
            res.fill(0.0);
            obj.constraints(x, &p, res);
        })
    };

    let (cons_j, cons_jac_prototype): (BoundMatFn, _) = match cons_j {
        Some(user) => {
            let p = p.clone();
            let wrapped: BoundMatFn = Arc::new(move |j: &mut [Vec<f64>], x: &[f64]| user(j, x, &p));
            (wrapped, cons_jac_prototype)
        }
        None if backend.is_sparse() => {
            let pattern = cons_jac_prototype.unwrap_or_else(|| {
                detect_jacobian_sparsity(|xd| eval_constraints(&*obj, xd, &p, num_cons), x, num_cons)
            });
            let coloring = column_coloring(&pattern);
            debug!(
                nnz = pattern.nnz(),
                colors = coloring.num_colors,
                "synthesizing colored constraint Jacobian"
            );
            let (obj, p, pat) = (obj.clone(), p.clone(), pattern.clone());
            let synthesized: BoundMatFn = Arc::new(move |j: &mut [Vec<f64>], x: &[f64]| {
                let m = api::sparse_jacobian(
                    |xd| eval_constraints(&*obj, xd, &p, num_cons),
                    x,
                    &pat,
                    &coloring,
                );
                copy_matrix(j, &m);
            });
            (synthesized, Some(pattern))
        }
        None => {
            debug!(dim = n, num_cons, "synthesizing dense constraint Jacobian");
            let (obj, p) = (obj.clone(), p.clone());
            let synthesized: BoundMatFn = Arc::new(move |j: &mut [Vec<f64>], x: &[f64]| {
                let m = api::jacobian(|xd| eval_constraints(&*obj, xd, &p, num_cons), x, num_cons);
                copy_matrix(j, &m);
            });
            (synthesized, cons_jac_prototype)
        }
    };

    let cons_hess_prototype =
        cons_hess_prototype.map(|pats| pats.into_iter().map(|pat| symmetrize(pat, n)).collect::<Vec<_>>());
    let (cons_h, cons_hess_prototype): (BoundConsHessFn, _) = match cons_h {
        Some(user) => {
            let p = p.clone();
            let wrapped: BoundConsHessFn =
                Arc::new(move |h: &mut [Vec<Vec<f64>>], x: &[f64]| user(h, x, &p));
            (wrapped, cons_hess_prototype)
        }
        None if backend.is_sparse() => {
            let patterns: Vec<SparsityPattern> = match cons_hess_prototype {
                Some(pats) => pats,
                None => (0..num_cons)
                    .map(|i| {
                        detect_hessian_sparsity(|xd| eval_constraints(&*obj, xd, &p, num_cons)[i], x)
                    })
                    .collect(),
            };
            let colorings: Vec<Coloring> = patterns.iter().map(greedy_coloring).collect();
            debug!(
                num_cons,
                max_colors = colorings.iter().map(|c| c.num_colors).max().unwrap_or(0),
                "synthesizing colored constraint Hessians"
            );
            let (obj, p, pats) = (obj.clone(), p.clone(), patterns.clone());
            let synthesized: BoundConsHessFn = Arc::new(move |h: &mut [Vec<Vec<f64>>], x: &[f64]| {
                for (i, (pat, coloring)) in pats.iter().zip(&colorings).enumerate() {
                    let value = ConstraintValue {
                        obj: &*obj,
                        p: &p,
                        index: i,
                        num_cons,
                    };
                    let m = api::sparse_hessian(&value, x, pat, coloring);
                    copy_matrix(&mut h[i], &m);
                }
            });
            (synthesized, Some(patterns))
        }
        None => {
            debug!(dim = n, num_cons, "synthesizing dense constraint Hessians");
            let (obj, p) = (obj.clone(), p.clone());
            let synthesized: BoundConsHessFn = Arc::new(move |h: &mut [Vec<Vec<f64>>], x: &[f64]| {
                for (i, hi) in h.iter_mut().enumerate().take(num_cons) {
                    let m = api::hessian(|xd| eval_constraints(&*obj, xd, &p, num_cons)[i], x);
                    copy_matrix(hi, &m);
                }
            });
            (synthesized, cons_hess_prototype)
        }
    };

    let lag_hess_prototype = match (&hess_prototype, &cons_hess_prototype) {
        (Some(h), Some(cs)) => Some(SparsityPattern::symmetric(
            n,
            h.entries().chain(cs.iter().flat_map(|c| c.entries())),
        )),
        _ => None,
    };

    let lag_h: BoundLagHessFn = match lag_h {
        Some(user) => {
            let p = p.clone();
            Box::new(move |h: &mut [Vec<f64>], x: &[f64], sigma: f64, mu: &[f64]| {
                user(h, x, sigma, mu, &p)
            })
        }
        None if hess_synthesized && cons_h_synthesized => match &lag_hess_prototype {
            Some(pattern) if backend.is_sparse() => {
                let coloring = greedy_coloring(pattern);
                debug!(
                    nnz = pattern.nnz(),
                    colors = coloring.num_colors,
                    "synthesizing colored Lagrangian Hessian"
                );
                let (obj, p, pat) = (obj.clone(), p.clone(), pattern.clone());
                Box::new(move |h: &mut [Vec<f64>], x: &[f64], sigma: f64, mu: &[f64]| {
                    let lagrangian = Lagrangian {
                        obj: &*obj,
                        p: &p,
                        sigma,
                        mu,
                        num_cons,
                    };
                    copy_matrix(h, &api::sparse_hessian(&lagrangian, x, &pat, &coloring));
                })
            }
            _ => {
                debug!(dim = n, num_cons, "synthesizing dense Lagrangian Hessian");
                let (obj, p) = (obj.clone(), p.clone());
                Box::new(move |h: &mut [Vec<f64>], x: &[f64], sigma: f64, mu: &[f64]| {
                    let lagrangian = Lagrangian {
                        obj: &*obj,
                        p: &p,
                        sigma,
                        mu,
                        num_cons,
                    };
                    copy_matrix(h, &api::hessian(|xd| lagrangian.eval(xd), x));
                })
            }
        },
        None => {
            // A supplied hess or cons_h: combine the resolved callbacks.
            let (hess, cons_h) = (hess.clone(), cons_h.clone());
            let patterns = cons_hess_prototype.clone();
            Box::new(move |h: &mut [Vec<f64>], x: &[f64], sigma: f64, mu: &[f64]| {
                let dim = x.len();
                hess(h, x);
                scale_matrix(h, sigma);
                let mut ch = vec![vec![vec![0.0; dim]; dim]; num_cons];
                cons_h(&mut ch, x);
                for (i, (hi, &mui)) in ch.iter().zip(mu).enumerate() {
                    match patterns.as_ref().map(|pats| &pats[i]) {
                        Some(pat) => {
                            for (r, c) in pat.entries() {
                                h[r][c] += mui * hi[r][c];
                                if r != c {
                                    h[c][r] += mui * hi[c][r];
                                }
                            }
                        }
                        None => {
                            for (row, src) in h.iter_mut().zip(hi) {
                                for (dst, s) in row.iter_mut().zip(src) {
                                    *dst += mui * s;
                                }
                            }
                        }
                    }
                }
            })
        }
    };

    Ok(InstantiatedFunction {
        dim: n,
        num_cons,
        f: f_val,
        grad,
        hess,
        hv,
        cons: Some(cons),
        cons_j: Some(cons_j),
        cons_h: Some(cons_h),
        lag_h,
        hess_prototype,
        cons_jac_prototype,
        cons_hess_prototype,
        lag_hess_prototype,
    })
}

fn validate<O>(f: &OptimizationFunction<O>, n: usize, num_cons: usize) -> Result<(), AdError> {
    if n == 0 {
        return Err(AdError::EmptyPoint);
    }
    if num_cons == 0 {
        let slot = if f.cons_j.is_some() {
            Some("cons_j")
        } else if f.cons_h.is_some() {
            Some("cons_h")
        } else if f.cons_jac_prototype.is_some() {
            Some("cons_jac_prototype")
        } else if f.cons_hess_prototype.is_some() {
            Some("cons_hess_prototype")
        } else {
            None
        };
        if let Some(slot) = slot {
            return Err(AdError::UnusedConstraintSlot { slot });
        }
    }
    if let Some(pat) = &f.hess_prototype {
        check_shape("hess", pat, n, n)?;
    }
    if let Some(pat) = &f.cons_jac_prototype {
        check_shape("cons_jac", pat, num_cons, n)?;
    }
    if let Some(pats) = &f.cons_hess_prototype {
        if pats.len() != num_cons {
            return Err(AdError::ConsHessPrototypeCount {
                expected: num_cons,
                got: pats.len(),
            });
        }
        for pat in pats {
            check_shape("cons_hess", pat, n, n)?;
        }
    }
    Ok(())
}

fn check_shape(name: &'static str, pat: &SparsityPattern, rows: usize, cols: usize) -> Result<(), AdError> {
    let in_bounds = pat.entries().all(|(r, c)| r < rows && c < cols);
    if pat.nrows != rows || pat.ncols != cols || !in_bounds {
        return Err(AdError::PrototypeShape {
            name,
            rows,
            cols,
            got_rows: pat.nrows,
            got_cols: pat.ncols,
        });
    }
    Ok(())
}

fn symmetrize(pattern: SparsityPattern, n: usize) -> SparsityPattern {
    if pattern.is_symmetric() {
        pattern
    } else {
        SparsityPattern::symmetric(n, pattern.entries())
    }
}

/// Objective value with the parameters bound.
struct ObjectiveValue<'a, O> {
    obj: &'a O,
    p: &'a [f64],
}

impl<O: Objective> DualFn for ObjectiveValue<'_, O> {
    fn eval<D: DualNum<f64> + Copy>(&self, x: &[D]) -> D {
        self.obj.value(x, self.p)
    }
}

/// A single constraint `c_index`.
struct ConstraintValue<'a, O> {
    obj: &'a O,
    p: &'a [f64],
    index: usize,
    num_cons: usize,
}

impl<O: Objective> DualFn for ConstraintValue<'_, O> {
    fn eval<D: DualNum<f64> + Copy>(&self, x: &[D]) -> D {
        eval_constraints(self.obj, x, self.p, self.num_cons)[self.index]
    }
}

/// `sigma * f(x) + sum_i mu_i * c_i(x)`.
struct Lagrangian<'a, O> {
    obj: &'a O,
    p: &'a [f64],
    sigma: f64,
    mu: &'a [f64],
    num_cons: usize,
}

impl<O: Objective> DualFn for Lagrangian<'_, O> {
    fn eval<D: DualNum<f64> + Copy>(&self, x: &[D]) -> D {
        let mut value = self.obj.value(x, self.p) * D::from(self.sigma);
        let cons = eval_constraints(self.obj, x, self.p, self.num_cons);
        for (c, &mu) in cons.iter().zip(self.mu) {
            value = value + *c * D::from(mu);
        }
        value
    }
}

fn eval_constraints<O: Objective, D: DualNum<f64> + Copy>(obj: &O, x: &[D], p: &[f64], m: usize) -> Vec<D> {
    let mut res = vec![D::from(0.0); m];
    obj.constraints(x, p, &mut res);
    res
}

fn copy_matrix(dst: &mut [Vec<f64>], src: &[Vec<f64>]) {
    for (d, s) in dst.iter_mut().zip(src) {
        d.copy_from_slice(s);
    }
}

fn scale_matrix(m: &mut [Vec<f64>], s: f64) {
    for row in m.iter_mut() {
        for v in row.iter_mut() {
            *v *= s;
        }
    }
}
