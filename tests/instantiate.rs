use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use adglue::{
    hessian, instantiate_function, AdBackend, AdError, DualNum, HyperDual64, InstantiatedFunction,
    Objective, OptimizationFunction, SparsityPattern,
};
use approx::assert_relative_eq;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

// ============================================================
// Test problems
// ============================================================

/// f(x) = Σ x_i². Hessian is 2I.
struct SumOfSquares;

impl Objective for SumOfSquares {
    fn value<D: DualNum<f64> + Copy>(&self, x: &[D], _p: &[f64]) -> D {
        x.iter().fold(D::from(0.0), |acc, &xi| acc + xi * xi)
    }
}

/// Hock-Schittkowski 71: objective plus a product and a sphere constraint.
struct Hs071;

impl Objective for Hs071 {
    fn value<D: DualNum<f64> + Copy>(&self, x: &[D], _p: &[f64]) -> D {
        x[0] * x[3] * (x[0] + x[1] + x[2]) + x[2]
    }

    fn constraints<D: DualNum<f64> + Copy>(&self, x: &[D], _p: &[f64], res: &mut [D]) {
        res[0] = x[0] * x[1] * x[2] * x[3];
        res[1] = x[0] * x[0] + x[1] * x[1] + x[2] * x[2] + x[3] * x[3];
    }
}

/// Chain of couplings: f = Σ x_i x_{i+1}², constraints c_i = x_i * x_{i+1} * p[0].
struct Chain {
    n: usize,
}

impl Objective for Chain {
    fn value<D: DualNum<f64> + Copy>(&self, x: &[D], _p: &[f64]) -> D {
        let mut sum = D::from(0.0);
        for i in 0..self.n - 1 {
            sum = sum + x[i] * x[i + 1] * x[i + 1];
        }
        sum
    }

    fn constraints<D: DualNum<f64> + Copy>(&self, x: &[D], p: &[f64], res: &mut [D]) {
        for i in 0..self.n - 1 {
            res[i] = x[i] * x[i + 1] * D::from(p[0]);
        }
    }
}

const HS071_X: [f64; 4] = [1.0, 5.0, 5.0, 1.0];

fn assert_matrix_eq(a: &[Vec<f64>], b: &[Vec<f64>], tol: f64) {
    assert_eq!(a.len(), b.len());
    for (ra, rb) in a.iter().zip(b) {
        for (va, vb) in ra.iter().zip(rb) {
            assert_relative_eq!(*va, *vb, epsilon = tol);
        }
    }
}

/// `sigma * H + sum_i mu_i * C_i` from the resolved `hess` and `cons_h`.
fn combined_lagrangian(f: &InstantiatedFunction, x: &[f64], sigma: f64, mu: &[f64]) -> Vec<Vec<f64>> {
    let mut h = f.hess_buffer();
    (f.hess)(&mut h, x);
    let (_, ch) = eval_all(f, x);
    for (i, row) in h.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = sigma * *v + ch.iter().zip(mu).map(|(c, m)| m * c[i][j]).sum::<f64>();
        }
    }
    h
}

fn eval_all(f: &InstantiatedFunction, x: &[f64]) -> (Vec<Vec<f64>>, Vec<Vec<Vec<f64>>>) {
    let mut jac = f.jac_buffer();
    (f.cons_j.as_ref().unwrap())(&mut jac, x);
    let mut ch = f.cons_hess_buffer();
    (f.cons_h.as_ref().unwrap())(&mut ch, x);
    (jac, ch)
}

// ============================================================
// Supplied callbacks pass through
// ============================================================

#[test]
fn supplied_gradient_is_used_unchanged() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let f = OptimizationFunction::new(SumOfSquares).with_grad(move |g, x, p| {
        counter.fetch_add(1, Ordering::SeqCst);
        // Deliberately not the true gradient, so synthesis would be visible.
        for (gi, xi) in g.iter_mut().zip(x) {
            *gi = 42.0 * xi + p[0];
        }
    });
    let inst = instantiate_function(f, &[1.0, 2.0], AdBackend::ForwardDiff, &[0.5], 0).unwrap();

    let mut g = vec![0.0; 2];
    (inst.grad)(&mut g, &[1.0, -1.0]);
    assert_eq!(g, vec![42.5, -41.5]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn supplied_hessian_feeds_the_hvp_fallback() {
    let f = OptimizationFunction::new(SumOfSquares).with_hess(|h, _x, p| {
        for (i, row) in h.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = if i == j { p[0] } else { 1.0 };
            }
        }
    });
    let inst = instantiate_function(f, &[0.0; 3], AdBackend::ForwardDiff, &[7.0], 0).unwrap();

    let mut h = inst.hess_buffer();
    (inst.hess)(&mut h, &[0.0; 3]);
    assert_eq!(h[0], vec![7.0, 1.0, 1.0]);

    let mut hv = vec![0.0; 3];
    (inst.hv)(&mut hv, &[0.0; 3], &[1.0, 0.0, 2.0]);
    assert_eq!(hv, vec![9.0, 3.0, 15.0]);
}

#[test]
fn supplied_hvp_and_lagrangian_hessian_receive_parameters() {
    let f = OptimizationFunction::new(SumOfSquares)
        .with_hv(|out, _x, v, p| {
            for (o, vi) in out.iter_mut().zip(v) {
                *o = p[0] * vi;
            }
        })
        .with_lag_h(|h, _x, sigma, _mu, p| {
            for row in h.iter_mut() {
                row.fill(sigma * p[0]);
            }
        });
    let inst = instantiate_function(f, &[1.0, 1.0], AdBackend::ForwardDiff, &[3.0], 0).unwrap();

    let mut hv = vec![0.0; 2];
    (inst.hv)(&mut hv, &[1.0, 1.0], &[1.0, 2.0]);
    assert_eq!(hv, vec![3.0, 6.0]);

    let mut h = inst.hess_buffer();
    (inst.lag_h)(&mut h, &[1.0, 1.0], 2.0, &[]);
    assert_eq!(h, vec![vec![6.0, 6.0], vec![6.0, 6.0]]);
}

#[test]
fn supplied_constraint_derivatives_are_used_unchanged() {
    let f = OptimizationFunction::new(Hs071)
        .with_cons_j(|j, _x, _p| {
            for row in j.iter_mut() {
                row.fill(-1.0);
            }
        })
        .with_cons_h(|h, _x, _p| {
            for m in h.iter_mut() {
                for row in m.iter_mut() {
                    row.fill(3.0);
                }
            }
        });
    let inst = instantiate_function(f, &HS071_X, AdBackend::SparseForwardDiff, &[], 2).unwrap();

    let (jac, ch) = eval_all(&inst, &HS071_X);
    assert!(jac.iter().flatten().all(|&v| v == -1.0));
    assert!(ch.iter().flatten().flatten().all(|&v| v == 3.0));
    assert!(inst.cons_jac_prototype.is_none());
}

// ============================================================
// Synthesized constraint derivatives
// ============================================================

#[test]
fn hs071_constraint_derivatives() {
    let inst = instantiate_function(
        OptimizationFunction::new(Hs071),
        &HS071_X,
        AdBackend::ForwardDiff,
        &[],
        2,
    )
    .unwrap();
    let x = [1.0, 2.0, 3.0, 4.0];

    let mut c = vec![0.0; 2];
    (inst.cons.as_ref().unwrap())(&mut c, &x);
    assert_eq!(c, vec![24.0, 30.0]);

    let (jac, ch) = eval_all(&inst, &x);
    assert_matrix_eq(
        &jac,
        &[vec![24.0, 12.0, 8.0, 6.0], vec![2.0, 4.0, 6.0, 8.0]],
        1e-12,
    );
    // ∂²(x0 x1 x2 x3)/∂x0∂x1 = x2 x3
    assert_relative_eq!(ch[0][0][1], 12.0, epsilon = 1e-12);
    assert_relative_eq!(ch[0][2][3], 2.0, epsilon = 1e-12);
    assert_relative_eq!(ch[0][1][1], 0.0, epsilon = 1e-12);
    for i in 0..4 {
        assert_relative_eq!(ch[1][i][i], 2.0, epsilon = 1e-12);
    }
}

#[test]
fn lagrangian_hessian_combines_objective_and_constraints() {
    let inst = instantiate_function(
        OptimizationFunction::new(Hs071),
        &HS071_X,
        AdBackend::ForwardDiff,
        &[],
        2,
    )
    .unwrap();
    let x = [1.0, 2.0, 3.0, 4.0];
    let (sigma, mu) = (0.5, [2.0, -1.0]);

    let mut h = inst.hess_buffer();
    (inst.hess)(&mut h, &x);
    let (_, ch) = eval_all(&inst, &x);

    let mut lag = inst.hess_buffer();
    (inst.lag_h)(&mut lag, &x, sigma, &mu);
    for i in 0..4 {
        for j in 0..4 {
            let expected = sigma * h[i][j] + mu[0] * ch[0][i][j] + mu[1] * ch[1][i][j];
            assert_relative_eq!(lag[i][j], expected, epsilon = 1e-12);
        }
    }
}

#[test]
fn sparse_backend_matches_dense_backend() {
    let n = 6;
    let x: Vec<f64> = (0..n).map(|i| 0.3 + 0.4 * i as f64).collect();
    let p = [2.5];

    let dense = instantiate_function(
        OptimizationFunction::new(Chain { n }),
        &x,
        AdBackend::ForwardDiff,
        &p,
        n - 1,
    )
    .unwrap();
    let sparse = instantiate_function(
        OptimizationFunction::new(Chain { n }),
        &x,
        AdBackend::SparseForwardDiff,
        &p,
        n - 1,
    )
    .unwrap();

    let y: Vec<f64> = x.iter().map(|v| -v + 1.0).collect();

    let mut hd = dense.hess_buffer();
    (dense.hess)(&mut hd, &y);
    let mut hs = sparse.hess_buffer();
    (sparse.hess)(&mut hs, &y);
    assert_matrix_eq(&hd, &hs, 1e-12);

    let (jd, chd) = eval_all(&dense, &y);
    let (js, chs) = eval_all(&sparse, &y);
    assert_matrix_eq(&jd, &js, 1e-12);
    for (a, b) in chd.iter().zip(&chs) {
        assert_matrix_eq(a, b, 1e-12);
    }

    let hess_pattern = sparse.hess_prototype.as_ref().unwrap();
    assert_eq!(hess_pattern.nnz(), 2 * n - 2);
    let jac_pattern = sparse.cons_jac_prototype.as_ref().unwrap();
    assert_eq!(jac_pattern.nnz(), 2 * (n - 1));
    assert!(sparse.lag_hess_prototype.is_some());
    assert!(dense.hess_prototype.is_none());
}

#[test]
fn colored_lagrangian_hessian_matches_combination() {
    let n = 7;
    let x: Vec<f64> = (0..n).map(|i| 0.5 - 0.2 * i as f64).collect();
    let inst = instantiate_function(
        OptimizationFunction::new(Chain { n }),
        &x,
        AdBackend::SparseForwardDiff,
        &[1.5],
        n - 1,
    )
    .unwrap();
    let pattern = inst.lag_hess_prototype.as_ref().unwrap();
    assert_eq!(pattern.nnz(), 2 * n - 2);

    let y: Vec<f64> = x.iter().map(|v| v * v + 0.1).collect();
    let sigma = 0.7;
    let mu: Vec<f64> = (0..n - 1).map(|i| 1.0 - 0.3 * i as f64).collect();
    let mut lag = inst.hess_buffer();
    (inst.lag_h)(&mut lag, &y, sigma, &mu);
    assert_matrix_eq(&lag, &combined_lagrangian(&inst, &y, sigma, &mu), 1e-12);
    for (i, row) in lag.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            if !pattern.contains(i, j) {
                assert_eq!(*v, 0.0);
            }
        }
    }
}

#[test]
fn supplied_hessian_combines_with_colored_constraint_hessians() {
    let n = 5;
    let x: Vec<f64> = (0..n).map(|i| 0.4 + 0.3 * i as f64).collect();
    let f = OptimizationFunction::new(Chain { n }).with_hess(move |h, x, _p| {
        let m = hessian(|v: &[HyperDual64]| Chain { n }.value(v, &[]), x);
        for (dst, src) in h.iter_mut().zip(&m) {
            dst.copy_from_slice(src);
        }
    });
    let inst = instantiate_function(f, &x, AdBackend::SparseForwardDiff, &[2.0], n - 1).unwrap();
    assert!(inst.lag_hess_prototype.is_none());
    assert!(inst.cons_hess_prototype.is_some());

    let sigma = 1.3;
    let mu = [0.5, -2.0, 1.0, 4.0];
    let mut lag = inst.hess_buffer();
    (inst.lag_h)(&mut lag, &x, sigma, &mu);
    assert_matrix_eq(&lag, &combined_lagrangian(&inst, &x, sigma, &mu), 1e-12);
}

#[test]
fn supplied_prototype_is_used_for_coloring() {
    let pattern = SparsityPattern::new(3, 3, [(0, 0), (1, 1), (2, 2)]);
    let inst = instantiate_function(
        OptimizationFunction::new(SumOfSquares).with_hess_prototype(pattern),
        &[1.0, 2.0, 3.0],
        AdBackend::SparseForwardDiff,
        &[],
        0,
    )
    .unwrap();

    let resolved = inst.hess_prototype.as_ref().unwrap();
    assert!(resolved.is_symmetric());
    assert_eq!(resolved.nnz(), 3);

    let mut h = inst.hess_buffer();
    (inst.hess)(&mut h, &[1.0, 2.0, 3.0]);
    assert_eq!(h, vec![vec![2.0, 0.0, 0.0], vec![0.0, 2.0, 0.0], vec![0.0, 0.0, 2.0]]);
}

// ============================================================
// Shape validation
// ============================================================

#[test]
fn empty_point_is_rejected() {
    let err = instantiate_function(
        OptimizationFunction::new(SumOfSquares),
        &[],
        AdBackend::ForwardDiff,
        &[],
        0,
    )
    .unwrap_err();
    assert_eq!(err, AdError::EmptyPoint);
}

#[test]
fn mismatched_prototypes_are_rejected() {
    let err = instantiate_function(
        OptimizationFunction::new(SumOfSquares)
            .with_hess_prototype(SparsityPattern::symmetric(3, [(0, 0)])),
        &[1.0, 2.0],
        AdBackend::SparseForwardDiff,
        &[],
        0,
    )
    .unwrap_err();
    assert!(matches!(err, AdError::PrototypeShape { name: "hess", .. }));

    let err = instantiate_function(
        OptimizationFunction::new(Hs071)
            .with_cons_hess_prototype(vec![SparsityPattern::dense_symmetric(4)]),
        &HS071_X,
        AdBackend::SparseForwardDiff,
        &[],
        2,
    )
    .unwrap_err();
    assert_eq!(
        err,
        AdError::ConsHessPrototypeCount {
            expected: 2,
            got: 1
        }
    );
}

#[test]
fn constraint_slots_require_constraints() {
    let err = instantiate_function(
        OptimizationFunction::new(SumOfSquares).with_cons_j(|_, _, _| {}),
        &[1.0],
        AdBackend::ForwardDiff,
        &[],
        0,
    )
    .unwrap_err();
    assert_eq!(err, AdError::UnusedConstraintSlot { slot: "cons_j" });
}

// ============================================================
// Logging
// ============================================================

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn synthesis_is_logged_at_debug() {
    let buf = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buf.clone())
        .with_ansi(false)
        .with_env_filter(EnvFilter::new("adglue=debug"))
        .finish();
    let inst = tracing::subscriber::with_default(subscriber, || {
        instantiate_function(
            OptimizationFunction::new(Hs071),
            &HS071_X,
            AdBackend::SparseForwardDiff,
            &[],
            2,
        )
    })
    .unwrap();
    assert!(inst.lag_hess_prototype.is_some());

    let logs = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("DEBUG"));
    assert!(logs.contains("synthesizing colored Hessian"));
    assert!(logs.contains("synthesizing colored constraint Jacobian"));
    assert!(logs.contains("synthesizing colored Lagrangian Hessian"));
    assert!(!logs.contains("dense"));
}
