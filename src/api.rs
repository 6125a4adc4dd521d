use nalgebra::{Const, U1};
use num_dual::{Derivative, Dual64, DualNum, HyperDual64, HyperDualVec, HyperDualVec64};

use crate::sparse::{Coloring, SparsityPattern};

fn seeded(x: &[f64], dir: impl Fn(usize) -> f64) -> Vec<Dual64> {
    x.iter()
        .enumerate()
        .map(|(k, &xk)| Dual64::new(xk, dir(k)))
        .collect()
}

fn hyper_seeded(x: &[f64], dir1: impl Fn(usize) -> f64, dir2: impl Fn(usize) -> f64) -> Vec<HyperDual64> {
    x.iter()
        .enumerate()
        .map(|(k, &xk)| HyperDual64::new(xk, dir1(k), dir2(k), 0.0))
        .collect()
}

fn unit(i: usize) -> impl Fn(usize) -> f64 {
    move |k| if k == i { 1.0 } else { 0.0 }
}

/// Compute the gradient of a scalar function `f : R^n → R` using forward mode.
///
/// One dual pass per input variable.
///
/// ```
/// let g = adglue::gradient(|x: &[num_dual::Dual64]| {
///     x[0] * x[0] + x[1] * x[1]
/// }, &[3.0, 4.0]);
/// assert!((g[0] - 6.0).abs() < 1e-10);
/// assert!((g[1] - 8.0).abs() < 1e-10);
/// ```
pub fn gradient(f: impl Fn(&[Dual64]) -> Dual64, x: &[f64]) -> Vec<f64> {
    (0..x.len()).map(|i| f(&seeded(x, unit(i))).eps).collect()
}

/// Jacobian-vector product (forward mode): `(f(x), J·v)`.
pub fn jvp(f: impl Fn(&[Dual64]) -> Vec<Dual64>, x: &[f64], v: &[f64]) -> (Vec<f64>, Vec<f64>) {
    assert_eq!(x.len(), v.len(), "x and v must have the same length");
    let outputs = f(&seeded(x, |k| v[k]));
    let values = outputs.iter().map(|d| d.re).collect();
    let tangents = outputs.iter().map(|d| d.eps).collect();
    (values, tangents)
}

/// Compute the full `m x n` Jacobian of `f : R^n → R^m` using forward mode.
///
/// Returns `J` with `J[i][j] = ∂f_i/∂x_j`.
pub fn jacobian(f: impl Fn(&[Dual64]) -> Vec<Dual64>, x: &[f64], m: usize) -> Vec<Vec<f64>> {
    let n = x.len();
    let mut jac = vec![vec![0.0; n]; m];
    for j in 0..n {
        let outputs = f(&seeded(x, unit(j)));
        for (row, out) in jac.iter_mut().zip(outputs.iter()) {
            row[j] = out.eps;
        }
    }
    jac
}

/// Compute the dense Hessian of `f : R^n → R` by forward-over-forward mode.
///
/// One hyper-dual pass per lower-triangular pair; the upper triangle is
/// filled by symmetry.
pub fn hessian(f: impl Fn(&[HyperDual64]) -> HyperDual64, x: &[f64]) -> Vec<Vec<f64>> {
    let n = x.len();
    let mut hess = vec![vec![0.0; n]; n];
    for row in 0..n {
        for col in 0..=row {
            let h = f(&hyper_seeded(x, unit(row), unit(col))).eps1eps2;
            hess[row][col] = h;
            hess[col][row] = h;
        }
    }
    hess
}

/// Compute a sparse Jacobian with one forward pass per color.
///
/// Entry `(i, j)` of the pattern is read from row `i` of the compressed
/// product `J * seed(colors[j])`. Entries outside the pattern are zero.
pub fn sparse_jacobian(
    f: impl Fn(&[Dual64]) -> Vec<Dual64>,
    x: &[f64],
    pattern: &SparsityPattern,
    coloring: &Coloring,
) -> Vec<Vec<f64>> {
    let compressed: Vec<Vec<f64>> = (0..coloring.num_colors)
        .map(|c| {
            let seed = coloring.seed(c);
            f(&seeded(x, |k| seed[k])).iter().map(|d| d.eps).collect()
        })
        .collect();

    let mut jac = vec![vec![0.0; pattern.ncols]; pattern.nrows];
    for (i, j) in pattern.entries() {
        jac[i][j] = compressed[coloring.colors[j] as usize][i];
    }
    jac
}

/// A scalar function that can be evaluated on any dual number type.
///
/// Colored Hessians evaluate `f` on vector hyper-dual numbers, which a
/// closure over a single concrete type cannot accept.
pub trait DualFn {
    fn eval<D: DualNum<f64> + Copy>(&self, x: &[D]) -> D;
}

/// Widest block of rows recovered in a single pass.
pub const MAX_LANES: usize = 64;

/// Compute a sparse Hessian from compressed Hessian columns.
///
/// Each color `c` costs one vector hyper-dual pass that yields the rows of
/// `H * seed(c)` holding an entry of that color. Colors with more than
/// [`MAX_LANES`] such rows take one pass per block of rows. `coloring` must
/// come from [`greedy_coloring`](crate::sparse::greedy_coloring) on
/// `pattern`.
pub fn sparse_hessian(
    f: &impl DualFn,
    x: &[f64],
    pattern: &SparsityPattern,
    coloring: &Coloring,
) -> Vec<Vec<f64>> {
    let n = x.len();

    // needed[c] = rows whose entry in H * seed(c) is read back
    let mut needed: Vec<Vec<usize>> = vec![Vec::new(); coloring.num_colors as usize];
    for (r, c) in pattern.entries() {
        needed[coloring.colors[c] as usize].push(r);
    }
    for rows in needed.iter_mut() {
        rows.sort_unstable();
        rows.dedup();
    }

    let widest = needed.iter().map(Vec::len).max().unwrap_or(0);
    let compressed = if widest <= 4 {
        compressed_columns::<4>(f, x, coloring, &needed)
    } else if widest <= 16 {
        compressed_columns::<16>(f, x, coloring, &needed)
    } else {
        compressed_columns::<MAX_LANES>(f, x, coloring, &needed)
    };

    let mut hess = vec![vec![0.0; n]; n];
    for (r, c) in pattern.entries() {
        let h = compressed[coloring.colors[c] as usize][r];
        hess[r][c] = h;
        hess[c][r] = h;
    }
    hess
}

/// `compressed[c][row] = (H * seed(c))[row]` for every needed row, with up
/// to `K` rows per pass: `eps1` carries one unit direction per lane, `eps2`
/// the color seed, so `eps1eps2` is the block of `H * seed(c)`.
fn compressed_columns<const K: usize>(
    f: &impl DualFn,
    x: &[f64],
    coloring: &Coloring,
    needed: &[Vec<usize>],
) -> Vec<Vec<f64>> {
    let mut compressed = vec![vec![0.0; x.len()]; needed.len()];
    for (color, rows) in needed.iter().enumerate() {
        for block in rows.chunks(K) {
            let inputs: Vec<HyperDualVec64<Const<K>, U1>> = x
                .iter()
                .enumerate()
                .map(|(k, &xk)| {
                    let eps1 = match block.iter().position(|&r| r == k) {
                        Some(lane) => Derivative::derivative_generic(Const::<K>, U1, lane),
                        None => Derivative::none(),
                    };
                    let eps2 = if coloring.colors[k] as usize == color {
                        Derivative::derivative_generic(U1, U1, 0)
                    } else {
                        Derivative::none()
                    };
                    HyperDualVec::new(xk, eps1, eps2, Derivative::none())
                })
                .collect();
            let column = f.eval(&inputs).eps1eps2.unwrap_generic(Const::<K>, U1);
            for (lane, &row) in block.iter().enumerate() {
                compressed[color][row] = column[lane];
            }
        }
    }
    compressed
}

/// Dense matrix-vector product `H * v`.
pub fn hvp_dense(hess: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    hess.iter()
        .map(|row| row.iter().zip(v).map(|(h, vi)| h * vi).sum())
        .collect()
}
