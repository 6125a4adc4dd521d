//! Sparsity patterns, numeric sparsity detection and greedy graph coloring.
//!
//! Jacobians use a column coloring (columns sharing a row get distinct
//! colors). Hessians use a coloring of the squared adjacency graph, which
//! allows every entry to be read directly from one compressed product.

use std::collections::HashSet;

use num_dual::{Dual64, HyperDual64};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Number of points sampled by the detectors, including the caller's point.
pub const SAMPLE_POINTS: usize = 3;

const SAMPLE_SEED: u64 = 0x5eed_ad61;

fn narrow(index: usize) -> u32 {
    match u32::try_from(index) {
        Ok(i) => i,
        Err(_) => panic!("sparsity index {index} does not fit in u32"),
    }
}

/// Sparsity pattern in COO format.
///
/// Entries are sorted by (row, col) and deduplicated. Symmetric patterns
/// (Hessians) store only the lower triangle and diagonal, so `cols[k] <= rows[k]`.
/// Indices are stored as `u32`, so row and column indices must not exceed
/// `u32::MAX`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SparsityPattern {
    /// Number of rows of the matrix.
    pub nrows: usize,
    /// Number of columns of the matrix.
    pub ncols: usize,
    /// Row indices (0-based).
    pub rows: Vec<u32>,
    /// Column indices (0-based).
    pub cols: Vec<u32>,
    symmetric: bool,
}

impl SparsityPattern {
    /// Build a general (rectangular) pattern from `(row, col)` entries.
    ///
    /// # Panics
    ///
    /// Panics if an index does not fit in `u32`.
    pub fn new(nrows: usize, ncols: usize, entries: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut entries: Vec<(u32, u32)> = entries
            .into_iter()
            .map(|(r, c)| (narrow(r), narrow(c)))
            .collect();
        Self::from_sorted(nrows, ncols, &mut entries, false)
    }

    /// Build a symmetric `dim x dim` pattern. Entries above the diagonal are
    /// mirrored into the lower triangle.
    ///
    /// # Panics
    ///
    /// Panics if an index does not fit in `u32`.
    pub fn symmetric(dim: usize, entries: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut entries: Vec<(u32, u32)> = entries
            .into_iter()
            .map(|(r, c)| (narrow(r.max(c)), narrow(r.min(c))))
            .collect();
        Self::from_sorted(dim, dim, &mut entries, true)
    }

    /// Fully dense symmetric pattern.
    pub fn dense_symmetric(dim: usize) -> Self {
        Self::symmetric(dim, (0..dim).flat_map(|r| (0..=r).map(move |c| (r, c))))
    }

    /// Pattern of the nonzero entries of a dense matrix.
    pub fn from_dense(matrix: &[Vec<f64>], symmetric: bool) -> Self {
        let nrows = matrix.len();
        let ncols = matrix.first().map_or(0, Vec::len);
        let nonzeros = matrix.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, v)| **v != 0.0)
                .map(move |(c, _)| (r, c))
        });
        if symmetric {
            Self::symmetric(nrows, nonzeros)
        } else {
            Self::new(nrows, ncols, nonzeros)
        }
    }

    fn from_sorted(nrows: usize, ncols: usize, entries: &mut Vec<(u32, u32)>, symmetric: bool) -> Self {
        entries.sort_unstable();
        entries.dedup();
        SparsityPattern {
            nrows,
            ncols,
            rows: entries.iter().map(|&(r, _)| r).collect(),
            cols: entries.iter().map(|&(_, c)| c).collect(),
            symmetric,
        }
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.rows.len()
    }

    /// Whether the pattern is empty (all zeros).
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether only the lower triangle of a symmetric matrix is stored.
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Check if position (i, j) is in the pattern. Symmetric patterns also
    /// answer for the mirrored position.
    pub fn contains(&self, i: usize, j: usize) -> bool {
        let (r, c) = if self.symmetric && i < j { (j, i) } else { (i, j) };
        self.entries().any(|(row, col)| row == r && col == c)
    }

    /// Iterate the stored `(row, col)` entries.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows
            .iter()
            .zip(self.cols.iter())
            .map(|(&r, &c)| (r as usize, c as usize))
    }

    /// Gather the stored entries of a dense matrix in pattern order.
    pub fn gather(&self, matrix: &[Vec<f64>], vals: &mut [f64]) {
        for (v, (r, c)) in vals.iter_mut().zip(self.entries()) {
            *v = matrix[r][c];
        }
    }
}

/// Result of a greedy coloring: `colors[j]` is the color of column `j`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coloring {
    pub colors: Vec<u32>,
    pub num_colors: u32,
}

impl Coloring {
    /// Seed direction for color `c`: the sum of the unit vectors of its columns.
    pub fn seed(&self, c: u32) -> Vec<f64> {
        self.colors
            .iter()
            .map(|&k| if k == c { 1.0 } else { 0.0 })
            .collect()
    }
}

/// Detect the sparsity of the Jacobian of `f : R^n -> R^m` around `x`.
///
/// Evaluates at `x` and [`SAMPLE_POINTS`]` - 1` deterministic perturbations of it
/// with one forward pass per input, keeping every entry that is nonzero at
/// any sample point. Entries that vanish at all sample points are missed; supply a
/// prototype when that matters.
pub fn detect_jacobian_sparsity(
    f: impl Fn(&[Dual64]) -> Vec<Dual64>,
    x: &[f64],
    m: usize,
) -> SparsityPattern {
    let n = x.len();
    let mut entries: HashSet<(usize, usize)> = HashSet::new();
    for point in sample_points(x) {
        for j in 0..n {
            let inputs: Vec<Dual64> = point
                .iter()
                .enumerate()
                .map(|(k, &xk)| Dual64::new(xk, if k == j { 1.0 } else { 0.0 }))
                .collect();
            for (i, out) in f(&inputs).iter().enumerate().take(m) {
                if out.eps != 0.0 {
                    entries.insert((i, j));
                }
            }
        }
    }
    SparsityPattern::new(m, n, entries)
}

/// Detect the sparsity of the Hessian of `f : R^n -> R` around `x`.
///
/// Same probing scheme as [`detect_jacobian_sparsity`], with one hyper-dual
/// pass per lower-triangular pair.
pub fn detect_hessian_sparsity(f: impl Fn(&[HyperDual64]) -> HyperDual64, x: &[f64]) -> SparsityPattern {
    let n = x.len();
    let mut entries: HashSet<(usize, usize)> = HashSet::new();
    for point in sample_points(x) {
        for row in 0..n {
            for col in 0..=row {
                if entries.contains(&(row, col)) {
                    continue;
                }
                let inputs: Vec<HyperDual64> = point
                    .iter()
                    .enumerate()
                    .map(|(k, &xk)| {
                        let e1 = if k == row { 1.0 } else { 0.0 };
                        let e2 = if k == col { 1.0 } else { 0.0 };
                        HyperDual64::new(xk, e1, e2, 0.0)
                    })
                    .collect();
                if f(&inputs).eps1eps2 != 0.0 {
                    entries.insert((row, col));
                }
            }
        }
    }
    SparsityPattern::symmetric(n, entries)
}

fn sample_points(x: &[f64]) -> Vec<Vec<f64>> {
    let mut rng = SmallRng::seed_from_u64(SAMPLE_SEED);
    let mut points = vec![x.to_vec()];
    for _ in 1..SAMPLE_POINTS {
        points.push(
            x.iter()
                .map(|&xi| xi + rng.gen_range(-0.5..0.5) * (1.0 + xi.abs()))
                .collect(),
        );
    }
    points
}

/// Greedy distance-2 coloring of the columns of a Jacobian pattern.
///
/// Two columns conflict when they have a nonzero in a common row, so each
/// row of a compressed product `J * seed(c)` holds at most one entry of
/// color `c`. Columns are visited in decreasing-degree order.
pub fn column_coloring(pattern: &SparsityPattern) -> Coloring {
    let n = pattern.ncols;
    let mut by_row: Vec<Vec<u32>> = vec![Vec::new(); pattern.nrows];
    for (r, c) in pattern.entries() {
        by_row[r].push(c as u32);
    }

    let mut adj: Vec<HashSet<u32>> = vec![HashSet::new(); n];
    for cols in &by_row {
        for &a in cols {
            for &b in cols {
                if a != b {
                    adj[a as usize].insert(b);
                }
            }
        }
    }

    color_greedily(&adj)
}

/// Color the columns of a symmetric pattern for [`sparse_hessian`](crate::api::sparse_hessian).
///
/// A stored entry `(r, c)` is read back as row `r` of `H * seed(colors[c])`.
/// That read is exact when no other column of the same color is nonzero in
/// row `r`, i.e. when columns joined by a path of at most two off-diagonal
/// entries get distinct colors. Columns are assigned the smallest free color
/// in order of decreasing number of distance-2 neighbours.
pub fn greedy_coloring(pattern: &SparsityPattern) -> Coloring {
    let n = pattern.ncols;

    let mut adj: Vec<Vec<u32>> = vec![Vec::new(); n];
    for (r, c) in pattern.entries() {
        if r != c {
            adj[r].push(c as u32);
            adj[c].push(r as u32);
        }
    }

    let mut adj2: Vec<HashSet<u32>> = vec![HashSet::new(); n];
    for v in 0..n {
        for &u in &adj[v] {
            adj2[v].insert(u);
            for &w in &adj[u as usize] {
                if w as usize != v {
                    adj2[v].insert(w);
                }
            }
        }
    }

    color_greedily(&adj2)
}

fn color_greedily(adj: &[HashSet<u32>]) -> Coloring {
    let n = adj.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| adj[b].len().cmp(&adj[a].len()));

    let mut colors = vec![u32::MAX; n];
    let mut num_colors = 0u32;

    for &v in &order {
        let used: HashSet<u32> = adj[v]
            .iter()
            .map(|&u| colors[u as usize])
            .filter(|&c| c != u32::MAX)
            .collect();

        let mut color = 0u32;
        while used.contains(&color) {
            color += 1;
        }
        colors[v] = color;
        num_colors = num_colors.max(color + 1);
    }

    Coloring { colors, num_colors }
}
