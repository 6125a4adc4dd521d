use adglue::sparse::{detect_hessian_sparsity, detect_jacobian_sparsity};
use adglue::{
    column_coloring, gradient, greedy_coloring, hessian, jacobian, sparse_hessian,
    sparse_jacobian, Dual64, DualFn, DualNum, HyperDual64,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn rosenbrock_f64(x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for i in 0..x.len() - 1 {
        let t1 = 1.0 - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum += t1 * t1 + 100.0 * t2 * t2;
    }
    sum
}

fn rosenbrock_generic<D: DualNum<f64> + Copy>(x: &[D]) -> D {
    let mut sum = D::from(0.0);
    for i in 0..x.len() - 1 {
        let t1 = D::from(1.0) - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum = sum + t1 * t1 + t2 * t2 * D::from(100.0);
    }
    sum
}

struct Rosenbrock;

impl DualFn for Rosenbrock {
    fn eval<D: DualNum<f64> + Copy>(&self, x: &[D]) -> D {
        rosenbrock_generic(x)
    }
}

fn residuals<D: DualNum<f64> + Copy>(x: &[D]) -> Vec<D> {
    (0..x.len() - 1)
        .map(|i| D::from(10.0) * (x[i + 1] - x[i] * x[i]))
        .collect()
}

fn finite_diff_gradient(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    let h = 1e-7;
    let mut grad = vec![0.0; n];
    for i in 0..n {
        let mut xp = x.to_vec();
        let mut xm = x.to_vec();
        xp[i] += h;
        xm[i] -= h;
        grad[i] = (rosenbrock_f64(&xp) - rosenbrock_f64(&xm)) / (2.0 * h);
    }
    grad
}

fn bench_forward_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_gradient");
    for n in [2, 10, 100] {
        let x: Vec<f64> = (0..n).map(|i| 0.5 + 0.01 * i as f64).collect();

        group.bench_with_input(BenchmarkId::new("forward_mode", n), &x, |b, x| {
            b.iter(|| black_box(gradient(|v: &[Dual64]| rosenbrock_generic(v), black_box(x))))
        });

        group.bench_with_input(BenchmarkId::new("finite_diff", n), &x, |b, x| {
            b.iter(|| black_box(finite_diff_gradient(black_box(x))))
        });
    }
    group.finish();
}

fn bench_hessian(c: &mut Criterion) {
    let mut group = c.benchmark_group("hessian");
    for n in [10, 50] {
        let x: Vec<f64> = (0..n).map(|i| 0.5 + 0.01 * i as f64).collect();
        let pattern = detect_hessian_sparsity(|v: &[HyperDual64]| rosenbrock_generic(v), &x);
        let coloring = greedy_coloring(&pattern);

        group.bench_with_input(BenchmarkId::new("dense", n), &x, |b, x| {
            b.iter(|| black_box(hessian(|v: &[HyperDual64]| rosenbrock_generic(v), black_box(x))))
        });

        group.bench_with_input(BenchmarkId::new("colored", n), &x, |b, x| {
            b.iter(|| {
                black_box(sparse_hessian(&Rosenbrock, black_box(x), &pattern, &coloring))
            })
        });
    }
    group.finish();
}

fn bench_jacobian(c: &mut Criterion) {
    let mut group = c.benchmark_group("jacobian");
    for n in [10, 100] {
        let x: Vec<f64> = (0..n).map(|i| 0.5 + 0.01 * i as f64).collect();
        let pattern = detect_jacobian_sparsity(|v: &[Dual64]| residuals(v), &x, n - 1);
        let coloring = column_coloring(&pattern);

        group.bench_with_input(BenchmarkId::new("dense", n), &x, |b, x| {
            b.iter(|| black_box(jacobian(|v: &[Dual64]| residuals(v), black_box(x), n - 1)))
        });

        group.bench_with_input(BenchmarkId::new("colored", n), &x, |b, x| {
            b.iter(|| {
                black_box(sparse_jacobian(
                    |v: &[Dual64]| residuals(v),
                    black_box(x),
                    &pattern,
                    &coloring,
                ))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_forward_gradient, bench_hessian, bench_jacobian);
criterion_main!(benches);
