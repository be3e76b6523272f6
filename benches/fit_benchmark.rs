// Benchmarks the cross-validated ridge fit on synthetic data, separately
// for the primal and dual formulations, to keep an eye on the cost of the
// per-split eigendecompositions as the grid grows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use voxelfit::cv::generate_leave_one_run_out;
use voxelfit::ridge::{logspace, Formulation, RidgeCv, SolverParams};

const N_SAMPLES: usize = 240;
const N_TARGETS: usize = 50;

fn synthetic_problem(n_features: usize) -> (Array2<f64>, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(42);
    let x = Array2::from_shape_fn((N_SAMPLES, n_features), |_| {
        rng.sample::<f64, _>(StandardNormal)
    });
    let w = Array2::from_shape_fn((n_features, N_TARGETS), |_| {
        rng.sample::<f64, _>(StandardNormal)
    });
    let noise = Array2::from_shape_fn((N_SAMPLES, N_TARGETS), |_| {
        rng.sample::<f64, _>(StandardNormal)
    });
    let y = x.dot(&w) + noise;
    (x, y)
}

fn bench_fit(c: &mut Criterion) {
    let splits = generate_leave_one_run_out(N_SAMPLES, &[0, 60, 120, 180]).unwrap();

    let mut group = c.benchmark_group("ridge_cv_fit");
    for (label, n_features, formulation) in [
        ("primal", 40, Formulation::Primal),
        ("dual", 400, Formulation::Dual),
    ] {
        let (x, y) = synthetic_problem(n_features);
        for n_alphas in [5usize, 20] {
            let grid = logspace(-2.0, 6.0, n_alphas);
            group.bench_with_input(
                BenchmarkId::new(label, n_alphas),
                &grid,
                |b, grid| {
                    b.iter(|| {
                        let mut estimator = RidgeCv::new(
                            grid.clone(),
                            formulation,
                            SolverParams::default(),
                        )
                        .unwrap();
                        estimator
                            .fit(black_box(x.view()), black_box(y.view()), &splits)
                            .unwrap();
                        black_box(estimator.best_alphas().unwrap().to_owned())
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_fit);
criterion_main!(benches);
