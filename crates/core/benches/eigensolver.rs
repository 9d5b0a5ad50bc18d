use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use tracemin_backend_cpu::CpuBackend;
use tracemin_core::{
    block::BlockMatrix,
    eigensolver::{EigenOptions, LineSearchPolicy, minimize_trace},
    operator::{DiagonalPreconditioner, Laplacian1D},
};

struct Scenario {
    name: &'static str,
    size: usize,
    bands: usize,
    policy: LineSearchPolicy,
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "laplacian_128_exact",
        size: 128,
        bands: 4,
        policy: LineSearchPolicy::ForceExact,
    },
    Scenario {
        name: "laplacian_128_auto",
        size: 128,
        bands: 4,
        policy: LineSearchPolicy::Auto,
    },
    Scenario {
        name: "laplacian_256_auto",
        size: 256,
        bands: 6,
        policy: LineSearchPolicy::Auto,
    },
];

fn bench_trace_minimization(c: &mut Criterion) {
    let mut group = c.benchmark_group("minimize_trace");
    group.sample_size(10);

    for scenario in SCENARIOS {
        group.bench_function(BenchmarkId::from_parameter(scenario.name), |b| {
            b.iter(|| {
                let backend = CpuBackend::new();
                let mut operator = Laplacian1D::new(backend, scenario.size);
                let mut preconditioner =
                    DiagonalPreconditioner::from_diagonal(&vec![2.0; scenario.size]);
                let mut y = BlockMatrix::seeded(scenario.size, scenario.bands, 1);
                let mut work =
                    vec![BlockMatrix::zeros(scenario.size, scenario.bands); 4];
                let options = EigenOptions::default()
                    .with_tolerance(1e-8)
                    .with_line_search(scenario.policy);
                let result = minimize_trace(
                    &mut y,
                    &mut operator,
                    Some(&mut preconditioner),
                    None,
                    &mut work,
                    &options,
                )
                .expect("benchmark problem converges");
                black_box(result.trace)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_trace_minimization);
criterion_main!(benches);
