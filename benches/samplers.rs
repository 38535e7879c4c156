use bayes_mc::data::Design;
use bayes_mc::ppc;
use bayes_mc::regression::{GibbsLinear, MetropolisLinear, SemiConjugatePrior};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng, rngs::StdRng};
use statrs::distribution::Normal;

fn design(n: usize, p: usize) -> Design {
    let mut rng = StdRng::seed_from_u64(42);
    let z = Normal::standard();
    let x = Array2::from_shape_fn((n, p), |(_, j)| if j == 0 { 1.0 } else { rng.sample(z) });
    let y = Array1::from_shape_fn(n, |i| x.row(i).sum() + 0.5 * rng.sample(z));
    let names = (0..p).map(|j| format!("x{j}")).collect();
    Design::new(x, y, names).unwrap()
}

fn bench_gibbs(c: &mut Criterion) {
    let d = design(500, 5);
    c.bench_function("gibbs_linear_2x1000", |bencher| {
        bencher.iter(|| {
            let out = GibbsLinear::new(d.clone(), SemiConjugatePrior::default(), 2, 42)
                .unwrap()
                .run(0, 1000)
                .unwrap();
            black_box(out);
        });
    });
}

fn bench_metropolis(c: &mut Criterion) {
    let d = design(500, 5);
    c.bench_function("metropolis_linear_2x1000", |bencher| {
        bencher.iter(|| {
            let out = MetropolisLinear::new(d.clone(), SemiConjugatePrior::default(), 2, 42)
                .unwrap()
                .with_proposal_sd(0.02, 0.05)
                .unwrap()
                .run(0, 1000)
                .unwrap();
            black_box(out);
        });
    });
}

fn bench_replicates(c: &mut Criterion) {
    let d = design(500, 5);
    let draws = GibbsLinear::new(d.clone(), SemiConjugatePrior::default(), 2, 42)
        .unwrap()
        .run(100, 500)
        .unwrap()
        .draws;
    c.bench_function("simulate_replicates_1000", |bencher| {
        bencher.iter(|| {
            let out = ppc::simulate_replicates(d.x.view(), black_box(&draws), 1000, 7).unwrap();
            black_box(out);
        });
    });
}

criterion_group!(benches, bench_gibbs, bench_metropolis, bench_replicates);
criterion_main!(benches);

