use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use genedx::classify::{FeatureMatrix, default_roster};
use ndarray::{Array1, Array2};
use rand::distributions::Standard;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_cohort(samples: usize, features: usize) -> (FeatureMatrix, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(0x6E4E + samples as u64);
    let labels = Array1::from_shape_fn(samples, |i| (i % 2) as f64);
    let values = Array2::from_shape_fn((samples, features), |(i, j)| {
        let noise: f64 = rng.sample(Standard);
        if j < 3 { noise + labels[i] } else { noise }
    });
    let names = (0..features).map(|j| format!("G{j}")).collect();
    let matrix = FeatureMatrix::new(names, values).expect("matching shape");
    (matrix, labels)
}

fn benchmark_roster_fit(c: &mut Criterion) {
    let sizes = [(60_usize, 20_usize), (200, 50)];
    let cohorts: Vec<_> = sizes
        .iter()
        .map(|&(n, p)| ((n, p), random_cohort(n, p)))
        .collect();

    let mut group = c.benchmark_group("roster_fit");
    group.sample_size(10);
    for ((n, p), (matrix, labels)) in &cohorts {
        group.throughput(Throughput::Elements((*n * *p) as u64));
        for spec in default_roster() {
            group.bench_with_input(
                BenchmarkId::new(spec.name.clone(), format!("{n}x{p}")),
                matrix,
                |b, input| {
                    b.iter(|| {
                        let mut model = spec.build(2024).expect("valid spec");
                        model.fit(black_box(input), labels.view()).expect("fit");
                        black_box(model.raw_scores(input).expect("scores"));
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, benchmark_roster_fit);
criterion_main!(benches);
