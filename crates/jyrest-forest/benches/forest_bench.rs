//! Criterion benchmarks for jyrest-forest: growth, voting, and split search.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use jyrest_data::DatasetView;
use jyrest_forest::{ClassWeights, Forest, TreeGrowthConfig, find_best_split};

fn make_classification(n_samples: usize, n_features: usize, seed: u64) -> DatasetView {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut columns = vec![Vec::with_capacity(n_samples); n_features];
    let mut labels = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        // One positive per five observations.
        let positive = i % 5 == 0;
        labels.push(if positive { "pos" } else { "unl" });
        for (f, column) in columns.iter_mut().enumerate() {
            let base = if f < 3 && positive { 1.5 } else { 0.0 };
            column.push(base + rng.r#gen::<f64>());
        }
    }
    let names = (0..n_features).map(|f| format!("f{f}")).collect();
    DatasetView::from_parts(names, columns, &labels).unwrap()
}

fn bench_grow(c: &mut Criterion) {
    let ds = make_classification(500, 20, 42);
    let cfg = TreeGrowthConfig::new(50).unwrap();
    let weights = ClassWeights::new().with_weight("pos", 4.0);

    c.bench_function("grow_500x20_50trees", |b| {
        b.iter(|| Forest::grow_forest(&ds, cfg.clone(), weights.clone(), 42).unwrap());
    });
}

fn bench_predict_all(c: &mut Criterion) {
    let ds = make_classification(500, 20, 42);
    let cfg = TreeGrowthConfig::new(50).unwrap();
    let forest = Forest::grow_forest(&ds, cfg, ClassWeights::new(), 42).unwrap();

    c.bench_function("predict_all_500x20_50trees", |b| {
        b.iter(|| forest.predict_all().unwrap());
    });
}

fn bench_find_best_split(c: &mut Criterion) {
    let ds = make_classification(500, 20, 42);
    let observations: Vec<usize> = (0..ds.n_observations()).collect();
    let features: Vec<usize> = (0..ds.n_features()).collect();
    let class_weights = [4.0, 1.0];

    c.bench_function("find_best_split_500x20", |b| {
        b.iter(|| find_best_split(&ds, &observations, &features, &class_weights, 1));
    });
}

criterion_group!(benches, bench_grow, bench_predict_all, bench_find_best_split);
criterion_main!(benches);
