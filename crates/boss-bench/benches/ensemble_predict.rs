// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use boss_bench::synthetic_dataset;
use boss_core::{Predictive, Trainable};
use boss_ensemble::{BossEnsemble, EnsembleConfig};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn bench_predict(c: &mut Criterion, case_id: &str, threads: usize) {
    let data = synthetic_dataset(10, 3, 128).expect("benchmark data should be valid");
    let config = EnsembleConfig::default()
        .with_word_lengths(vec![12, 10, 8])
        .with_ensemble_size(20)
        .with_max_ensemble_size(10)
        .with_threads(threads);
    let mut model = BossEnsemble::new(config).expect("benchmark config should be valid");
    model.fit(&data).expect("benchmark fit should succeed");
    let query = data.instance(0).without_label();

    c.bench_function(case_id, |b| {
        b.iter(|| {
            model
                .predict_proba(black_box(&query))
                .expect("predict benchmark should succeed");
        })
    });
}

fn benchmark_predict_sequential(c: &mut Criterion) {
    bench_predict(c, "ensemble_predict_n30_l128_seq", 1);
}

fn benchmark_predict_parallel(c: &mut Criterion) {
    bench_predict(c, "ensemble_predict_n30_l128_t4", 4);
}

criterion_group!(benches, benchmark_predict_sequential, benchmark_predict_parallel);
criterion_main!(benches);
