// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use boss_bench::synthetic_series;
use boss_sfa::SfaTransform;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn bench_mft(c: &mut Criterion, case_id: &str, series_len: usize, window_len: usize) {
    let series = synthetic_series(1, 0, series_len);
    let transform =
        SfaTransform::new(window_len, 16, true).expect("benchmark transform should be valid");

    c.bench_function(case_id, |b| {
        b.iter(|| {
            transform
                .mft(black_box(&series))
                .expect("MFT benchmark should succeed");
        })
    });
}

fn benchmark_mft_n1e4_w64(c: &mut Criterion) {
    bench_mft(c, "sfa_mft_n1e4_w64", 10_000, 64);
}

fn benchmark_mft_n1e3_w256(c: &mut Criterion) {
    bench_mft(c, "sfa_mft_n1e3_w256", 1_000, 256);
}

criterion_group!(benches, benchmark_mft_n1e4_w64, benchmark_mft_n1e3_w256);
criterion_main!(benches);
