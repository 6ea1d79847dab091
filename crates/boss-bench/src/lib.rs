// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Synthetic workloads shared by the criterion benchmarks.

use boss_core::{BossError, Dataset, Instance};

/// Deterministic labelled series: class `k` is a sine with frequency `k + 1`
/// plus a small instance-dependent phase.
pub fn synthetic_dataset(
    n_per_class: usize,
    num_classes: usize,
    series_len: usize,
) -> Result<Dataset, BossError> {
    let mut instances = Vec::with_capacity(n_per_class * num_classes);
    for idx in 0..n_per_class {
        for class in 0..num_classes {
            instances.push(Instance::univariate(
                synthetic_series(class, idx, series_len),
                Some(class),
            )?);
        }
    }
    Dataset::new(instances, num_classes)
}

pub fn synthetic_series(class: usize, idx: usize, series_len: usize) -> Vec<f64> {
    let freq = (class + 1) as f64 * 0.07;
    let phase = idx as f64 * 0.31;
    (0..series_len)
        .map(|t| {
            let x = t as f64;
            (freq * x + phase).sin() + 0.05 * ((idx + t) % 5) as f64
        })
        .collect()
}
