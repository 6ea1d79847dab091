// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]
#![allow(dead_code)]

use boss_core::{Dataset, Instance};
use boss_ensemble::EnsembleConfig;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

/// Class 0: phase-shifted sines. Class 1: drifting square waves.
pub fn two_class_series(n_per_class: usize, len: usize) -> Vec<Instance> {
    let mut instances = Vec::with_capacity(2 * n_per_class);
    for idx in 0..n_per_class {
        let phase = idx as f64 * 0.15;
        let smooth = (0..len)
            .map(|t| (t as f64 * 0.2 + phase).sin() + 0.1 * (t as f64 * 0.05).cos())
            .collect();
        instances.push(Instance::univariate(smooth, Some(0)).expect("valid instance"));

        let square = (0..len)
            .map(|t| {
                let level = if (t / 7 + idx) % 2 == 0 { 1.0 } else { -1.0 };
                level + 0.01 * (t as f64) * ((idx % 3) as f64)
            })
            .collect();
        instances.push(Instance::univariate(square, Some(1)).expect("valid instance"));
    }
    instances
}

pub fn two_class_dataset(n_per_class: usize, len: usize) -> Dataset {
    Dataset::new(two_class_series(n_per_class, len), 2).expect("valid dataset")
}

/// Same data with a second channel holding the reversed series.
pub fn two_channel_dataset(n_per_class: usize, len: usize) -> Dataset {
    let instances = two_class_series(n_per_class, len)
        .into_iter()
        .map(|instance| {
            let first = instance.channel(0).to_vec();
            let second = first.iter().rev().copied().collect();
            Instance::new(vec![first, second], instance.label()).expect("valid instance")
        })
        .collect();
    Dataset::new(instances, 2).expect("valid dataset")
}

/// Small grid so integration runs stay fast.
pub fn quick_config() -> EnsembleConfig {
    EnsembleConfig::default().with_word_lengths(vec![8, 6, 4])
}

pub fn unique_temp_checkpoint_path(stem: &str) -> PathBuf {
    static NEXT_ID: AtomicU64 = AtomicU64::new(0);
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("{stem}-{}-{seq}.json", process::id()))
}
