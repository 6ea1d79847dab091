// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::{BossError, Dataset, Instance};

/// Classifier capability: learn from a labeled training set.
pub trait Trainable {
    fn fit(&mut self, data: &Dataset) -> Result<(), BossError>;
}

/// Classifier capability: predict labels and class distributions.
pub trait Predictive {
    fn num_classes(&self) -> usize;

    /// Per-class probability vector summing to 1.
    fn predict_proba(&self, instance: &Instance) -> Result<Vec<f64>, BossError>;

    /// Most probable class; ties resolve to the lowest class index.
    fn predict(&self, instance: &Instance) -> Result<usize, BossError> {
        let probs = self.predict_proba(instance)?;
        Ok(argmax_first(&probs))
    }
}

/// Index of the first maximum of `values` (0 for an empty slice).
pub fn argmax_first(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = idx;
        }
    }
    best
}
