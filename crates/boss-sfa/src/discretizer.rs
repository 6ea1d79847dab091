// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::transform::SfaTransform;
use crate::word::{Word, validate_word_shape};
use boss_core::BossError;

/// Upper bound of the last bin; stays finite so snapshots remain JSON-safe.
pub const OPEN_UPPER_BOUND: f64 = f64::MAX;

/// Equal-depth bins per coefficient position (multiple coefficient binning).
///
/// `thresholds[pos]` holds `alphabet_size` ascending upper bounds; the last is
/// [`OPEN_UPPER_BOUND`]. Learned once and never mutated.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Breakpoints {
    alphabet_size: usize,
    thresholds: Vec<Vec<f64>>,
}

impl Breakpoints {
    /// Learns breakpoints from all disjoint windows of `series`.
    pub fn learn(
        series: &[&[f64]],
        transform: &SfaTransform,
        alphabet_size: usize,
    ) -> Result<Self, BossError> {
        let word_len = transform.word_len();
        validate_word_shape(alphabet_size, word_len)?;
        if series.is_empty() {
            return Err(BossError::invalid_input(
                "breakpoint learning requires at least one series",
            ));
        }

        let mut rows = Vec::new();
        for values in series {
            rows.extend(transform.disjoint_coefficients(values)?);
        }

        let total = rows.len();
        let depth = total as f64 / alphabet_size as f64;
        let mut thresholds = Vec::with_capacity(word_len);
        let mut informative = false;
        for pos in 0..word_len {
            let mut column: Vec<f64> = rows.iter().map(|row| round_hundredths(row[pos])).collect();
            column.sort_by(f64::total_cmp);
            if column[0] != column[total - 1] {
                informative = true;
            }

            let mut bins = Vec::with_capacity(alphabet_size);
            let mut bin_index = 0.0;
            for _ in 0..alphabet_size - 1 {
                bin_index += depth;
                bins.push(column[(bin_index as usize).min(total - 1)]);
            }
            bins.push(OPEN_UPPER_BOUND);
            thresholds.push(bins);
        }

        if !informative {
            return Err(BossError::degenerate_input(format!(
                "every coefficient is constant across {total} windows (window_len={}, word_len={word_len})",
                transform.window_len()
            )));
        }

        Ok(Self {
            alphabet_size,
            thresholds,
        })
    }

    /// Wraps precomputed thresholds after checking their shape and order.
    pub fn from_thresholds(
        thresholds: Vec<Vec<f64>>,
        alphabet_size: usize,
    ) -> Result<Self, BossError> {
        validate_word_shape(alphabet_size, thresholds.len())?;
        for (pos, bins) in thresholds.iter().enumerate() {
            if bins.len() != alphabet_size {
                return Err(BossError::invalid_input(format!(
                    "position {pos} has {} thresholds, expected {alphabet_size}",
                    bins.len()
                )));
            }
            if bins.windows(2).any(|pair| pair[0] > pair[1]) || bins.iter().any(|b| b.is_nan()) {
                return Err(BossError::invalid_input(format!(
                    "thresholds at position {pos} must be ascending and not NaN"
                )));
            }
        }
        Ok(Self {
            alphabet_size,
            thresholds,
        })
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    pub fn word_len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn thresholds(&self, position: usize) -> &[f64] {
        &self.thresholds[position]
    }

    /// Breakpoints of the first `word_len` positions, identical to what
    /// [`Breakpoints::learn`] yields at that word length.
    pub fn truncated(&self, word_len: usize) -> Result<Self, BossError> {
        if word_len < 2 || word_len > self.word_len() {
            return Err(BossError::configuration(format!(
                "word_len must be in 2..={}; got {word_len}",
                self.word_len()
            )));
        }
        Ok(Self {
            alphabet_size: self.alphabet_size,
            thresholds: self.thresholds[..word_len].to_vec(),
        })
    }

    /// Maps each coefficient to the first bin whose upper bound is not below it.
    pub fn quantize(&self, coefficients: &[f64]) -> Word {
        let mut word = Word::empty(self.alphabet_size);
        for (bins, &value) in self.thresholds.iter().zip(coefficients) {
            let letter = bins
                .iter()
                .position(|&bound| value <= bound)
                .unwrap_or(self.alphabet_size - 1);
            word.push(letter as u8);
        }
        word
    }

    /// Quantized word for every sliding window of `series`.
    pub fn sliding_words(
        &self,
        transform: &SfaTransform,
        series: &[f64],
    ) -> Result<Vec<Word>, BossError> {
        Ok(transform
            .mft(series)?
            .iter()
            .map(|coefficients| self.quantize(coefficients))
            .collect())
    }
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
