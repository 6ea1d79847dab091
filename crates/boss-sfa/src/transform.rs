// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use boss_core::BossError;
use std::f64::consts::PI;

/// Standard deviations at or below this are treated as a constant window.
pub const CONSTANT_WINDOW_STD: f64 = 1.0e-8;

/// Symbolic Fourier approximation front end: windowing plus truncated,
/// normalized Fourier coefficients.
///
/// Coefficients are laid out as `[re_0, im_0, re_1, im_1, ..]`. With
/// `normalize` the DC term is skipped. In both modes each window is divided
/// by its population standard deviation (1.0 for a constant window) and
/// scaled by `1 / sqrt(window_len)`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SfaTransform {
    window_len: usize,
    word_len: usize,
    normalize: bool,
}

impl SfaTransform {
    pub fn new(window_len: usize, word_len: usize, normalize: bool) -> Result<Self, BossError> {
        if window_len < 2 {
            return Err(BossError::configuration(format!(
                "window_len must be >= 2; got {window_len}"
            )));
        }
        if word_len == 0 {
            return Err(BossError::configuration("word_len must be >= 1; got 0"));
        }
        Ok(Self {
            window_len,
            word_len,
            normalize,
        })
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn word_len(&self) -> usize {
        self.word_len
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }

    /// Number of reals per coefficient vector (`word_len` rounded up to even).
    pub fn coefficient_len(&self) -> usize {
        self.word_len + self.word_len % 2
    }

    fn first_frequency(&self) -> usize {
        usize::from(self.normalize)
    }

    fn check_series(&self, series: &[f64]) -> Result<(), BossError> {
        if series.len() < self.window_len {
            return Err(BossError::configuration(format!(
                "window_len={} exceeds series length {}",
                self.window_len,
                series.len()
            )));
        }
        Ok(())
    }

    fn scale(&self, std: f64) -> f64 {
        let inv_sqrt_window = 1.0 / (self.window_len as f64).sqrt();
        if std > CONSTANT_WINDOW_STD {
            inv_sqrt_window / std
        } else {
            inv_sqrt_window
        }
    }

    /// `ceil(len / window_len)` non-overlapping windows; the last one is
    /// right-aligned so it stays inside the series.
    pub fn disjoint_windows<'a>(&self, series: &'a [f64]) -> Result<Vec<&'a [f64]>, BossError> {
        self.check_series(series)?;
        let count = series.len().div_ceil(self.window_len);
        Ok((0..count)
            .map(|idx| {
                let offset = (idx * self.window_len).min(series.len() - self.window_len);
                &series[offset..offset + self.window_len]
            })
            .collect())
    }

    /// Exact normalized coefficients of one window.
    pub fn dft(&self, window: &[f64]) -> Vec<f64> {
        let raw = raw_dft(window, self.first_frequency(), self.coefficient_len() / 2);
        let (_, std) = mean_std(window);
        let factor = self.scale(std);
        raw.into_iter().map(|value| value * factor).collect()
    }

    /// Coefficients of every disjoint window of `series`.
    pub fn disjoint_coefficients(&self, series: &[f64]) -> Result<Vec<Vec<f64>>, BossError> {
        Ok(self
            .disjoint_windows(series)?
            .into_iter()
            .map(|window| self.dft(window))
            .collect())
    }

    /// Coefficients of every sliding window (step 1) via the momentary
    /// Fourier transform: one exact DFT, then an O(word_len) update per step.
    pub fn mft(&self, series: &[f64]) -> Result<Vec<Vec<f64>>, BossError> {
        self.check_series(series)?;
        let w = self.window_len;
        let n_positions = series.len() - w + 1;
        let first = self.first_frequency();
        let n_freq = self.coefficient_len() / 2;

        let phis: Vec<(f64, f64)> = (0..n_freq)
            .map(|idx| {
                let angle = 2.0 * PI * (first + idx) as f64 / w as f64;
                (angle.cos(), angle.sin())
            })
            .collect();
        let (_, stds) = sliding_mean_std(series, w);

        let mut state = raw_dft(&series[..w], first, n_freq);
        let mut out = Vec::with_capacity(n_positions);
        for t in 0..n_positions {
            if t > 0 {
                let delta = series[t + w - 1] - series[t - 1];
                for (idx, &(cos, sin)) in phis.iter().enumerate() {
                    let re = state[2 * idx] + delta;
                    let im = state[2 * idx + 1];
                    state[2 * idx] = re * cos - im * sin;
                    state[2 * idx + 1] = re * sin + im * cos;
                }
            }
            let factor = self.scale(stds[t]);
            out.push(state.iter().map(|value| value * factor).collect());
        }
        Ok(out)
    }
}

/// Unscaled DFT coefficients for `n_freq` frequencies starting at `first`.
fn raw_dft(window: &[f64], first: usize, n_freq: usize) -> Vec<f64> {
    let n = window.len() as f64;
    let mut out = Vec::with_capacity(2 * n_freq);
    for k in first..first + n_freq {
        let mut re = 0.0;
        let mut im = 0.0;
        for (t, &x) in window.iter().enumerate() {
            let angle = 2.0 * PI * (t * k) as f64 / n;
            re += x * angle.cos();
            im -= x * angle.sin();
        }
        out.push(re);
        out.push(im);
    }
    out
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    (mean, var.max(0.0).sqrt())
}

/// Incremental mean/std for every sliding window of `window_len`.
pub fn sliding_mean_std(series: &[f64], window_len: usize) -> (Vec<f64>, Vec<f64>) {
    if window_len == 0 || series.len() < window_len {
        return (Vec::new(), Vec::new());
    }
    let n_positions = series.len() - window_len + 1;
    let inv = 1.0 / window_len as f64;
    let mut means = Vec::with_capacity(n_positions);
    let mut stds = Vec::with_capacity(n_positions);

    let mut sum: f64 = series[..window_len].iter().sum();
    let mut square_sum: f64 = series[..window_len].iter().map(|x| x * x).sum();
    for t in 0..n_positions {
        if t > 0 {
            let incoming = series[t + window_len - 1];
            let outgoing = series[t - 1];
            sum += incoming - outgoing;
            square_sum += incoming * incoming - outgoing * outgoing;
        }
        let mean = sum * inv;
        let var = square_sum * inv - mean * mean;
        means.push(mean);
        stds.push(if var > 0.0 { var.sqrt() } else { 0.0 });
    }
    (means, stds)
}
