// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::member::MemberParams;
use boss_core::BossError;
use serde::{Deserialize, Serialize};

/// Number of features a parameter candidate is embedded into.
pub const PARAMETER_FEATURES: usize = 4;

const CONSTANT_TARGET_STD: f64 = 1.0e-12;

/// Covariance kernel over the unit-scaled parameter features.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SurrogateKernel {
    /// Squared-exponential kernel.
    Rbf { length_scale: f64, variance: f64 },
    /// Matern 3/2 kernel.
    Matern32 { length_scale: f64, variance: f64 },
}

impl Default for SurrogateKernel {
    fn default() -> Self {
        Self::Rbf {
            length_scale: 0.5,
            variance: 1.0,
        }
    }
}

impl SurrogateKernel {
    fn validate(&self) -> Result<(), BossError> {
        let (length_scale, variance) = match self {
            Self::Rbf {
                length_scale,
                variance,
            }
            | Self::Matern32 {
                length_scale,
                variance,
            } => (*length_scale, *variance),
        };

        if !length_scale.is_finite() || length_scale <= 0.0 {
            return Err(BossError::configuration(format!(
                "surrogate kernel length_scale must be finite and > 0; got {length_scale}"
            )));
        }
        if !variance.is_finite() || variance <= 0.0 {
            return Err(BossError::configuration(format!(
                "surrogate kernel variance must be finite and > 0; got {variance}"
            )));
        }
        Ok(())
    }

    fn covariance(&self, a: &[f64; PARAMETER_FEATURES], b: &[f64; PARAMETER_FEATURES]) -> f64 {
        let dist = a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt();
        match self {
            Self::Rbf {
                length_scale,
                variance,
            } => {
                let z = dist / *length_scale;
                *variance * (-0.5 * z * z).exp()
            }
            Self::Matern32 {
                length_scale,
                variance,
            } => {
                let root3 = 3.0_f64.sqrt();
                let z = root3 * dist / *length_scale;
                *variance * (1.0 + z) * (-z).exp()
            }
        }
    }
}

/// Settings for the Gaussian-process surrogate used in parameter selection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurrogateConfig {
    pub kernel: SurrogateKernel,
    pub noise_variance: f64,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            kernel: SurrogateKernel::default(),
            noise_variance: 1.0e-3,
        }
    }
}

impl SurrogateConfig {
    pub fn validate(&self) -> Result<(), BossError> {
        self.kernel.validate()?;
        if !self.noise_variance.is_finite() || self.noise_variance <= 0.0 {
            return Err(BossError::configuration(format!(
                "SurrogateConfig.noise_variance must be finite and > 0; got {}",
                self.noise_variance
            )));
        }
        Ok(())
    }
}

/// Bounds of the candidate grid, used to scale parameters to `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpace {
    word_len: (usize, usize),
    alphabet_size: (usize, usize),
    window_len: (usize, usize),
}

impl ParameterSpace {
    pub fn from_candidates(candidates: &[MemberParams]) -> Self {
        let bounds = |pick: fn(&MemberParams) -> usize| {
            candidates.iter().map(pick).fold((usize::MAX, 0), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            })
        };
        Self {
            word_len: bounds(|p| p.word_len),
            alphabet_size: bounds(|p| p.alphabet_size),
            window_len: bounds(|p| p.window_len),
        }
    }

    pub fn features(&self, params: &MemberParams) -> [f64; PARAMETER_FEATURES] {
        fn scale(value: usize, (lo, hi): (usize, usize)) -> f64 {
            if hi <= lo {
                0.0
            } else {
                (value.saturating_sub(lo)) as f64 / (hi - lo) as f64
            }
        }
        [
            scale(params.word_len, self.word_len),
            scale(params.alphabet_size, self.alphabet_size),
            scale(params.window_len, self.window_len),
            if params.normalize { 1.0 } else { 0.0 },
        ]
    }
}

/// Gaussian-process regression over parameter features.
///
/// Targets are standardized before fitting; constant targets yield a
/// constant predictor.
#[derive(Clone, Debug)]
pub struct GpSurrogate {
    kernel: SurrogateKernel,
    inputs: Vec<[f64; PARAMETER_FEATURES]>,
    alpha: Vec<f64>,
    target_mean: f64,
    target_scale: f64,
}

impl GpSurrogate {
    pub fn fit(
        config: &SurrogateConfig,
        inputs: &[[f64; PARAMETER_FEATURES]],
        targets: &[f64],
    ) -> Result<Self, BossError> {
        config.validate()?;
        let n = inputs.len();
        if n != targets.len() {
            return Err(BossError::invalid_input(format!(
                "surrogate input/target mismatch: {n} inputs, {} targets",
                targets.len()
            )));
        }
        if n < 2 {
            return Err(BossError::numerical_issue(format!(
                "surrogate regression needs at least 2 observations; got {n}"
            )));
        }
        if let Some(bad) = targets.iter().find(|t| !t.is_finite()) {
            return Err(BossError::numerical_issue(format!(
                "surrogate targets must be finite; got {bad}"
            )));
        }

        let target_mean = targets.iter().sum::<f64>() / n as f64;
        let target_std = (targets
            .iter()
            .map(|t| (t - target_mean) * (t - target_mean))
            .sum::<f64>()
            / n as f64)
            .sqrt();
        let target_scale = if target_std > CONSTANT_TARGET_STD {
            target_std
        } else {
            1.0
        };
        let y: Vec<f64> = targets
            .iter()
            .map(|t| (t - target_mean) / target_scale)
            .collect();

        let mut cov = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..=i {
                let k = config.kernel.covariance(&inputs[i], &inputs[j]);
                cov[i * n + j] = k;
                cov[j * n + i] = k;
            }
            cov[i * n + i] += config.noise_variance;
        }
        cholesky_in_place(&mut cov, n)?;
        let alpha = cholesky_solve(&cov, &y, n);
        if alpha.iter().any(|a| !a.is_finite()) {
            return Err(BossError::numerical_issue(
                "non-finite surrogate weights",
            ));
        }

        Ok(Self {
            kernel: config.kernel,
            inputs: inputs.to_vec(),
            alpha,
            target_mean,
            target_scale,
        })
    }

    /// Posterior mean at `x`.
    pub fn predict(&self, x: &[f64; PARAMETER_FEATURES]) -> f64 {
        let standardized = self
            .inputs
            .iter()
            .zip(&self.alpha)
            .map(|(input, weight)| self.kernel.covariance(x, input) * weight)
            .sum::<f64>();
        self.target_mean + self.target_scale * standardized
    }
}

fn cholesky_in_place(matrix: &mut [f64], n: usize) -> Result<(), BossError> {
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i * n + j];
            for k in 0..j {
                sum -= matrix[i * n + k] * matrix[j * n + k];
            }

            if i == j {
                if !sum.is_finite() || sum <= 0.0 {
                    return Err(BossError::numerical_issue(
                        "surrogate covariance is not positive definite",
                    ));
                }
                matrix[i * n + i] = sum.sqrt();
            } else {
                matrix[i * n + j] = sum / matrix[j * n + j];
            }
        }

        for j in i + 1..n {
            matrix[i * n + j] = 0.0;
        }
    }
    Ok(())
}

/// Solves `L L^T x = y` for a lower-triangular factor stored row-major.
fn cholesky_solve(factor: &[f64], y: &[f64], n: usize) -> Vec<f64> {
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut sum = y[i];
        for k in 0..i {
            sum -= factor[i * n + k] * z[k];
        }
        z[i] = sum / factor[i * n + i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in i + 1..n {
            sum -= factor[k * n + i] * x[k];
        }
        x[i] = sum / factor[i * n + i];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::{GpSurrogate, ParameterSpace, SurrogateConfig, SurrogateKernel};
    use crate::member::MemberParams;

    fn params(word_len: usize, window_len: usize, normalize: bool) -> MemberParams {
        MemberParams {
            word_len,
            alphabet_size: 4,
            window_len,
            normalize,
        }
    }

    #[test]
    fn features_are_unit_scaled() {
        let grid = [params(8, 10, true), params(16, 50, false), params(12, 30, true)];
        let space = ParameterSpace::from_candidates(&grid);
        assert_eq!(space.features(&grid[0]), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(space.features(&grid[1]), [1.0, 0.0, 1.0, 0.0]);
        assert_eq!(space.features(&grid[2]), [0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn single_observation_fit_fails() {
        let err = GpSurrogate::fit(&SurrogateConfig::default(), &[[0.0; 4]], &[0.5])
            .expect_err("single point regression must fail");
        assert!(err.to_string().contains("at least 2 observations"));
    }

    #[test]
    fn surrogate_interpolates_smooth_targets() {
        let inputs: Vec<[f64; 4]> = (0..6).map(|i| [i as f64 / 5.0, 0.0, 0.0, 1.0]).collect();
        let targets: Vec<f64> = inputs.iter().map(|x| 0.5 + 0.4 * x[0]).collect();
        let gp = GpSurrogate::fit(&SurrogateConfig::default(), &inputs, &targets)
            .expect("fit should succeed");
        for (x, t) in inputs.iter().zip(&targets) {
            assert!((gp.predict(x) - t).abs() < 0.05, "prediction off at {x:?}");
        }
        assert!(gp.predict(&[0.9, 0.0, 0.0, 1.0]) > gp.predict(&[0.1, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn constant_targets_predict_the_constant() {
        let inputs = [[0.0, 0.0, 0.0, 0.0], [1.0, 0.0, 1.0, 1.0]];
        let gp = GpSurrogate::fit(&SurrogateConfig::default(), &inputs, &[0.7, 0.7])
            .expect("fit should succeed");
        assert!((gp.predict(&[0.5, 0.0, 0.5, 1.0]) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn invalid_kernel_is_configuration_error() {
        let config = SurrogateConfig {
            kernel: SurrogateKernel::Matern32 {
                length_scale: 0.0,
                variance: 1.0,
            },
            noise_variance: 1e-3,
        };
        let err = config.validate().expect_err("zero length scale must fail");
        assert!(err.is_configuration());
    }
}
