// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::checkpoint::PayloadCodec;
use crate::member::MemberParams;
use crate::surrogate::SurrogateConfig;
use boss_core::{BossError, DataUnit, MIN_TRAIN_INSTANCES, TimeUnit, TrainContract};
use boss_sfa::{MAX_PYRAMID_LEVELS, validate_word_shape};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
const MAX_FORWARD_COMPAT_CONFIG_SCHEMA_VERSION: u32 = CONFIG_SCHEMA_VERSION + 1;

pub type UnknownFields = Map<String, Value>;

/// How candidate members are searched for and admitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Random candidates admitted by leave-one-out accuracy up to a cap.
    #[default]
    RandomAccuracyFiltered,
    /// Random candidates admitted unconditionally.
    Random,
    /// Every normalize/window combination, best word length each.
    Exhaustive,
}

/// Order in which the random strategies draw from the candidate pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSelection {
    #[default]
    Random,
    /// Random for the first `initial_random_parameters` picks, then the
    /// candidate with the highest predicted accuracy.
    Surrogate { initial_random_parameters: usize },
}

/// Window lengths searched, relative to the series length.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowGrid {
    pub min_window: usize,
    pub max_window_proportion: f64,
    pub max_window_search_proportion: f64,
}

impl Default for WindowGrid {
    fn default() -> Self {
        Self {
            min_window: 10,
            max_window_proportion: 1.0,
            max_window_search_proportion: 0.25,
        }
    }
}

impl WindowGrid {
    fn validate(&self) -> Result<(), BossError> {
        if self.min_window < 2 {
            return Err(BossError::configuration(format!(
                "WindowGrid.min_window must be >= 2; got {}",
                self.min_window
            )));
        }
        for (name, value) in [
            ("max_window_proportion", self.max_window_proportion),
            ("max_window_search_proportion", self.max_window_search_proportion),
        ] {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(BossError::configuration(format!(
                    "WindowGrid.{name} must be in (0, 1]; got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Ascending window lengths for series of `series_len` points. When the
    /// proportional maximum falls below `min_window`, the minimum becomes
    /// half the maximum.
    pub fn windows(&self, series_len: usize) -> Vec<usize> {
        let max_window = ((series_len as f64 * self.max_window_proportion) as usize).min(series_len);
        let mut min_window = self.min_window;
        if max_window < min_window {
            min_window = max_window / 2;
        }
        let min_window = min_window.max(2);
        if max_window < min_window {
            return Vec::new();
        }

        let search_span = series_len as f64 * self.max_window_search_proportion;
        let increment = (((max_window - min_window) as f64 / search_span) as usize).max(1);
        (min_window..=max_window).step_by(increment).collect()
    }
}

/// Per-member training subsample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubsampleConfig {
    /// Fraction of the training set; `None` caps at `max_instances`.
    pub proportion: Option<f64>,
    pub max_instances: usize,
    pub stratified: bool,
}

impl Default for SubsampleConfig {
    fn default() -> Self {
        Self {
            proportion: None,
            max_instances: 1000,
            stratified: false,
        }
    }
}

impl SubsampleConfig {
    fn validate(&self) -> Result<(), BossError> {
        if let Some(proportion) = self.proportion
            && (!proportion.is_finite() || proportion <= 0.0 || proportion > 1.0)
        {
            return Err(BossError::configuration(format!(
                "SubsampleConfig.proportion must be in (0, 1]; got {proportion}"
            )));
        }
        if self.max_instances < MIN_TRAIN_INSTANCES {
            return Err(BossError::configuration(format!(
                "SubsampleConfig.max_instances must be >= {MIN_TRAIN_INSTANCES}; got {}",
                self.max_instances
            )));
        }
        Ok(())
    }

    /// Subsample size for a training set of `n` instances.
    pub fn target_size(&self, n: usize) -> usize {
        let size = match self.proportion {
            Some(proportion) => (n as f64 * proportion) as usize,
            None => self.max_instances,
        };
        size.max(MIN_TRAIN_INSTANCES).min(n)
    }
}

/// Scores candidates on a class-balanced sample instead of every instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastEstimateConfig {
    pub max_eval: usize,
    /// Overrides `max_eval` with `num_classes * max_eval_per_class`.
    pub max_eval_per_class: Option<usize>,
}

impl Default for FastEstimateConfig {
    fn default() -> Self {
        Self {
            max_eval: 500,
            max_eval_per_class: None,
        }
    }
}

impl FastEstimateConfig {
    fn validate(&self) -> Result<(), BossError> {
        if self.max_eval == 0 || self.max_eval_per_class == Some(0) {
            return Err(BossError::configuration(
                "FastEstimateConfig evaluation budget must be >= 1",
            ));
        }
        Ok(())
    }

    pub fn budget(&self, num_classes: usize) -> usize {
        self.max_eval_per_class
            .map_or(self.max_eval, |per_class| per_class.saturating_mul(num_classes))
    }
}

/// Where and how build snapshots are persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub path: PathBuf,
    pub codec: PayloadCodec,
    /// Delete the snapshot once training completes.
    pub cleanup_on_finish: bool,
}

impl CheckpointConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            codec: PayloadCodec::Bincode,
            cleanup_on_finish: true,
        }
    }
}

/// Settings for [`crate::BossEnsemble`].
///
/// Missing fields in serialized form fall back to [`Default`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub strategy: SearchStrategy,
    pub selection: ParameterSelection,
    /// Candidates to build (filtered) or members to keep (unfiltered).
    /// Ignored under a time contract.
    pub ensemble_size: usize,
    /// When set, replaces `ensemble_size` with this value per channel.
    pub ensemble_size_per_channel: Option<usize>,
    /// Member cap per channel.
    pub max_ensemble_size: usize,
    pub use_weights: bool,
    /// Drop members below `max accuracy * correctness_threshold` after the
    /// build loop.
    pub cutoff: bool,
    pub correctness_threshold: f64,
    pub word_lengths: Vec<usize>,
    pub alphabet_sizes: Vec<usize>,
    pub normalize_options: Vec<bool>,
    pub windows: WindowGrid,
    pub levels: usize,
    pub numerosity_reduction: bool,
    pub subsample: Option<SubsampleConfig>,
    pub fast_estimate: Option<FastEstimateConfig>,
    pub surrogate: SurrogateConfig,
    pub contract: TrainContract,
    pub seed: u64,
    pub threads: usize,
    pub checkpoint: Option<CheckpointConfig>,
    pub estimate_train_accuracy: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::default(),
            selection: ParameterSelection::default(),
            ensemble_size: 50,
            ensemble_size_per_channel: None,
            max_ensemble_size: 500,
            use_weights: false,
            cutoff: false,
            correctness_threshold: 0.92,
            word_lengths: vec![16, 14, 12, 10, 8],
            alphabet_sizes: vec![4],
            normalize_options: vec![true, false],
            windows: WindowGrid::default(),
            levels: 1,
            numerosity_reduction: true,
            subsample: None,
            fast_estimate: None,
            surrogate: SurrogateConfig::default(),
            contract: TrainContract::default(),
            seed: 0,
            threads: 1,
            checkpoint: None,
            estimate_train_accuracy: false,
        }
    }
}

impl EnsembleConfig {
    /// Accuracy-filtered random search with weights, a 70% subsample and
    /// surrogate-guided selection.
    pub fn recommended() -> Self {
        Self {
            ensemble_size: 250,
            max_ensemble_size: 50,
            use_weights: true,
            subsample: Some(SubsampleConfig {
                proportion: Some(0.7),
                ..SubsampleConfig::default()
            }),
            selection: ParameterSelection::Surrogate {
                initial_random_parameters: 20,
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), BossError> {
        if self.ensemble_size == 0 || self.ensemble_size_per_channel == Some(0) {
            return Err(BossError::configuration("ensemble size must be >= 1"));
        }
        if self.max_ensemble_size == 0 {
            return Err(BossError::configuration(
                "EnsembleConfig.max_ensemble_size must be >= 1; got 0",
            ));
        }
        if !self.correctness_threshold.is_finite()
            || self.correctness_threshold <= 0.0
            || self.correctness_threshold > 1.0
        {
            return Err(BossError::configuration(format!(
                "EnsembleConfig.correctness_threshold must be in (0, 1]; got {}",
                self.correctness_threshold
            )));
        }
        if self.word_lengths.is_empty()
            || self.alphabet_sizes.is_empty()
            || self.normalize_options.is_empty()
        {
            return Err(BossError::configuration(
                "word_lengths, alphabet_sizes and normalize_options must be non-empty",
            ));
        }
        for &alphabet_size in &self.alphabet_sizes {
            for &word_len in &self.word_lengths {
                validate_word_shape(alphabet_size, word_len)?;
            }
        }
        self.windows.validate()?;
        if self.levels == 0 || self.levels > MAX_PYRAMID_LEVELS {
            return Err(BossError::configuration(format!(
                "EnsembleConfig.levels must be in 1..={MAX_PYRAMID_LEVELS}; got {}",
                self.levels
            )));
        }
        if let Some(subsample) = &self.subsample {
            subsample.validate()?;
        }
        if let Some(fast_estimate) = &self.fast_estimate {
            fast_estimate.validate()?;
        }
        self.surrogate.validate()?;
        self.contract.validate()?;
        if self.threads == 0 {
            return Err(BossError::configuration(
                "EnsembleConfig.threads must be >= 1; got 0",
            ));
        }
        if let Some(checkpoint) = &self.checkpoint
            && checkpoint.path.as_os_str().is_empty()
        {
            return Err(BossError::configuration("checkpoint path must be non-empty"));
        }
        Ok(())
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_selection(mut self, selection: ParameterSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_ensemble_size(mut self, ensemble_size: usize) -> Self {
        self.ensemble_size = ensemble_size;
        self
    }

    pub fn with_max_ensemble_size(mut self, max_ensemble_size: usize) -> Self {
        self.max_ensemble_size = max_ensemble_size;
        self
    }

    pub fn with_weights(mut self, use_weights: bool) -> Self {
        self.use_weights = use_weights;
        self
    }

    pub fn with_cutoff(mut self, cutoff: bool) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_word_lengths(mut self, word_lengths: Vec<usize>) -> Self {
        self.word_lengths = word_lengths;
        self
    }

    pub fn with_subsample(mut self, subsample: Option<SubsampleConfig>) -> Self {
        self.subsample = subsample;
        self
    }

    pub fn with_fast_estimate(mut self, fast_estimate: Option<FastEstimateConfig>) -> Self {
        self.fast_estimate = fast_estimate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: Option<CheckpointConfig>) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn with_train_time_limit(mut self, unit: TimeUnit, amount: u64) -> Result<Self, BossError> {
        self.contract = self.contract.with_time_limit(unit, amount)?;
        Ok(self)
    }

    pub fn with_memory_limit(mut self, unit: DataUnit, amount: u64) -> Result<Self, BossError> {
        self.contract = self.contract.with_memory_limit(unit, amount)?;
        Ok(self)
    }

    /// Target count of the build loop for `n_channels` channels.
    pub fn effective_ensemble_size(&self, n_channels: usize) -> usize {
        self.ensemble_size_per_channel
            .map_or(self.ensemble_size, |per_channel| {
                per_channel.saturating_mul(n_channels)
            })
    }

    /// Every (normalize, alphabet, window, word length) combination, in that
    /// nesting order.
    pub fn parameter_grid(&self, series_len: usize) -> Vec<MemberParams> {
        let windows = self.windows.windows(series_len);
        let mut grid = Vec::new();
        for &normalize in &self.normalize_options {
            for &alphabet_size in &self.alphabet_sizes {
                for &window_len in &windows {
                    for &word_len in &self.word_lengths {
                        grid.push(MemberParams {
                            word_len,
                            alphabet_size,
                            window_len,
                            normalize,
                        });
                    }
                }
            }
        }
        grid
    }

    /// One candidate per (normalize, alphabet, window) at the longest word
    /// length; shorter lengths are reached by shortening.
    pub fn exhaustive_grid(&self, series_len: usize) -> Vec<MemberParams> {
        let longest = self.word_lengths.iter().copied().max().unwrap_or(0);
        let windows = self.windows.windows(series_len);
        let mut grid = Vec::new();
        for &normalize in &self.normalize_options {
            for &alphabet_size in &self.alphabet_sizes {
                for &window_len in &windows {
                    grid.push(MemberParams {
                        word_len: longest,
                        alphabet_size,
                        window_len,
                        normalize,
                    });
                }
            }
        }
        grid
    }

    /// Word lengths from longest to shortest, deduplicated.
    pub fn descending_word_lengths(&self) -> Vec<usize> {
        let mut lengths = self.word_lengths.clone();
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        lengths.dedup();
        lengths
    }

    /// Stable JSON used to decide whether a snapshot belongs to this
    /// configuration. Settings that do not change the search are excluded.
    pub fn search_fingerprint(&self) -> Result<String, BossError> {
        let mut search = self.clone();
        search.threads = 1;
        search.checkpoint = None;
        search.estimate_train_accuracy = false;
        let encoded = serde_json::to_vec(&search).map_err(|err| {
            BossError::configuration(format!("failed to encode config fingerprint: {err}"))
        })?;
        Ok(format!("{:08x}", crc32fast::hash(&encoded)))
    }

    pub fn from_json(text: &str) -> Result<Self, BossError> {
        let wire: EnsembleConfigWire = serde_json::from_str(text).map_err(|err| {
            BossError::configuration(format!("EnsembleConfig JSON parse failed: {err}"))
        })?;
        wire.to_runtime()
    }

    pub fn to_json(&self) -> Result<String, BossError> {
        serde_json::to_string_pretty(&EnsembleConfigWire::from_runtime(self.clone())).map_err(
            |err| BossError::configuration(format!("EnsembleConfig JSON encode failed: {err}")),
        )
    }
}

fn validate_config_schema_version(schema_version: u32) -> Result<(), BossError> {
    if (CONFIG_SCHEMA_VERSION..=MAX_FORWARD_COMPAT_CONFIG_SCHEMA_VERSION).contains(&schema_version)
    {
        return Ok(());
    }
    Err(BossError::configuration(format!(
        "EnsembleConfig schema_version={schema_version} is unsupported; supported versions are {CONFIG_SCHEMA_VERSION}..={MAX_FORWARD_COMPAT_CONFIG_SCHEMA_VERSION}"
    )))
}

/// Wire format for versioned ensemble config payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfigWire {
    pub schema_version: u32,
    #[serde(flatten)]
    pub config: EnsembleConfig,
    #[serde(default, flatten)]
    pub unknown_fields: UnknownFields,
}

impl EnsembleConfigWire {
    pub fn from_runtime(config: EnsembleConfig) -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            config,
            unknown_fields: UnknownFields::new(),
        }
    }

    pub fn into_runtime_parts(self) -> Result<(EnsembleConfig, UnknownFields), BossError> {
        validate_config_schema_version(self.schema_version)?;
        self.config.validate()?;
        Ok((self.config, self.unknown_fields))
    }

    pub fn to_runtime(self) -> Result<EnsembleConfig, BossError> {
        let (config, _) = self.into_runtime_parts()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EnsembleConfig, EnsembleConfigWire, FastEstimateConfig, ParameterSelection,
        SearchStrategy, SubsampleConfig, WindowGrid,
    };
    use boss_core::TimeUnit;

    #[test]
    fn defaults_validate() {
        let config = EnsembleConfig::default();
        config.validate().expect("default config should be valid");
        assert_eq!(config.strategy, SearchStrategy::RandomAccuracyFiltered);
        assert_eq!(config.ensemble_size, 50);
        assert_eq!(config.max_ensemble_size, 500);
        assert!(!config.cutoff);
        EnsembleConfig::recommended()
            .validate()
            .expect("recommended config should be valid");
    }

    #[test]
    fn window_grid_spans_min_to_max() {
        let windows = WindowGrid::default().windows(64);
        assert_eq!(windows.first(), Some(&10));
        assert!(windows.iter().all(|w| *w <= 64));
        assert!(windows.windows(2).all(|pair| pair[1] - pair[0] == 3));
    }

    #[test]
    fn short_series_halve_the_minimum_window() {
        let windows = WindowGrid::default().windows(8);
        assert_eq!(windows.first(), Some(&4));
        assert_eq!(windows.last(), Some(&8));
        assert!(WindowGrid::default().windows(2).len() <= 1);
    }

    #[test]
    fn parameter_grid_covers_every_combination() {
        let config = EnsembleConfig::default();
        let windows = config.windows.windows(64).len();
        assert_eq!(config.parameter_grid(64).len(), 2 * windows * 5);
        let exhaustive = config.exhaustive_grid(64);
        assert_eq!(exhaustive.len(), 2 * windows);
        assert!(exhaustive.iter().all(|p| p.word_len == 16));
        assert_eq!(config.descending_word_lengths(), vec![16, 14, 12, 10, 8]);
    }

    #[test]
    fn invalid_settings_are_configuration_errors() {
        let cases = [
            EnsembleConfig::default().with_max_ensemble_size(0),
            EnsembleConfig::default().with_threads(0),
            EnsembleConfig::default().with_word_lengths(vec![1]),
            EnsembleConfig::default().with_word_lengths(vec![]),
            EnsembleConfig::default().with_fast_estimate(Some(FastEstimateConfig {
                max_eval: 0,
                max_eval_per_class: None,
            })),
            EnsembleConfig::default().with_subsample(Some(SubsampleConfig {
                proportion: Some(1.5),
                ..SubsampleConfig::default()
            })),
        ];
        for config in cases {
            let err = config.validate().expect_err("invalid config must fail");
            assert!(err.is_configuration(), "unexpected error {err}");
        }
    }

    #[test]
    fn subsample_and_fast_estimate_sizes() {
        let by_proportion = SubsampleConfig {
            proportion: Some(0.5),
            ..SubsampleConfig::default()
        };
        assert_eq!(by_proportion.target_size(20), 10);
        assert_eq!(by_proportion.target_size(3), 2);
        assert_eq!(SubsampleConfig::default().target_size(20), 20);

        let per_class = FastEstimateConfig {
            max_eval: 500,
            max_eval_per_class: Some(4),
        };
        assert_eq!(per_class.budget(3), 12);
        assert_eq!(FastEstimateConfig::default().budget(3), 500);
    }

    #[test]
    fn json_round_trip_keeps_unknown_fields_out_of_runtime() {
        let config = EnsembleConfig::recommended()
            .with_seed(9)
            .with_train_time_limit(TimeUnit::Seconds, 30)
            .expect("valid limit");
        let text = config.to_json().expect("config should encode");
        assert!(text.contains("\"schema_version\": 1"));
        assert_eq!(EnsembleConfig::from_json(&text).expect("config should decode"), config);

        let wire: EnsembleConfigWire =
            serde_json::from_str(r#"{"schema_version":1,"ensemble_size":7,"future_knob":true}"#)
                .expect("wire should parse");
        let (runtime, unknown) = wire.into_runtime_parts().expect("wire should convert");
        assert_eq!(runtime.ensemble_size, 7);
        assert_eq!(runtime.max_ensemble_size, 500);
        assert!(unknown.contains_key("future_knob"));
    }

    #[test]
    fn unsupported_schema_version_is_rejected() {
        let err = EnsembleConfig::from_json(r#"{"schema_version":99}"#)
            .expect_err("future schema must fail");
        assert!(err.to_string().contains("schema_version=99"));
    }

    #[test]
    fn search_fingerprint_ignores_run_settings() {
        let base = EnsembleConfig::default();
        let threaded = base.clone().with_threads(4);
        assert_eq!(
            base.search_fingerprint().expect("fingerprint"),
            threaded.search_fingerprint().expect("fingerprint")
        );
        let reseeded = base.clone().with_seed(1);
        assert_ne!(
            base.search_fingerprint().expect("fingerprint"),
            reseeded.search_fingerprint().expect("fingerprint")
        );
        let surrogate = base.with_selection(ParameterSelection::Surrogate {
            initial_random_parameters: 3,
        });
        surrogate.validate().expect("surrogate selection is valid");
    }
}
