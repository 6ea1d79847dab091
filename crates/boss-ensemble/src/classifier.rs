// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::checkpoint::{DatasetShape, SnapshotWriter, load_snapshot_file, remove_snapshot_file};
use crate::config::{CheckpointConfig, EnsembleConfig};
use crate::controller::{BuildStatus, EnsembleController, EnsembleState};
use crate::member::{BossMember, MemberParams};
use crate::pool::ScoringPool;
use boss_core::{
    BossError, DataUnit, Dataset, Instance, Predictive, TimeUnit, Trainable, argmax_first,
    check_query_shape,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Ensemble predictions for its own training set, each instance scored
/// without itself as a reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainEstimate {
    pub accuracy: f64,
    pub predictions: Vec<usize>,
    pub probabilities: Vec<Vec<f64>>,
}

#[derive(Debug)]
struct TrainedEnsemble {
    state: EnsembleState,
    num_classes: usize,
    n_instances: usize,
    n_channels: usize,
    series_len: usize,
    train_estimate: Option<TrainEstimate>,
}

/// Contract-bounded ensemble of BOSS members, one member set per channel.
#[derive(Debug)]
pub struct BossEnsemble {
    config: EnsembleConfig,
    pool: ScoringPool,
    trained: Option<TrainedEnsemble>,
    tie_rng: Mutex<ChaCha8Rng>,
}

impl BossEnsemble {
    pub fn new(config: EnsembleConfig) -> Result<Self, BossError> {
        config.validate()?;
        let pool = ScoringPool::new(config.threads)?;
        let tie_rng = Mutex::new(ChaCha8Rng::seed_from_u64(config.seed));
        Ok(Self {
            config,
            pool,
            trained: None,
            tie_rng,
        })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn set_train_time_limit(&mut self, unit: TimeUnit, amount: u64) -> Result<(), BossError> {
        self.config.contract = self.config.contract.with_time_limit(unit, amount)?;
        Ok(())
    }

    pub fn set_memory_limit(&mut self, unit: DataUnit, amount: u64) -> Result<(), BossError> {
        self.config.contract = self.config.contract.with_memory_limit(unit, amount)?;
        Ok(())
    }

    /// Enables snapshots at `path`, keeping any other checkpoint settings.
    pub fn set_checkpoint_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        match &mut self.config.checkpoint {
            Some(checkpoint) => checkpoint.path = path,
            None => self.config.checkpoint = Some(CheckpointConfig::new(path)),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// Final build state, including search history.
    pub fn state(&self) -> Option<&EnsembleState> {
        self.trained.as_ref().map(|trained| &trained.state)
    }

    pub fn build_status(&self) -> Option<BuildStatus> {
        self.state().map(EnsembleState::status)
    }

    pub fn members(&self, channel: usize) -> &[BossMember] {
        self.state()
            .and_then(|state| state.channels().get(channel))
            .map(|channel| channel.members())
            .unwrap_or_default()
    }

    pub fn ensemble_size(&self) -> usize {
        self.state().map_or(0, EnsembleState::member_count)
    }

    pub fn train_estimate(&self) -> Option<&TrainEstimate> {
        self.trained
            .as_ref()
            .and_then(|trained| trained.train_estimate.as_ref())
    }

    /// One line per kept member: channel, parameters, accuracy and weight.
    pub fn parameters_summary(&self) -> String {
        let mut lines = vec![format!(
            "strategy={:?},members={},status={:?}",
            self.config.strategy,
            self.ensemble_size(),
            self.build_status()
        )];
        if let Some(state) = self.state() {
            for (channel, channel_state) in state.channels().iter().enumerate() {
                for member in channel_state.members() {
                    let accuracy = member
                        .accuracy()
                        .map_or_else(|| "none".to_string(), |acc| format!("{acc:.4}"));
                    lines.push(format!(
                        "channel={channel},{},accuracy={accuracy},weight={:.4}",
                        member.params(),
                        member.weight()
                    ));
                }
            }
        }
        lines.join("\n")
    }

    fn trained(&self) -> Result<&TrainedEnsemble, BossError> {
        let Some(trained) = &self.trained else {
            return Err(BossError::empty_ensemble("classifier has not been trained"));
        };
        if trained.state.member_count() == 0 {
            return Err(BossError::empty_ensemble(format!(
                "training kept no members (status={:?})",
                trained.state.status()
            )));
        }
        Ok(trained)
    }

    fn initial_state(
        &self,
        data: &Dataset,
        fingerprint: &str,
        shape: &DatasetShape,
    ) -> Result<EnsembleState, BossError> {
        if let Some(checkpoint) = &self.config.checkpoint
            && checkpoint.path.exists()
        {
            match load_snapshot_file(&checkpoint.path)
                .and_then(|snapshot| snapshot.restore(fingerprint, shape))
            {
                Ok(state) => {
                    info!(
                        path = %checkpoint.path.display(),
                        members = state.member_count(),
                        candidates_built = state.candidates_built(),
                        elapsed_ns = state.elapsed_ns(),
                        "resuming ensemble build from snapshot"
                    );
                    return Ok(state);
                }
                Err(err) => warn!(
                    path = %checkpoint.path.display(),
                    %err,
                    "ignoring unusable snapshot; starting a fresh build"
                ),
            }
        }
        EnsembleState::new(&self.config, data.n_channels(), data.series_len())
    }

    /// Normalized per-channel vote shares averaged over channels that voted.
    fn combine_votes(votes: &[Vec<f64>]) -> Vec<f64> {
        let num_classes = votes.first().map_or(0, Vec::len);
        let mut combined = vec![0.0; num_classes];
        let mut voting_channels = 0usize;
        for channel_votes in votes {
            let total: f64 = channel_votes.iter().sum();
            if total <= 0.0 {
                continue;
            }
            voting_channels += 1;
            for (slot, vote) in combined.iter_mut().zip(channel_votes) {
                *slot += vote / total;
            }
        }
        if voting_channels > 0 {
            for slot in &mut combined {
                *slot /= voting_channels as f64;
            }
        }
        combined
    }

    fn accumulate(
        trained: &TrainedEnsemble,
        votes: &mut [Vec<f64>],
        channel: usize,
        member: &BossMember,
        label: usize,
    ) -> Result<(), BossError> {
        if label >= trained.num_classes {
            return Err(BossError::invalid_input(format!(
                "member predicted label {label}, expected < {}",
                trained.num_classes
            )));
        }
        votes[channel][label] += member.weight();
        Ok(())
    }

    fn member_tasks(trained: &TrainedEnsemble) -> Vec<(usize, &BossMember)> {
        trained
            .state
            .channels()
            .iter()
            .enumerate()
            .flat_map(|(channel, state)| state.members().iter().map(move |member| (channel, member)))
            .collect()
    }

    /// Leave-one-out style ensemble estimate over the training set: members
    /// skip the instance itself, or classify it as an unseen series when it
    /// was outside their subsample.
    pub fn estimate_train_accuracy(&self, data: &Dataset) -> Result<TrainEstimate, BossError> {
        let trained = self.trained()?;
        if data.len() != trained.n_instances
            || data.n_channels() != trained.n_channels
            || data.series_len() != trained.series_len
        {
            return Err(BossError::invalid_input(
                "train estimate requires the dataset the ensemble was trained on",
            ));
        }

        let tasks = Self::member_tasks(trained);
        let per_instance = self.pool.map(data.len(), |idx| {
            let instance = data.instance(idx);
            let mut votes = vec![vec![0.0; trained.num_classes]; trained.n_channels];
            for &(channel, member) in &tasks {
                let label = match member.subsample_indices() {
                    None => member.classify_train_index(idx)?,
                    Some(indices) => match indices.binary_search(&idx) {
                        Ok(position) => member.classify_train_index(position)?,
                        Err(_) => member.classify_series(instance.channel(channel))?,
                    },
                };
                Self::accumulate(trained, &mut votes, channel, member, label)?;
            }
            Ok::<Vec<f64>, BossError>(Self::combine_votes(&votes))
        });

        let probabilities = per_instance.into_iter().collect::<Result<Vec<_>, _>>()?;
        let predictions: Vec<usize> = probabilities.iter().map(|p| argmax_first(p)).collect();
        let correct = predictions
            .iter()
            .zip(data.instances())
            .filter(|(predicted, instance)| instance.label() == Some(**predicted))
            .count();
        Ok(TrainEstimate {
            accuracy: correct as f64 / data.len() as f64,
            predictions,
            probabilities,
        })
    }
}

impl Trainable for BossEnsemble {
    fn fit(&mut self, data: &Dataset) -> Result<(), BossError> {
        self.config.validate()?;
        let fingerprint = self.config.search_fingerprint()?;
        let shape = DatasetShape::of(data);
        let state = self.initial_state(data, &fingerprint, &shape)?;
        let writer = self
            .config
            .checkpoint
            .as_ref()
            .map(|checkpoint| SnapshotWriter::new(checkpoint, fingerprint, shape));

        let state = EnsembleController::new(&self.config, data, &self.pool, state, writer)?.run()?;

        if let Some(checkpoint) = &self.config.checkpoint
            && checkpoint.cleanup_on_finish
        {
            match remove_snapshot_file(&checkpoint.path) {
                Ok(removed) => debug!(path = %checkpoint.path.display(), removed, "snapshot cleanup"),
                Err(err) => warn!(path = %checkpoint.path.display(), %err, "snapshot cleanup failed"),
            }
        }
        if state.member_count() == 0 {
            warn!(status = ?state.status(), "training kept no members; prediction will fail");
        }

        self.tie_rng = Mutex::new(state.rng().clone());
        self.trained = Some(TrainedEnsemble {
            state,
            num_classes: data.num_classes(),
            n_instances: data.len(),
            n_channels: data.n_channels(),
            series_len: data.series_len(),
            train_estimate: None,
        });

        if self.config.estimate_train_accuracy && self.ensemble_size() > 0 {
            let estimate = self.estimate_train_accuracy(data)?;
            info!(accuracy = estimate.accuracy, "ensemble train estimate");
            if let Some(trained) = self.trained.as_mut() {
                trained.train_estimate = Some(estimate);
            }
        }
        Ok(())
    }
}

impl Predictive for BossEnsemble {
    fn num_classes(&self) -> usize {
        self.trained.as_ref().map_or(0, |trained| trained.num_classes)
    }

    fn predict_proba(&self, instance: &Instance) -> Result<Vec<f64>, BossError> {
        let trained = self.trained()?;
        check_query_shape(instance, trained.n_channels, trained.series_len)?;

        let tasks = Self::member_tasks(trained);
        let labels = self.pool.map(tasks.len(), |k| {
            let (channel, member) = tasks[k];
            member.classify_series(instance.channel(channel))
        });

        let mut votes = vec![vec![0.0; trained.num_classes]; trained.n_channels];
        for (&(channel, member), label) in tasks.iter().zip(labels) {
            Self::accumulate(trained, &mut votes, channel, member, label?)?;
        }
        Ok(Self::combine_votes(&votes))
    }

    /// Most probable class; exact ties are broken by a seeded coin flip.
    fn predict(&self, instance: &Instance) -> Result<usize, BossError> {
        let probabilities = self.predict_proba(instance)?;
        let mut rng = self.tie_rng.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(argmax_with_coin_flip(&probabilities, &mut *rng))
    }
}

fn argmax_with_coin_flip<R: Rng>(values: &[f64], rng: &mut R) -> usize {
    let mut best = 0;
    for idx in 1..values.len() {
        if values[idx] > values[best] || (values[idx] == values[best] && rng.gen_bool(0.5)) {
            best = idx;
        }
    }
    best
}

/// Settings for a single-parameter [`IndividualBoss`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndividualBossConfig {
    pub params: MemberParams,
    pub levels: usize,
    pub numerosity_reduction: bool,
}

impl Default for IndividualBossConfig {
    fn default() -> Self {
        Self {
            params: MemberParams {
                word_len: 8,
                alphabet_size: 4,
                window_len: 10,
                normalize: true,
            },
            levels: 1,
            numerosity_reduction: true,
        }
    }
}

/// One BOSS member used directly as a univariate 1-NN classifier.
#[derive(Clone, Debug)]
pub struct IndividualBoss {
    config: IndividualBossConfig,
    member: Option<BossMember>,
    num_classes: usize,
    series_len: usize,
}

impl IndividualBoss {
    pub fn new(config: IndividualBossConfig) -> Self {
        Self {
            config,
            member: None,
            num_classes: 0,
            series_len: 0,
        }
    }

    pub fn member(&self) -> Option<&BossMember> {
        self.member.as_ref()
    }

    fn fitted(&self) -> Result<&BossMember, BossError> {
        self.member
            .as_ref()
            .ok_or_else(|| BossError::empty_ensemble("classifier has not been trained"))
    }

    /// Leave-one-out accuracy on the training set.
    pub fn train_accuracy(&self) -> Result<f64, BossError> {
        let member = self.fitted()?;
        Ok(member
            .train_accuracy(None, None, &ScoringPool::sequential())?
            .accuracy)
    }
}

impl Trainable for IndividualBoss {
    fn fit(&mut self, data: &Dataset) -> Result<(), BossError> {
        if data.is_multivariate() {
            return Err(BossError::invalid_input(format!(
                "IndividualBoss handles univariate series only; got {} channels",
                data.n_channels()
            )));
        }
        let member = BossMember::build(
            self.config.params,
            &data.channel_series(0),
            &data.labels(),
            self.config.levels,
            self.config.numerosity_reduction,
        )?;
        self.num_classes = data.num_classes();
        self.series_len = data.series_len();
        self.member = Some(member);
        Ok(())
    }
}

impl Predictive for IndividualBoss {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict_proba(&self, instance: &Instance) -> Result<Vec<f64>, BossError> {
        let member = self.fitted()?;
        check_query_shape(instance, 1, self.series_len)?;
        member.distribution_for_series(instance.channel(0), self.num_classes)
    }
}
