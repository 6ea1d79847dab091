// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::checkpoint::SnapshotWriter;
use crate::config::{EnsembleConfig, ParameterSelection, SearchStrategy};
use crate::member::{BossMember, MemberParams};
use crate::memory::{estimate_member_bytes, estimate_members_bytes};
use crate::pool::ScoringPool;
use crate::sampler::{round_robin_sample, stratified_subsample, uniform_subsample};
use crate::surrogate::{GpSurrogate, PARAMETER_FEATURES, ParameterSpace, SurrogateConfig};
use boss_core::{BossError, ContractClock, ContractStatus, Dataset};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Why the build loop stopped, or that it has not yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    InProgress,
    TargetReached,
    PoolExhausted,
    TimeExhausted,
    MemoryExhausted,
}

/// One evaluated candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateOutcome {
    pub params: MemberParams,
    /// Training accuracy estimate; `None` when it was not needed. Candidates
    /// whose data could not be discretized record 0.
    pub accuracy: Option<f64>,
    pub build_ns: u64,
    pub memory_bytes: u64,
    pub accepted: bool,
}

/// Search state of one channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelState {
    members: Vec<BossMember>,
    pool: Vec<MemberParams>,
    history: Vec<CandidateOutcome>,
    built: usize,
    random_picks: usize,
}

impl ChannelState {
    fn new(pool: Vec<MemberParams>) -> Self {
        Self {
            members: Vec::new(),
            pool,
            history: Vec::new(),
            built: 0,
            random_picks: 0,
        }
    }

    pub fn members(&self) -> &[BossMember] {
        &self.members
    }

    /// Candidates not yet drawn.
    pub fn pool(&self) -> &[MemberParams] {
        &self.pool
    }

    pub fn history(&self) -> &[CandidateOutcome] {
        &self.history
    }

    pub fn built(&self) -> usize {
        self.built
    }

    /// Index and accuracy of the first least accurate member.
    fn lowest(&self) -> Option<(usize, f64)> {
        let mut lowest: Option<(usize, f64)> = None;
        for (idx, member) in self.members.iter().enumerate() {
            let accuracy = member.accuracy().unwrap_or(0.0);
            if lowest.is_none_or(|(_, current)| accuracy < current) {
                lowest = Some((idx, accuracy));
            }
        }
        lowest
    }

    fn highest_accuracy(&self) -> Option<f64> {
        self.members
            .iter()
            .filter_map(BossMember::accuracy)
            .fold(None, |best, accuracy| {
                Some(best.map_or(accuracy, |current: f64| current.max(accuracy)))
            })
    }

    fn record(&mut self, outcome: CandidateOutcome) {
        self.history.push(outcome);
        self.built += 1;
    }

    fn cull_below(&mut self, floor: f64) -> usize {
        let before = self.members.len();
        self.members
            .retain(|member| member.accuracy().is_none_or(|accuracy| accuracy >= floor));
        before - self.members.len()
    }
}

/// Complete build-loop state; snapshots persist exactly this.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnsembleState {
    channels: Vec<ChannelState>,
    current_channel: usize,
    elapsed_ns: u64,
    bytes_used: u64,
    status: BuildStatus,
    space: ParameterSpace,
    rng: ChaCha8Rng,
}

impl EnsembleState {
    /// Fresh state with one full candidate pool per channel.
    pub fn new(
        config: &EnsembleConfig,
        n_channels: usize,
        series_len: usize,
    ) -> Result<Self, BossError> {
        if n_channels == 0 {
            return Err(BossError::invalid_input("ensemble needs at least one channel"));
        }
        let grid = match config.strategy {
            SearchStrategy::Exhaustive => config.exhaustive_grid(series_len),
            SearchStrategy::RandomAccuracyFiltered | SearchStrategy::Random => {
                config.parameter_grid(series_len)
            }
        };
        if grid.is_empty() {
            return Err(BossError::configuration(format!(
                "no candidate parameters for series of length {series_len}"
            )));
        }
        let space = ParameterSpace::from_candidates(&grid);
        Ok(Self {
            channels: (0..n_channels).map(|_| ChannelState::new(grid.clone())).collect(),
            current_channel: 0,
            elapsed_ns: 0,
            bytes_used: 0,
            status: BuildStatus::InProgress,
            space,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
        })
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }

    /// Contracted build time spent so far, checkpoint writes excluded.
    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed_ns
    }

    /// Analytical memory estimate of every kept member.
    pub fn bytes_used(&self) -> u64 {
        self.bytes_used
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    pub fn member_count(&self) -> usize {
        self.channels.iter().map(|channel| channel.members.len()).sum()
    }

    pub fn candidates_built(&self) -> usize {
        self.channels.iter().map(|channel| channel.built).sum()
    }

    pub(crate) fn rng(&self) -> &ChaCha8Rng {
        &self.rng
    }
}

/// Drives candidate selection, scoring and admission until a stopping
/// condition holds.
pub struct EnsembleController<'a> {
    config: &'a EnsembleConfig,
    pool: &'a ScoringPool,
    num_classes: usize,
    labels: Vec<usize>,
    series: Vec<Vec<&'a [f64]>>,
    target_size: usize,
    clock: ContractClock,
    state: EnsembleState,
    writer: Option<SnapshotWriter>,
}

impl<'a> EnsembleController<'a> {
    pub fn new(
        config: &'a EnsembleConfig,
        data: &'a Dataset,
        pool: &'a ScoringPool,
        state: EnsembleState,
        writer: Option<SnapshotWriter>,
    ) -> Result<Self, BossError> {
        config.validate()?;
        if state.channels.len() != data.n_channels() {
            return Err(BossError::invalid_input(format!(
                "state has {} channels, dataset has {}",
                state.channels.len(),
                data.n_channels()
            )));
        }
        let series = (0..data.n_channels())
            .map(|channel| data.channel_series(channel))
            .collect();
        Ok(Self {
            config,
            pool,
            num_classes: data.num_classes(),
            labels: data.labels(),
            series,
            target_size: config.effective_ensemble_size(data.n_channels()),
            clock: ContractClock::resume_from(state.elapsed_ns),
            state,
            writer,
        })
    }

    pub fn run(mut self) -> Result<EnsembleState, BossError> {
        info!(
            strategy = ?self.config.strategy,
            channels = self.state.channels.len(),
            candidates = self.state.channels.iter().map(|c| c.pool.len()).sum::<usize>(),
            resumed_members = self.state.member_count(),
            resumed_elapsed_ns = self.state.elapsed_ns,
            "starting ensemble build"
        );

        let status = match self.config.strategy {
            SearchStrategy::Exhaustive => self.run_exhaustive()?,
            SearchStrategy::RandomAccuracyFiltered | SearchStrategy::Random => {
                self.run_random()?
            }
        };
        if self.config.cutoff && self.config.strategy != SearchStrategy::Exhaustive {
            self.apply_cutoff();
        }
        self.state.status = status;
        self.persist();

        info!(
            status = ?status,
            members = self.state.member_count(),
            candidates_built = self.state.candidates_built(),
            elapsed_ns = self.state.elapsed_ns,
            bytes_used = self.state.bytes_used,
            "ensemble build finished"
        );
        Ok(self.state)
    }

    fn filtered(&self) -> bool {
        self.config.strategy == SearchStrategy::RandomAccuracyFiltered
    }

    fn channel_at_cap(&self, channel: usize) -> bool {
        self.state.channels[channel].members.len() >= self.config.max_ensemble_size
    }

    fn stop_status(&self) -> Option<BuildStatus> {
        match self
            .config
            .contract
            .check(self.clock.elapsed_ns(), self.state.bytes_used)
        {
            ContractStatus::TimeExhausted => return Some(BuildStatus::TimeExhausted),
            ContractStatus::MemoryExhausted => return Some(BuildStatus::MemoryExhausted),
            ContractStatus::WithinContract => {}
        }
        if self.state.channels.iter().all(|channel| channel.pool.is_empty()) {
            return Some(BuildStatus::PoolExhausted);
        }

        let timed = self.config.contract.has_time_limit();
        let reached = match self.config.strategy {
            SearchStrategy::RandomAccuracyFiltered => {
                !timed && self.state.candidates_built() >= self.target_size
            }
            SearchStrategy::Random => {
                (0..self.state.channels.len()).all(|channel| self.channel_at_cap(channel))
                    || (!timed && self.state.member_count() >= self.target_size)
            }
            SearchStrategy::Exhaustive => false,
        };
        reached.then_some(BuildStatus::TargetReached)
    }

    fn advance_channel(&mut self) {
        self.state.current_channel = (self.state.current_channel + 1) % self.state.channels.len();
    }

    fn refresh_bytes(&mut self) {
        self.state.bytes_used =
            estimate_members_bytes(self.state.channels.iter().flat_map(|c| c.members.iter()));
    }

    fn persist(&mut self) {
        self.state.elapsed_ns = self.clock.elapsed_ns();
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let state = &self.state;
        self.clock.excluding(|| writer.save(state));
    }

    fn run_random(&mut self) -> Result<BuildStatus, BossError> {
        loop {
            if let Some(status) = self.stop_status() {
                return Ok(status);
            }
            let channel = self.state.current_channel;
            let skip = self.state.channels[channel].pool.is_empty()
                || (!self.filtered() && self.channel_at_cap(channel));
            if skip {
                self.advance_channel();
                continue;
            }

            let started = Instant::now();
            self.prune_pool(channel);
            let Some(params) = self.select_candidate(channel) else {
                self.advance_channel();
                continue;
            };
            if self.evaluate_random_candidate(channel, params, started)? {
                self.persist();
            }
            self.advance_channel();
        }
    }

    /// Drops candidates the surrogate predicts would overrun the remaining
    /// time or memory budget.
    fn prune_pool(&mut self, channel: usize) {
        let contract = self.config.contract;
        if let Some(remaining) = contract.remaining_time_ns(self.clock.elapsed_ns()) {
            self.prune_by(channel, remaining as f64, "time", |o| o.build_ns as f64);
        }
        if let Some(remaining) = contract.remaining_memory_bytes(self.state.bytes_used) {
            self.prune_by(channel, remaining as f64, "memory", |o| o.memory_bytes as f64);
        }
    }

    fn prune_by(
        &mut self,
        channel: usize,
        budget: f64,
        resource: &'static str,
        observed: fn(&CandidateOutcome) -> f64,
    ) {
        let space = self.state.space;
        let state = &mut self.state.channels[channel];
        if state.history.len() < 2 || state.pool.is_empty() {
            return;
        }
        let inputs: Vec<[f64; PARAMETER_FEATURES]> = state
            .history
            .iter()
            .map(|outcome| space.features(&outcome.params))
            .collect();
        let targets: Vec<f64> = state.history.iter().map(observed).collect();
        let surrogate = match GpSurrogate::fit(&self.config.surrogate, &inputs, &targets) {
            Ok(surrogate) => surrogate,
            Err(err) => {
                debug!(channel, resource, %err, "surrogate fit failed; pool left unpruned");
                return;
            }
        };

        let before = state.pool.len();
        state
            .pool
            .retain(|params| surrogate.predict(&space.features(params)) <= budget);
        let pruned = before - state.pool.len();
        if pruned > 0 {
            debug!(
                channel,
                resource,
                pruned,
                remaining_candidates = state.pool.len(),
                "pruned candidates predicted to exceed the contract"
            );
        }
    }

    fn select_candidate(&mut self, channel: usize) -> Option<MemberParams> {
        let EnsembleState {
            channels,
            rng,
            space,
            ..
        } = &mut self.state;
        let state = &mut channels[channel];
        if state.pool.is_empty() {
            return None;
        }

        let idx = match self.config.selection {
            ParameterSelection::Surrogate {
                initial_random_parameters,
            } if state.random_picks >= initial_random_parameters => {
                best_predicted(&self.config.surrogate, space, &state.history, &state.pool)
                    .unwrap_or_else(|| rng.gen_range(0..state.pool.len()))
            }
            ParameterSelection::Surrogate { .. } => {
                state.random_picks += 1;
                rng.gen_range(0..state.pool.len())
            }
            ParameterSelection::Random => rng.gen_range(0..state.pool.len()),
        };
        Some(state.pool.remove(idx))
    }

    /// Builds a member on the configured subsample. `None` when the data
    /// cannot be discretized under `params`.
    fn build_member(
        &mut self,
        channel: usize,
        params: MemberParams,
    ) -> Result<Option<(BossMember, Vec<usize>)>, BossError> {
        let series = &self.series[channel];
        let n = series.len();
        let subsample = match &self.config.subsample {
            Some(subsample) if subsample.target_size(n) < n => {
                let size = subsample.target_size(n);
                Some(if subsample.stratified {
                    stratified_subsample(&self.labels, self.num_classes, size, &mut self.state.rng)
                } else {
                    uniform_subsample(n, size, &mut self.state.rng)
                })
            }
            _ => None,
        };

        let (member_series, member_labels): (Vec<&[f64]>, Vec<usize>) = match &subsample {
            Some(indices) => indices
                .iter()
                .map(|&idx| (series[idx], self.labels[idx]))
                .unzip(),
            None => (series.clone(), self.labels.clone()),
        };

        match BossMember::build(
            params,
            &member_series,
            &member_labels,
            self.config.levels,
            self.config.numerosity_reduction,
        ) {
            Ok(mut member) => {
                member.set_subsample_indices(subsample);
                Ok(Some((member, member_labels)))
            }
            Err(BossError::DegenerateInput(reason)) => {
                debug!(channel, %params, %reason, "skipping degenerate candidate");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Instances a candidate is scored on; `None` means all of them.
    fn evaluation_indices(&mut self, member_labels: &[usize]) -> Option<Vec<usize>> {
        let budget = self.config.fast_estimate?.budget(self.num_classes);
        if budget >= member_labels.len() {
            return None;
        }
        Some(round_robin_sample(
            member_labels,
            self.num_classes,
            budget,
            &mut self.state.rng,
        ))
    }

    fn record_degenerate(&mut self, channel: usize, params: MemberParams, started: Instant) {
        self.state.channels[channel].record(CandidateOutcome {
            params,
            accuracy: Some(0.0),
            build_ns: elapsed_ns(started),
            memory_bytes: 0,
            accepted: false,
        });
    }

    /// Returns whether the ensemble changed.
    fn evaluate_random_candidate(
        &mut self,
        channel: usize,
        params: MemberParams,
        started: Instant,
    ) -> Result<bool, BossError> {
        let Some((mut member, member_labels)) = self.build_member(channel, params)? else {
            self.record_degenerate(channel, params, started);
            return Ok(false);
        };

        let filtered = self.filtered();
        let at_cap = self.channel_at_cap(channel);
        let lowest = self.state.channels[channel].lowest();
        let needs_accuracy = filtered
            || self.config.use_weights
            || matches!(self.config.selection, ParameterSelection::Surrogate { .. });

        let score = if needs_accuracy {
            let threshold = if filtered && at_cap {
                lowest.map(|(_, accuracy)| accuracy)
            } else {
                None
            };
            let indices = self.evaluation_indices(&member_labels);
            let score = member.train_accuracy(indices.as_deref(), threshold, self.pool)?;
            member.set_accuracy(score.accuracy, self.config.use_weights);
            Some(score)
        } else {
            None
        };
        member.clean();
        let memory_bytes = estimate_member_bytes(&member);

        let state = &mut self.state.channels[channel];
        let accepted = if !filtered || !at_cap {
            state.members.push(member);
            true
        } else {
            match (score, lowest) {
                (Some(score), Some((idx, lowest_accuracy)))
                    if !score.abandoned && score.accuracy > lowest_accuracy =>
                {
                    state.members[idx] = member;
                    true
                }
                _ => false,
            }
        };

        let accuracy = score.map(|score| score.accuracy);
        state.record(CandidateOutcome {
            params,
            accuracy,
            build_ns: elapsed_ns(started),
            memory_bytes,
            accepted,
        });
        debug!(
            channel,
            %params,
            accuracy = accuracy.unwrap_or(f64::NAN),
            accepted,
            members = state.members.len(),
            "evaluated candidate"
        );

        if accepted {
            self.refresh_bytes();
        }
        Ok(accepted)
    }

    fn apply_cutoff(&mut self) {
        let threshold = self.config.correctness_threshold;
        for (channel, state) in self.state.channels.iter_mut().enumerate() {
            let Some(max_accuracy) = state.highest_accuracy() else {
                continue;
            };
            let dropped = state.cull_below(max_accuracy * threshold);
            if dropped > 0 {
                debug!(channel, dropped, max_accuracy, "cutoff removed weak members");
            }
        }
        self.refresh_bytes();
    }

    fn run_exhaustive(&mut self) -> Result<BuildStatus, BossError> {
        let word_lengths = self.config.descending_word_lengths();
        loop {
            if let Some(status) = self.stop_status() {
                return Ok(status);
            }
            let channel = self.state.current_channel;
            if self.state.channels[channel].pool.is_empty() {
                self.advance_channel();
                continue;
            }

            let started = Instant::now();
            let params = self.state.channels[channel].pool.remove(0);
            if self.evaluate_exhaustive_candidate(channel, params, &word_lengths, started)? {
                self.persist();
            }
            self.advance_channel();
        }
    }

    /// Scores every word length of one window/normalize combination and
    /// admits the best. Returns whether the ensemble changed.
    fn evaluate_exhaustive_candidate(
        &mut self,
        channel: usize,
        params: MemberParams,
        word_lengths: &[usize],
        started: Instant,
    ) -> Result<bool, BossError> {
        let base = match BossMember::build(
            params,
            &self.series[channel],
            &self.labels,
            self.config.levels,
            self.config.numerosity_reduction,
        ) {
            Ok(member) => member,
            Err(BossError::DegenerateInput(reason)) => {
                debug!(channel, %params, %reason, "skipping degenerate candidate");
                self.record_degenerate(channel, params, started);
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        let mut best: Option<(BossMember, f64)> = None;
        for &word_len in word_lengths {
            let shortened;
            let candidate = if word_len == base.params().word_len {
                &base
            } else {
                shortened = base.shorten(word_len)?;
                &shortened
            };
            let threshold = best.as_ref().map(|(_, accuracy)| *accuracy);
            let score = candidate.train_accuracy(None, threshold, self.pool)?;
            if !score.abandoned
                && best
                    .as_ref()
                    .is_none_or(|(_, accuracy)| score.accuracy >= *accuracy)
            {
                best = Some((candidate.clone(), score.accuracy));
            }
        }
        let Some((mut member, accuracy)) = best else {
            return Ok(false);
        };
        member.set_accuracy(accuracy, self.config.use_weights);
        member.clean();
        let chosen = member.params();
        let memory_bytes = estimate_member_bytes(&member);

        let threshold = self.config.correctness_threshold;
        let cap = self.config.max_ensemble_size;
        let state = &mut self.state.channels[channel];
        let max_accuracy = state.highest_accuracy().unwrap_or(-1.0);
        let below_cap = state.members.len() < cap;
        let beats_lowest = state
            .lowest()
            .is_some_and(|(_, lowest_accuracy)| accuracy > lowest_accuracy);
        let accepted = accuracy >= max_accuracy * threshold && (below_cap || beats_lowest);

        if accepted {
            state.members.push(member);
            if accuracy > max_accuracy {
                state.cull_below(accuracy * threshold);
            }
            while state.members.len() > cap {
                let Some((idx, _)) = state.lowest() else {
                    break;
                };
                state.members.remove(idx);
            }
        }
        state.record(CandidateOutcome {
            params: chosen,
            accuracy: Some(accuracy),
            build_ns: elapsed_ns(started),
            memory_bytes,
            accepted,
        });
        debug!(
            channel,
            params = %chosen,
            accuracy,
            accepted,
            members = state.members.len(),
            "evaluated window"
        );

        if accepted {
            self.refresh_bytes();
        }
        Ok(accepted)
    }
}

fn elapsed_ns(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Pool index with the highest predicted accuracy; the first wins ties.
fn best_predicted(
    config: &SurrogateConfig,
    space: &ParameterSpace,
    history: &[CandidateOutcome],
    pool: &[MemberParams],
) -> Option<usize> {
    let (inputs, targets): (Vec<[f64; PARAMETER_FEATURES]>, Vec<f64>) = history
        .iter()
        .filter_map(|outcome| {
            outcome
                .accuracy
                .map(|accuracy| (space.features(&outcome.params), accuracy))
        })
        .unzip();
    let surrogate = match GpSurrogate::fit(config, &inputs, &targets) {
        Ok(surrogate) => surrogate,
        Err(err) => {
            debug!(%err, "surrogate fit failed; falling back to random selection");
            return None;
        }
    };

    let mut best: Option<(usize, f64)> = None;
    for (idx, params) in pool.iter().enumerate() {
        let predicted = surrogate.predict(&space.features(params));
        if best.is_none_or(|(_, current)| predicted > current) {
            best = Some((idx, predicted));
        }
    }
    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::{BuildStatus, EnsembleController, EnsembleState};
    use crate::config::{EnsembleConfig, ParameterSelection, SearchStrategy};
    use crate::pool::ScoringPool;
    use boss_core::{DataUnit, Dataset, Instance};

    fn dataset(n_per_class: usize, len: usize) -> Dataset {
        let mut instances = Vec::new();
        for idx in 0..n_per_class {
            let phase = idx as f64 * 0.1;
            let smooth = (0..len).map(|t| (t as f64 * 0.25 + phase).sin()).collect();
            instances.push(Instance::univariate(smooth, Some(0)).expect("valid instance"));
            let square = (0..len)
                .map(|t| {
                    let level = if (t / 6 + idx) % 2 == 0 { 1.0 } else { -1.0 };
                    level + 0.02 * t as f64
                })
                .collect();
            instances.push(Instance::univariate(square, Some(1)).expect("valid instance"));
        }
        Dataset::new(instances, 2).expect("valid dataset")
    }

    fn small_grid(config: EnsembleConfig) -> EnsembleConfig {
        config.with_word_lengths(vec![8, 6, 4])
    }

    fn run(config: &EnsembleConfig, data: &Dataset) -> EnsembleState {
        let state = EnsembleState::new(config, data.n_channels(), data.series_len())
            .expect("state should build");
        let pool = ScoringPool::sequential();
        EnsembleController::new(config, data, &pool, state, None)
            .expect("controller should build")
            .run()
            .expect("build should succeed")
    }

    #[test]
    fn empty_grid_is_a_configuration_error() {
        let err = EnsembleState::new(&EnsembleConfig::default(), 1, 1)
            .expect_err("length-1 series has no windows");
        assert!(err.is_configuration());
    }

    #[test]
    fn filtered_search_builds_target_and_respects_cap() {
        let data = dataset(6, 48);
        let config = small_grid(EnsembleConfig::default())
            .with_ensemble_size(12)
            .with_max_ensemble_size(4);
        let state = run(&config, &data);

        assert_eq!(state.status(), BuildStatus::TargetReached);
        assert_eq!(state.candidates_built(), 12);
        let channel = &state.channels()[0];
        assert_eq!(channel.members().len(), 4);
        assert_eq!(channel.history().len(), 12);
        assert!(channel.members().iter().all(|m| m.accuracy().is_some()));
        assert!(channel.members().iter().all(|m| m.words().is_none()));
        assert!(state.bytes_used() > 0);
    }

    #[test]
    fn unfiltered_search_keeps_every_member_without_scoring() {
        let data = dataset(4, 40);
        let config = small_grid(EnsembleConfig::default())
            .with_strategy(SearchStrategy::Random)
            .with_ensemble_size(5);
        let state = run(&config, &data);

        assert_eq!(state.member_count(), 5);
        assert!(state.channels()[0].members().iter().all(|m| m.accuracy().is_none()));
        assert!(state.channels()[0].history().iter().all(|o| o.accepted));
    }

    #[test]
    fn exhaustive_search_keeps_members_near_the_best() {
        let data = dataset(5, 40);
        let config = small_grid(EnsembleConfig::default())
            .with_strategy(SearchStrategy::Exhaustive)
            .with_max_ensemble_size(3);
        let state = run(&config, &data);

        assert_eq!(state.status(), BuildStatus::PoolExhausted);
        let members = state.channels()[0].members();
        assert!(!members.is_empty() && members.len() <= 3);
        let accuracies: Vec<f64> = members.iter().filter_map(|m| m.accuracy()).collect();
        let best = accuracies.iter().copied().fold(f64::MIN, f64::max);
        assert!(accuracies.iter().all(|acc| *acc >= best * 0.92));
    }

    #[test]
    fn memory_contract_stops_after_first_member() {
        let data = dataset(4, 40);
        let config = small_grid(EnsembleConfig::default())
            .with_memory_limit(DataUnit::Bytes, 1)
            .expect("valid limit");
        let state = run(&config, &data);
        assert_eq!(state.status(), BuildStatus::MemoryExhausted);
        assert_eq!(state.member_count(), 1);
    }

    #[test]
    fn cutoff_drops_members_below_the_threshold() {
        let data = dataset(6, 48);
        let config = small_grid(EnsembleConfig::default())
            .with_ensemble_size(15)
            .with_cutoff(true);
        let state = run(&config, &data);
        let accuracies: Vec<f64> = state.channels()[0]
            .members()
            .iter()
            .filter_map(|m| m.accuracy())
            .collect();
        let best = accuracies.iter().copied().fold(f64::MIN, f64::max);
        assert!(accuracies.iter().all(|acc| *acc >= best * 0.92));
    }

    #[test]
    fn surrogate_selection_completes_the_target() {
        let data = dataset(4, 40);
        let config = small_grid(EnsembleConfig::default())
            .with_selection(ParameterSelection::Surrogate {
                initial_random_parameters: 3,
            })
            .with_ensemble_size(8);
        let state = run(&config, &data);
        assert_eq!(state.candidates_built(), 8);
        assert!(state.channels()[0].history().iter().all(|o| o.accuracy.is_some()));
    }

    #[test]
    fn multichannel_builds_round_robin() {
        let base = dataset(4, 40);
        let instances = base
            .instances()
            .iter()
            .map(|instance| {
                let first = instance.channel(0).to_vec();
                let second = first.iter().rev().copied().collect();
                Instance::new(vec![first, second], instance.label()).expect("valid instance")
            })
            .collect();
        let data = Dataset::new(instances, 2).expect("valid dataset");
        let config = small_grid(EnsembleConfig::default()).with_ensemble_size(6);
        let state = run(&config, &data);
        assert_eq!(state.channels().len(), 2);
        assert_eq!(state.channels()[0].built(), 3);
        assert_eq!(state.channels()[1].built(), 3);
    }
}
