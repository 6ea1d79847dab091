// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::pool::ScoringPool;
use boss_core::BossError;
use boss_sfa::{Bag, BagBuilder, Breakpoints, SfaTransform, Word, validate_word_shape};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One point of the parameter grid a member is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberParams {
    pub word_len: usize,
    pub alphabet_size: usize,
    pub window_len: usize,
    pub normalize: bool,
}

impl MemberParams {
    pub fn validate(&self, series_len: usize) -> Result<(), BossError> {
        validate_word_shape(self.alphabet_size, self.word_len)?;
        if self.window_len < 2 || self.window_len > series_len {
            return Err(BossError::configuration(format!(
                "window_len must be in 2..={series_len}; got {}",
                self.window_len
            )));
        }
        Ok(())
    }
}

impl fmt::Display for MemberParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "word_len={},alphabet_size={},window_len={},normalize={}",
            self.word_len, self.alphabet_size, self.window_len, self.normalize
        )
    }
}

/// Leave-one-out score of a member.
///
/// When scoring is abandoned early, `accuracy` is the best accuracy still
/// reachable at the point of abandonment, which is below the threshold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LooScore {
    pub accuracy: f64,
    pub abandoned: bool,
}

/// Folds per-instance hits into a [`LooScore`], stopping as soon as
/// `threshold * total` correct answers become unreachable.
pub fn fold_loo<F>(total: usize, threshold: Option<f64>, mut hit: F) -> Result<LooScore, BossError>
where
    F: FnMut(usize) -> Result<bool, BossError>,
{
    if total == 0 {
        return Err(BossError::invalid_input(
            "leave-one-out scoring requires at least one instance",
        ));
    }
    let required = threshold
        .map(|t| (t * total as f64).max(0.0) as usize)
        .unwrap_or(0);
    let mut correct = 0usize;
    for position in 0..total {
        let reachable = correct + (total - position);
        if reachable < required {
            return Ok(LooScore {
                accuracy: reachable as f64 / total as f64,
                abandoned: true,
            });
        }
        if hit(position)? {
            correct += 1;
        }
    }
    Ok(LooScore {
        accuracy: correct as f64 / total as f64,
        abandoned: false,
    })
}

/// Asymmetric BOSS distance from `query` to `reference`: the sum of squared
/// count differences over the query's keys only.
///
/// Returns `None` once the partial sum exceeds `best_so_far`.
pub fn boss_distance(query: &Bag, reference: &Bag, best_so_far: Option<u64>) -> Option<u64> {
    let mut dist = 0u64;
    for (key, &count) in query.iter() {
        let diff = i64::from(count) - i64::from(reference.count(key));
        dist = dist.saturating_add(diff.unsigned_abs().saturating_mul(diff.unsigned_abs()));
        if let Some(best) = best_so_far
            && dist > best
        {
            return None;
        }
    }
    Some(dist)
}

/// Member vote weight for a leave-one-out accuracy: `accuracy^4`, or 1 when
/// that is zero.
pub fn accuracy_weight(accuracy: f64) -> f64 {
    let weight = accuracy.powi(4);
    if weight == 0.0 { 1.0 } else { weight }
}

/// Single-parameter BOSS 1-nearest-neighbor classifier over word bags.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BossMember {
    params: MemberParams,
    transform: SfaTransform,
    breakpoints: Breakpoints,
    bag_builder: BagBuilder,
    bags: Vec<Bag>,
    words: Option<Vec<Vec<Word>>>,
    accuracy: Option<f64>,
    weight: f64,
    subsample_indices: Option<Vec<usize>>,
}

impl BossMember {
    /// Learns breakpoints and builds one bag per training series.
    pub fn build(
        params: MemberParams,
        series: &[&[f64]],
        labels: &[usize],
        levels: usize,
        numerosity_reduction: bool,
    ) -> Result<Self, BossError> {
        if series.len() != labels.len() {
            return Err(BossError::invalid_input(format!(
                "series/label count mismatch: {} series, {} labels",
                series.len(),
                labels.len()
            )));
        }
        let Some(first) = series.first() else {
            return Err(BossError::invalid_input(
                "member build requires at least one series",
            ));
        };
        let series_len = first.len();
        params.validate(series_len)?;

        let transform = SfaTransform::new(params.window_len, params.word_len, params.normalize)?;
        let breakpoints = Breakpoints::learn(series, &transform, params.alphabet_size)?;
        let bag_builder = BagBuilder::new(params.window_len, series_len, levels, numerosity_reduction)?;

        let mut words = Vec::with_capacity(series.len());
        let mut bags = Vec::with_capacity(series.len());
        for (values, &label) in series.iter().zip(labels) {
            let sequence = breakpoints.sliding_words(&transform, values)?;
            bags.push(bag_builder.build(&sequence, Some(label)));
            words.push(sequence);
        }

        Ok(Self {
            params,
            transform,
            breakpoints,
            bag_builder,
            bags,
            words: Some(words),
            accuracy: None,
            weight: 1.0,
            subsample_indices: None,
        })
    }

    pub fn params(&self) -> MemberParams {
        self.params
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn bags(&self) -> &[Bag] {
        &self.bags
    }

    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn words(&self) -> Option<&[Vec<Word>]> {
        self.words.as_deref()
    }

    pub fn subsample_indices(&self) -> Option<&[usize]> {
        self.subsample_indices.as_deref()
    }

    pub fn set_subsample_indices(&mut self, indices: Option<Vec<usize>>) {
        self.subsample_indices = indices;
    }

    /// Records the leave-one-out accuracy and derives the vote weight.
    pub fn set_accuracy(&mut self, accuracy: f64, use_weights: bool) {
        self.accuracy = Some(accuracy);
        self.weight = if use_weights {
            accuracy_weight(accuracy)
        } else {
            1.0
        };
    }

    /// Copy with every bag rebuilt at `word_len` from the retained words.
    pub fn shorten(&self, word_len: usize) -> Result<Self, BossError> {
        if word_len == self.params.word_len {
            return Ok(self.clone());
        }
        if word_len > self.params.word_len {
            return Err(BossError::configuration(format!(
                "cannot lengthen words: current word_len={}, requested {word_len}",
                self.params.word_len
            )));
        }
        let Some(words) = &self.words else {
            return Err(BossError::configuration(
                "member words were released by clean(); cannot shorten",
            ));
        };

        let breakpoints = self.breakpoints.truncated(word_len)?;
        let transform = SfaTransform::new(self.params.window_len, word_len, self.params.normalize)?;
        let bags = words
            .iter()
            .zip(&self.bags)
            .map(|(sequence, bag)| self.bag_builder.build_shortened(sequence, word_len, bag.label()))
            .collect();

        Ok(Self {
            params: MemberParams {
                word_len,
                ..self.params
            },
            transform,
            breakpoints,
            bag_builder: self.bag_builder,
            bags,
            words: self.words.clone(),
            accuracy: None,
            weight: 1.0,
            subsample_indices: self.subsample_indices.clone(),
        })
    }

    /// Releases the raw word sequences; shortening is no longer possible.
    pub fn clean(&mut self) {
        self.words = None;
    }

    /// Bag of a new series under this member's parameters.
    pub fn transform_series(&self, series: &[f64]) -> Result<Bag, BossError> {
        if series.len() < self.params.window_len {
            return Err(BossError::invalid_input(format!(
                "series of length {} is shorter than window_len={}",
                series.len(),
                self.params.window_len
            )));
        }
        let words = self.breakpoints.sliding_words(&self.transform, series)?;
        Ok(self.bag_builder.build(&words, None))
    }

    /// Label of the nearest reference bag; ties keep the first one found.
    pub fn nearest_label(&self, query: &Bag, skip: Option<usize>) -> Option<usize> {
        let mut best: Option<(u64, usize)> = None;
        for (idx, reference) in self.bags.iter().enumerate() {
            if Some(idx) == skip {
                continue;
            }
            let bound = best.map(|(dist, _)| dist);
            if let Some(dist) = boss_distance(query, reference, bound)
                && bound.is_none_or(|current| dist < current)
            {
                best = Some((dist, idx));
            }
        }
        best.and_then(|(_, idx)| self.bags[idx].label())
    }

    pub fn classify(&self, query: &Bag) -> Result<usize, BossError> {
        self.nearest_label(query, None)
            .ok_or_else(|| BossError::invalid_input("member has no labeled reference bags"))
    }

    pub fn classify_series(&self, series: &[f64]) -> Result<usize, BossError> {
        let bag = self.transform_series(series)?;
        self.classify(&bag)
    }

    /// Leave-one-out prediction for training bag `index`.
    pub fn classify_train_index(&self, index: usize) -> Result<usize, BossError> {
        let Some(query) = self.bags.get(index) else {
            return Err(BossError::invalid_input(format!(
                "train index {index} out of range for {} bags",
                self.bags.len()
            )));
        };
        self.nearest_label(query, Some(index)).ok_or_else(|| {
            BossError::invalid_input("leave-one-out needs at least two reference bags")
        })
    }

    /// One-hot vote for `series`.
    pub fn distribution_for_series(
        &self,
        series: &[f64],
        num_classes: usize,
    ) -> Result<Vec<f64>, BossError> {
        let label = self.classify_series(series)?;
        if label >= num_classes {
            return Err(BossError::invalid_input(format!(
                "predicted label {label} is outside num_classes={num_classes}"
            )));
        }
        let mut dist = vec![0.0; num_classes];
        dist[label] = 1.0;
        Ok(dist)
    }

    fn loo_hit(&self, index: usize) -> Result<bool, BossError> {
        let predicted = self.classify_train_index(index)?;
        Ok(Some(predicted) == self.bags[index].label())
    }

    /// Leave-one-out accuracy over `indices` (all bags when `None`).
    ///
    /// A sequential pool abandons scoring as soon as `threshold` becomes
    /// unreachable. A parallel pool scores every index first and then applies
    /// the same fold, so both produce identical scores.
    pub fn train_accuracy(
        &self,
        indices: Option<&[usize]>,
        threshold: Option<f64>,
        pool: &ScoringPool,
    ) -> Result<LooScore, BossError> {
        let all: Vec<usize>;
        let indices = match indices {
            Some(indices) => indices,
            None => {
                all = (0..self.bags.len()).collect();
                &all
            }
        };

        if pool.is_parallel() {
            let hits = pool
                .map(indices.len(), |k| self.loo_hit(indices[k]))
                .into_iter()
                .collect::<Result<Vec<bool>, BossError>>()?;
            fold_loo(indices.len(), threshold, |k| Ok(hits[k]))
        } else {
            fold_loo(indices.len(), threshold, |k| self.loo_hit(indices[k]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BossMember, LooScore, MemberParams, accuracy_weight, boss_distance, fold_loo};
    use crate::pool::ScoringPool;
    use boss_sfa::{Bag, BagKey, Word};

    fn key(a: u8, b: u8) -> BagKey {
        BagKey {
            word: Word::from_letters(&[a, b], 4),
            cell: 0,
        }
    }

    fn bag(entries: &[((u8, u8), u32)], label: Option<usize>) -> Bag {
        let mut out = Bag::new(label);
        for &((a, b), count) in entries {
            out.add(key(a, b), count);
        }
        out
    }

    fn two_class_series(n_per_class: usize, len: usize) -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut series = Vec::new();
        let mut labels = Vec::new();
        for idx in 0..n_per_class {
            let phase = idx as f64 * 0.05;
            series.push(
                (0..len)
                    .map(|t| (t as f64 * 0.3 + phase).sin())
                    .collect(),
            );
            labels.push(0);
            series.push(
                (0..len)
                    .map(|t| if (t / 8 + idx) % 2 == 0 { 1.0 } else { -1.0 } + 0.01 * t as f64)
                    .collect(),
            );
            labels.push(1);
        }
        (series, labels)
    }

    fn params(word_len: usize, window_len: usize) -> MemberParams {
        MemberParams {
            word_len,
            alphabet_size: 4,
            window_len,
            normalize: true,
        }
    }

    #[test]
    fn distance_is_asymmetric_and_ignores_reference_only_keys() {
        let a = bag(&[((0, 1), 2)], None);
        let b = bag(&[((0, 1), 1), ((3, 3), 5)], None);
        assert_eq!(boss_distance(&a, &b, None), Some(1));
        assert_eq!(boss_distance(&b, &a, None), Some(1 + 25));
    }

    #[test]
    fn distance_abandons_once_bound_is_exceeded() {
        let a = bag(&[((0, 1), 4), ((1, 1), 4)], None);
        let b = Bag::new(None);
        assert_eq!(boss_distance(&a, &b, Some(32)), Some(32));
        assert_eq!(boss_distance(&a, &b, Some(10)), None);
    }

    #[test]
    fn weight_is_fourth_power_with_zero_floor() {
        assert!((accuracy_weight(0.5) - 0.0625).abs() < 1e-12);
        assert_eq!(accuracy_weight(0.0), 1.0);
        assert_eq!(accuracy_weight(1.0), 1.0);
    }

    #[test]
    fn fold_loo_exits_once_threshold_is_unreachable() {
        let hits = [false, false, false, true, true];
        let mut calls = 0;
        let score = fold_loo(5, Some(0.8), |k| {
            calls += 1;
            Ok(hits[k])
        })
        .expect("fold should succeed");
        assert!(score.abandoned);
        assert_eq!(calls, 2);
        assert!(score.accuracy < 0.8);

        let full = fold_loo(5, None, |k| Ok(hits[k])).expect("fold should succeed");
        assert_eq!(
            full,
            LooScore {
                accuracy: 0.4,
                abandoned: false
            }
        );
    }

    #[test]
    fn nearest_label_keeps_first_tie() {
        let (series, labels) = two_class_series(2, 32);
        let refs: Vec<&[f64]> = series.iter().map(Vec::as_slice).collect();
        let mut member = BossMember::build(params(4, 8), &refs, &labels, 1, true)
            .expect("member should build");
        member.bags = vec![
            bag(&[((0, 0), 3)], Some(1)),
            bag(&[((0, 0), 2)], Some(0)),
            bag(&[((0, 0), 0), ((1, 1), 4)], Some(1)),
            bag(&[((0, 0), 2), ((2, 2), 1)], Some(1)),
        ];

        // Bags 1 and 3 are both at distance 0 from the query.
        let query = bag(&[((0, 0), 2)], None);
        assert_eq!(member.nearest_label(&query, None), Some(0));
        assert_eq!(member.classify(&query).expect("classify should succeed"), 0);
        assert_eq!(member.nearest_label(&query, Some(1)), Some(1));

        // Leave-one-out skips bag 1 itself, leaving bag 3 as the exact match.
        assert_eq!(member.classify_train_index(1).expect("LOO should succeed"), 1);
    }

    #[test]
    fn build_produces_one_labeled_bag_per_series() {
        let (series, labels) = two_class_series(5, 64);
        let refs: Vec<&[f64]> = series.iter().map(Vec::as_slice).collect();
        let member = BossMember::build(params(8, 16), &refs, &labels, 1, true)
            .expect("member should build");
        assert_eq!(member.bags().len(), 10);
        assert!(member.words().is_some());
        for (bag, label) in member.bags().iter().zip(&labels) {
            assert_eq!(bag.label(), Some(*label));
        }
        assert_eq!(member.accuracy(), None);
        assert_eq!(member.weight(), 1.0);
    }

    #[test]
    fn training_series_is_recalled_with_its_own_label() {
        let (series, labels) = two_class_series(5, 64);
        let refs: Vec<&[f64]> = series.iter().map(Vec::as_slice).collect();
        let member = BossMember::build(params(8, 16), &refs, &labels, 1, true)
            .expect("member should build");
        for (values, label) in series.iter().zip(&labels) {
            assert_eq!(
                member.classify_series(values).expect("classify should succeed"),
                *label
            );
        }
    }

    #[test]
    fn shorten_matches_building_at_shorter_length() {
        let (series, labels) = two_class_series(4, 48);
        let refs: Vec<&[f64]> = series.iter().map(Vec::as_slice).collect();
        let long = BossMember::build(params(12, 12), &refs, &labels, 1, true)
            .expect("member should build");
        let direct = BossMember::build(params(6, 12), &refs, &labels, 1, true)
            .expect("member should build");
        let shortened = long.shorten(6).expect("shorten should succeed");
        assert_eq!(shortened.params(), direct.params());
        assert_eq!(shortened.bags(), direct.bags());
        assert!(long.shorten(14).is_err());

        let mut cleaned = long.clone();
        cleaned.clean();
        assert!(cleaned.words().is_none());
        assert!(cleaned.shorten(6).is_err());
    }

    #[test]
    fn train_accuracy_agrees_between_sequential_and_parallel_pools() {
        let (series, labels) = two_class_series(6, 64);
        let refs: Vec<&[f64]> = series.iter().map(Vec::as_slice).collect();
        let member = BossMember::build(params(8, 20), &refs, &labels, 2, true)
            .expect("member should build");
        let sequential = ScoringPool::sequential();
        let parallel = ScoringPool::new(3).expect("parallel pool");

        for threshold in [None, Some(0.5), Some(0.99)] {
            let a = member
                .train_accuracy(None, threshold, &sequential)
                .expect("sequential scoring");
            let b = member
                .train_accuracy(None, threshold, &parallel)
                .expect("parallel scoring");
            assert_eq!(a, b, "threshold={threshold:?}");
        }

        let subset = [0, 3, 5];
        let partial = member
            .train_accuracy(Some(&subset), None, &sequential)
            .expect("subset scoring");
        assert!((0.0..=1.0).contains(&partial.accuracy));
    }

    #[test]
    fn invalid_params_are_configuration_errors() {
        let (series, labels) = two_class_series(2, 32);
        let refs: Vec<&[f64]> = series.iter().map(Vec::as_slice).collect();
        let err = BossMember::build(params(8, 40), &refs, &labels, 1, true)
            .expect_err("window longer than series must fail");
        assert!(err.is_configuration());
        let err = BossMember::build(params(40, 10), &refs, &labels, 1, true)
            .expect_err("word too long for encoding must fail");
        assert!(err.is_configuration());
    }
}
