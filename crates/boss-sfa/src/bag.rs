// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::word::Word;
use boss_core::BossError;
use std::collections::HashMap;

/// Largest supported spatial-pyramid depth; cells are addressed with `u16`.
pub const MAX_PYRAMID_LEVELS: usize = 16;

/// Histogram key: a word plus its spatial-pyramid cell (always 0 for plain
/// BOSS).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BagKey {
    pub word: Word,
    pub cell: u16,
}

/// Word histogram of one series, tagged with the series' class label.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(into = "BagWire", from = "BagWire")
)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bag {
    counts: HashMap<BagKey, u32>,
    label: Option<usize>,
}

impl Bag {
    pub fn new(label: Option<usize>) -> Self {
        Self {
            counts: HashMap::new(),
            label,
        }
    }

    pub fn label(&self) -> Option<usize> {
        self.label
    }

    pub fn set_label(&mut self, label: Option<usize>) {
        self.label = label;
    }

    pub fn add(&mut self, key: BagKey, weight: u32) {
        let entry = self.counts.entry(key).or_insert(0);
        *entry = entry.saturating_add(weight);
    }

    /// Count for `key`, zero when absent.
    pub fn count(&self, key: &BagKey) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BagKey, &u32)> {
        self.counts.iter()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total_count(&self) -> u64 {
        self.counts.values().map(|&c| u64::from(c)).sum()
    }

    /// Entries in key order.
    pub fn sorted_entries(&self) -> Vec<(BagKey, u32)> {
        let mut entries: Vec<(BagKey, u32)> = self.counts.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_unstable_by_key(|(key, _)| *key);
        entries
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct BagWire {
    label: Option<usize>,
    entries: Vec<(BagKey, u32)>,
}

#[cfg(feature = "serde")]
impl From<Bag> for BagWire {
    fn from(bag: Bag) -> Self {
        Self {
            entries: bag.sorted_entries(),
            label: bag.label,
        }
    }
}

#[cfg(feature = "serde")]
impl From<BagWire> for Bag {
    fn from(wire: BagWire) -> Self {
        Self {
            counts: wire.entries.into_iter().collect(),
            label: wire.label,
        }
    }
}

/// Turns a sliding-window word sequence into a [`Bag`].
///
/// With numerosity reduction, a run of identical consecutive words counts once
/// at the run's temporal midpoint. With `levels > 1` each counted word is also
/// placed in one cell per pyramid level, level `l` weighted `2^l`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BagBuilder {
    window_len: usize,
    series_len: usize,
    levels: usize,
    numerosity_reduction: bool,
}

impl BagBuilder {
    pub fn new(
        window_len: usize,
        series_len: usize,
        levels: usize,
        numerosity_reduction: bool,
    ) -> Result<Self, BossError> {
        if !(1..=MAX_PYRAMID_LEVELS).contains(&levels) {
            return Err(BossError::configuration(format!(
                "levels must be in 1..={MAX_PYRAMID_LEVELS}; got {levels}"
            )));
        }
        if window_len == 0 || window_len > series_len {
            return Err(BossError::configuration(format!(
                "window_len must be in 1..={series_len}; got {window_len}"
            )));
        }
        if series_len >> (levels - 1) == 0 {
            return Err(BossError::configuration(format!(
                "series length {series_len} is too short for {levels} pyramid levels"
            )));
        }
        Ok(Self {
            window_len,
            series_len,
            levels,
            numerosity_reduction,
        })
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn numerosity_reduction(&self) -> bool {
        self.numerosity_reduction
    }

    /// Total number of pyramid cells across all levels.
    pub fn cell_count(&self) -> usize {
        (1usize << self.levels) - 1
    }

    /// Bag of `words` as given.
    pub fn build(&self, words: &[Word], label: Option<usize>) -> Bag {
        self.build_from(words.iter().copied(), label)
    }

    /// Bag of `words` after truncating each to `word_len` symbols.
    pub fn build_shortened(&self, words: &[Word], word_len: usize, label: Option<usize>) -> Bag {
        self.build_from(words.iter().map(|word| word.truncated(word_len)), label)
    }

    fn build_from(&self, words: impl Iterator<Item = Word>, label: Option<usize>) -> Bag {
        let mut bag = Bag::new(label);
        if !self.numerosity_reduction {
            for (pos, word) in words.enumerate() {
                self.insert(&mut bag, word, pos);
            }
            return bag;
        }

        let mut run: Option<(Word, usize, usize)> = None;
        for (pos, word) in words.enumerate() {
            if let Some((current, _, len)) = run.as_mut()
                && *current == word
            {
                *len += 1;
                continue;
            }
            if let Some((current, start, len)) = run {
                self.insert(&mut bag, current, start + (len - 1) / 2);
            }
            run = Some((word, pos, 1));
        }
        if let Some((current, start, len)) = run {
            self.insert(&mut bag, current, start + (len - 1) / 2);
        }
        bag
    }

    fn insert(&self, bag: &mut Bag, word: Word, position: usize) {
        let centre = position + self.window_len / 2;
        let mut level_start = 0usize;
        for level in 0..self.levels {
            let n_cells = 1usize << level;
            let cell_len = (self.series_len / n_cells).max(1);
            let cell = level_start + (centre / cell_len).min(n_cells - 1);
            bag.add(
                BagKey {
                    word,
                    cell: cell as u16,
                },
                1u32 << level,
            );
            level_start += n_cells;
        }
    }
}
