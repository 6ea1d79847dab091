// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod bag;
pub mod discretizer;
pub mod transform;
pub mod word;

pub use bag::{Bag, BagBuilder, BagKey, MAX_PYRAMID_LEVELS};
pub use discretizer::{Breakpoints, OPEN_UPPER_BOUND};
pub use transform::{CONSTANT_WINDOW_STD, SfaTransform, mean_std, sliding_mean_std};
pub use word::{
    MAX_ALPHABET_SIZE, MIN_ALPHABET_SIZE, Word, bits_per_letter, max_word_len,
    validate_word_shape,
};

/// Symbolic Fourier approximation namespace.
pub fn crate_name() -> &'static str {
    let _ = boss_core::crate_name();
    "boss-sfa"
}
