// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use boss_core::BossError;

/// Width of the packed word storage.
pub const WORD_SPACE_BITS: u32 = u64::BITS;
/// Smallest alphabet that still yields a meaningful quantization.
pub const MIN_ALPHABET_SIZE: usize = 2;
/// Largest alphabet accepted (one symbol per byte).
pub const MAX_ALPHABET_SIZE: usize = 256;

/// Bits needed to store one symbol of an `alphabet_size` alphabet.
pub fn bits_per_letter(alphabet_size: usize) -> u32 {
    let max_symbol = alphabet_size.saturating_sub(1).max(1);
    usize::BITS - max_symbol.leading_zeros()
}

/// Longest word representable for `alphabet_size` in one packed `u64`.
pub fn max_word_len(alphabet_size: usize) -> usize {
    (WORD_SPACE_BITS / bits_per_letter(alphabet_size)) as usize
}

/// Validates an (alphabet size, word length) pair against the packed encoding.
pub fn validate_word_shape(alphabet_size: usize, word_len: usize) -> Result<(), BossError> {
    if !(MIN_ALPHABET_SIZE..=MAX_ALPHABET_SIZE).contains(&alphabet_size) {
        return Err(BossError::configuration(format!(
            "alphabet_size must be in {MIN_ALPHABET_SIZE}..={MAX_ALPHABET_SIZE}; got {alphabet_size}"
        )));
    }
    let max_len = max_word_len(alphabet_size);
    if word_len < 2 || word_len > max_len {
        return Err(BossError::configuration(format!(
            "word_len must be in 2..={max_len} for alphabet_size={alphabet_size}; got {word_len}"
        )));
    }
    Ok(())
}

/// Bit-packed SFA word. The first symbol occupies the most significant bits,
/// so truncating to a prefix is a right shift.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Word {
    packed: u64,
    len: u8,
    bits: u8,
}

impl Word {
    /// Empty word for symbols of `alphabet_size`.
    pub fn empty(alphabet_size: usize) -> Self {
        Self {
            packed: 0,
            len: 0,
            bits: bits_per_letter(alphabet_size) as u8,
        }
    }

    /// Packs `letters`; callers guarantee every letter fits the alphabet.
    pub fn from_letters(letters: &[u8], alphabet_size: usize) -> Self {
        let mut word = Self::empty(alphabet_size);
        for &letter in letters {
            word.push(letter);
        }
        word
    }

    pub fn push(&mut self, letter: u8) {
        debug_assert!(
            (u32::from(self.len) + 1) * u32::from(self.bits) <= WORD_SPACE_BITS,
            "word overflow: len={}, bits={}",
            self.len,
            self.bits
        );
        self.packed = (self.packed << self.bits) | u64::from(letter);
        self.len += 1;
    }

    /// First `new_len` symbols of this word; unchanged if already shorter.
    pub fn truncated(self, new_len: usize) -> Self {
        let current = usize::from(self.len);
        if new_len >= current {
            return self;
        }
        let drop_bits = ((current - new_len) as u32) * u32::from(self.bits);
        Self {
            packed: self.packed.checked_shr(drop_bits).unwrap_or(0),
            len: new_len as u8,
            bits: self.bits,
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn packed(&self) -> u64 {
        self.packed
    }

    /// Unpacks the symbols in order.
    pub fn letters(&self) -> Vec<u8> {
        let mask = (1u64 << self.bits) - 1;
        (0..self.len)
            .map(|idx| {
                let shift = u32::from(self.len - 1 - idx) * u32::from(self.bits);
                ((self.packed >> shift) & mask) as u8
            })
            .collect()
    }
}
