// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::member::BossMember;
use boss_sfa::{Bag, BagKey, Word};
use std::mem::size_of;

/// Control bytes per hash-table bucket.
const HASH_CONTROL_BYTES: usize = 1;
/// Maximum load factor numerator/denominator of the standard hash table.
const HASH_LOAD_NUM: usize = 8;
const HASH_LOAD_DEN: usize = 7;

fn vec_bytes<T>(len: usize) -> usize {
    size_of::<Vec<T>>() + len * size_of::<T>()
}

/// Approximate heap plus inline footprint of one bag.
pub fn estimate_bag_bytes(bag: &Bag) -> usize {
    let entries = bag.len();
    let buckets = if entries == 0 {
        0
    } else {
        (entries * HASH_LOAD_NUM).div_ceil(HASH_LOAD_DEN).next_power_of_two()
    };
    size_of::<Bag>() + buckets * (size_of::<(BagKey, u32)>() + HASH_CONTROL_BYTES)
}

/// Analytical size of a member: struct, breakpoints, bags, retained words and
/// subsample indices.
pub fn estimate_member_bytes(member: &BossMember) -> u64 {
    let breakpoints = member.breakpoints();
    let breakpoint_bytes = size_of::<Vec<Vec<f64>>>()
        + breakpoints.word_len() * vec_bytes::<f64>(breakpoints.alphabet_size());

    let bag_bytes: usize = size_of::<Vec<Bag>>()
        + member
            .bags()
            .iter()
            .map(estimate_bag_bytes)
            .sum::<usize>();

    let word_bytes: usize = member.words().map_or(0, |words| {
        size_of::<Vec<Vec<Word>>>()
            + words
                .iter()
                .map(|sequence| vec_bytes::<Word>(sequence.len()))
                .sum::<usize>()
    });

    let index_bytes = member
        .subsample_indices()
        .map_or(0, |indices| vec_bytes::<usize>(indices.len()));

    (size_of::<BossMember>() + breakpoint_bytes + bag_bytes + word_bytes + index_bytes) as u64
}

/// Total estimate for a set of members.
pub fn estimate_members_bytes<'a>(members: impl IntoIterator<Item = &'a BossMember>) -> u64 {
    members.into_iter().map(estimate_member_bytes).sum()
}
