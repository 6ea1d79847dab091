// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Index samplers used to subsample training sets and to pick the instances
//! a member is scored on.

use rand::Rng;
use rand::seq::SliceRandom;
use rand::seq::index;

/// `size` distinct indices drawn uniformly from `0..n`, ascending.
pub fn uniform_subsample<R: Rng + ?Sized>(n: usize, size: usize, rng: &mut R) -> Vec<usize> {
    let size = size.min(n);
    let mut picked = index::sample(rng, n, size).into_vec();
    picked.sort_unstable();
    picked
}

fn indices_by_class(labels: &[usize], num_classes: usize) -> Vec<Vec<usize>> {
    let mut by_class = vec![Vec::new(); num_classes];
    for (idx, &label) in labels.iter().enumerate() {
        if label < num_classes {
            by_class[label].push(idx);
        }
    }
    by_class
}

/// `size` distinct indices whose class proportions follow `labels`, ascending.
///
/// Each class receives `floor(size * share)` slots; leftover slots go to the
/// classes with the largest fractional remainders (lowest label first on
/// ties).
pub fn stratified_subsample<R: Rng + ?Sized>(
    labels: &[usize],
    num_classes: usize,
    size: usize,
    rng: &mut R,
) -> Vec<usize> {
    let n = labels.len();
    let size = size.min(n);
    if n == 0 || size == 0 {
        return Vec::new();
    }
    let mut by_class = indices_by_class(labels, num_classes);

    let mut quotas: Vec<usize> = by_class.iter().map(|c| c.len() * size / n).collect();
    let mut remainders: Vec<(usize, usize)> = by_class
        .iter()
        .enumerate()
        .map(|(class, members)| ((members.len() * size) % n, class))
        .collect();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    let mut missing = size - quotas.iter().sum::<usize>();
    for (_, class) in remainders {
        if missing == 0 {
            break;
        }
        if quotas[class] < by_class[class].len() {
            quotas[class] += 1;
            missing -= 1;
        }
    }

    let mut picked = Vec::with_capacity(size);
    for (members, quota) in by_class.iter_mut().zip(quotas) {
        members.shuffle(rng);
        picked.extend_from_slice(&members[..quota]);
    }
    picked.sort_unstable();
    picked
}

/// `count` distinct indices drawn class by class in rotating order, each
/// class's instances visited in a random order. Classes that run out are
/// skipped.
pub fn round_robin_sample<R: Rng + ?Sized>(
    labels: &[usize],
    num_classes: usize,
    count: usize,
    rng: &mut R,
) -> Vec<usize> {
    let count = count.min(labels.len());
    let mut by_class = indices_by_class(labels, num_classes);
    for members in &mut by_class {
        members.shuffle(rng);
        members.reverse();
    }

    let mut picked = Vec::with_capacity(count);
    while picked.len() < count {
        let before = picked.len();
        for members in &mut by_class {
            if picked.len() == count {
                break;
            }
            if let Some(idx) = members.pop() {
                picked.push(idx);
            }
        }
        if picked.len() == before {
            break;
        }
    }
    picked
}
