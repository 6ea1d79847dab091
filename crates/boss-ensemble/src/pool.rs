// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use boss_core::BossError;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt;

/// Bounded worker pool for nearest-neighbor scoring.
///
/// Created once per classifier. With one thread no pool is spawned and work
/// runs on the caller. Results always come back in task order.
pub struct ScoringPool {
    threads: usize,
    pool: Option<ThreadPool>,
}

impl ScoringPool {
    pub fn new(threads: usize) -> Result<Self, BossError> {
        if threads == 0 {
            return Err(BossError::configuration("threads must be >= 1; got 0"));
        }
        if threads == 1 {
            return Ok(Self::sequential());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("boss-score-{idx}"))
            .build()
            .map_err(|err| {
                BossError::resource_limit(format!(
                    "failed to start scoring pool with {threads} threads: {err}"
                ))
            })?;
        Ok(Self {
            threads,
            pool: Some(pool),
        })
    }

    pub fn sequential() -> Self {
        Self {
            threads: 1,
            pool: None,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Evaluates `task(i)` for `i in 0..len` and returns results in index order.
    pub fn map<T, F>(&self, len: usize, task: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(|| (0..len).into_par_iter().map(&task).collect()),
            None => (0..len).map(task).collect(),
        }
    }
}

impl fmt::Debug for ScoringPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoringPool")
            .field("threads", &self.threads)
            .finish()
    }
}
