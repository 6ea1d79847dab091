// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::BossError;
use std::time::{Duration, Instant};

/// Unit for train-time contracts.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn nanos_per_unit(self) -> u64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
            Self::Minutes => 60_000_000_000,
            Self::Hours => 3_600_000_000_000,
            Self::Days => 86_400_000_000_000,
        }
    }
}

/// Unit for memory contracts.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataUnit {
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
}

impl DataUnit {
    fn bytes_per_unit(self) -> u64 {
        match self {
            Self::Bytes => 1,
            Self::Kilobytes => 1 << 10,
            Self::Megabytes => 1 << 20,
            Self::Gigabytes => 1 << 30,
        }
    }
}

/// Outcome of a contract check between build-loop iterations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContractStatus {
    WithinContract,
    TimeExhausted,
    MemoryExhausted,
}

impl ContractStatus {
    pub fn is_within(self) -> bool {
        self == Self::WithinContract
    }
}

/// Train-time and memory limits for ensemble construction.
///
/// Exhausting a limit is not an error: the build loop stops with the members
/// accepted so far.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrainContract {
    pub time_limit_ns: Option<u64>,
    pub memory_limit_bytes: Option<u64>,
}

impl TrainContract {
    /// Sets the train-time limit to `amount` units.
    pub fn with_time_limit(mut self, unit: TimeUnit, amount: u64) -> Result<Self, BossError> {
        let nanos = amount.checked_mul(unit.nanos_per_unit()).ok_or_else(|| {
            BossError::configuration(format!(
                "train time limit overflows u64 nanoseconds: amount={amount}, unit={unit:?}"
            ))
        })?;
        self.time_limit_ns = Some(nanos);
        Ok(self)
    }

    /// Sets the memory limit to `amount` units.
    pub fn with_memory_limit(mut self, unit: DataUnit, amount: u64) -> Result<Self, BossError> {
        let bytes = amount.checked_mul(unit.bytes_per_unit()).ok_or_else(|| {
            BossError::configuration(format!(
                "memory limit overflows u64 bytes: amount={amount}, unit={unit:?}"
            ))
        })?;
        self.memory_limit_bytes = Some(bytes);
        Ok(self)
    }

    pub fn has_time_limit(&self) -> bool {
        self.time_limit_ns.is_some()
    }

    pub fn has_memory_limit(&self) -> bool {
        self.memory_limit_bytes.is_some()
    }

    pub fn validate(&self) -> Result<(), BossError> {
        if self.time_limit_ns == Some(0) {
            return Err(BossError::configuration(
                "contract.time_limit_ns must be > 0 when set",
            ));
        }
        if self.memory_limit_bytes == Some(0) {
            return Err(BossError::configuration(
                "contract.memory_limit_bytes must be > 0 when set",
            ));
        }
        Ok(())
    }

    /// Checks both limits; time is reported before memory.
    pub fn check(&self, elapsed_ns: u64, bytes_used: u64) -> ContractStatus {
        if let Some(limit) = self.time_limit_ns
            && elapsed_ns >= limit
        {
            return ContractStatus::TimeExhausted;
        }
        if let Some(limit) = self.memory_limit_bytes
            && bytes_used >= limit
        {
            return ContractStatus::MemoryExhausted;
        }
        ContractStatus::WithinContract
    }

    pub fn remaining_time_ns(&self, elapsed_ns: u64) -> Option<u64> {
        self.time_limit_ns
            .map(|limit| limit.saturating_sub(elapsed_ns))
    }

    pub fn remaining_memory_bytes(&self, bytes_used: u64) -> Option<u64> {
        self.memory_limit_bytes
            .map(|limit| limit.saturating_sub(bytes_used))
    }
}

/// Monotonic build clock that can carry time over from a restored run and
/// exclude bookkeeping (such as checkpoint writes) from the contracted budget.
#[derive(Clone, Debug)]
pub struct ContractClock {
    started_at: Instant,
    carried_ns: u64,
    excluded_ns: u64,
}

impl ContractClock {
    pub fn start() -> Self {
        Self::resume_from(0)
    }

    /// Starts a clock that already accounts for `carried_ns` of prior work.
    pub fn resume_from(carried_ns: u64) -> Self {
        Self {
            started_at: Instant::now(),
            carried_ns,
            excluded_ns: 0,
        }
    }

    /// Contracted elapsed time: carried + wall time - excluded time.
    pub fn elapsed_ns(&self) -> u64 {
        let wall = u64::try_from(self.started_at.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.carried_ns
            .saturating_add(wall.saturating_sub(self.excluded_ns))
    }

    pub fn excluded_ns(&self) -> u64 {
        self.excluded_ns
    }

    pub fn exclude(&mut self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.excluded_ns = self.excluded_ns.saturating_add(nanos);
    }

    /// Runs `work` and removes its wall time from the contracted budget.
    pub fn excluding<T>(&mut self, work: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = work();
        self.exclude(started.elapsed());
        out
    }
}
