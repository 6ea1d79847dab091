// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod contract;
pub mod dataset;
pub mod error;
pub mod traits;

pub use contract::{ContractClock, ContractStatus, DataUnit, TimeUnit, TrainContract};
pub use dataset::{Dataset, Instance, MIN_TRAIN_INSTANCES, check_query_shape};
pub use error::BossError;
pub use traits::{Predictive, Trainable, argmax_first};

/// Core shared types and traits for boss-rs.
pub fn crate_name() -> &'static str {
    "boss-core"
}
