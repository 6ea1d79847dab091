// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod member;
pub mod memory;
pub mod pool;
pub mod sampler;
pub mod surrogate;

pub use checkpoint::{
    CURRENT_SNAPSHOT_SCHEMA_VERSION, CheckpointEnvelope, DatasetShape, ENSEMBLE_SNAPSHOT_ID,
    EnsembleSnapshot, PayloadCodec, SnapshotWriter, decode_checkpoint_envelope,
    encode_checkpoint_envelope, load_snapshot_file, remove_snapshot_file, save_snapshot_file,
};
pub use classifier::{BossEnsemble, IndividualBoss, IndividualBossConfig, TrainEstimate};
pub use config::{
    CheckpointConfig, EnsembleConfig, EnsembleConfigWire, FastEstimateConfig, ParameterSelection,
    SearchStrategy, SubsampleConfig, WindowGrid,
};
pub use controller::{BuildStatus, CandidateOutcome, ChannelState, EnsembleController, EnsembleState};
pub use member::{BossMember, LooScore, MemberParams, accuracy_weight, boss_distance};
pub use memory::{estimate_bag_bytes, estimate_member_bytes, estimate_members_bytes};
pub use pool::ScoringPool;
pub use surrogate::{GpSurrogate, ParameterSpace, SurrogateConfig, SurrogateKernel};

/// Contract-bounded BOSS ensembles.
pub fn crate_name() -> &'static str {
    let _ = (boss_core::crate_name(), boss_sfa::crate_name());
    "boss-ensemble"
}
