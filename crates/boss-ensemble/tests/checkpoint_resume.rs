// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

#[path = "support/fixtures.rs"]
mod fixtures;

use boss_core::{Dataset, Predictive, Trainable};
use boss_ensemble::{
    BossEnsemble, BuildStatus, CheckpointConfig, DatasetShape, EnsembleConfig, EnsembleController,
    EnsembleSnapshot, EnsembleState, PayloadCodec, ScoringPool, load_snapshot_file,
    remove_snapshot_file, save_snapshot_file,
};
use fixtures::{
    quick_config, two_class_dataset, two_class_series, unique_temp_checkpoint_path,
};

fn partial_state(config: &EnsembleConfig, data: &Dataset, candidates: usize) -> EnsembleState {
    let partial = config.clone().with_ensemble_size(candidates);
    let state = EnsembleState::new(&partial, data.n_channels(), data.series_len())
        .expect("state should build");
    let pool = ScoringPool::sequential();
    EnsembleController::new(&partial, data, &pool, state, None)
        .expect("controller should build")
        .run()
        .expect("partial build should succeed")
}

fn write_snapshot(
    path: &std::path::Path,
    state: &EnsembleState,
    config: &EnsembleConfig,
    data: &Dataset,
    codec: PayloadCodec,
) {
    let snapshot = EnsembleSnapshot::capture(
        state,
        &config.search_fingerprint().expect("fingerprint"),
        &DatasetShape::of(data),
    );
    save_snapshot_file(path, &snapshot, codec).expect("snapshot should save");
}

fn history_params(model: &BossEnsemble) -> Vec<String> {
    model.state().expect("trained state").channels()[0]
        .history()
        .iter()
        .map(|outcome| outcome.params.to_string())
        .collect()
}

#[test]
fn resumed_build_matches_an_uninterrupted_build() {
    let data = two_class_dataset(6, 48);
    let config = quick_config().with_ensemble_size(12).with_max_ensemble_size(4).with_seed(3);

    let mut uninterrupted = BossEnsemble::new(config.clone()).expect("valid config");
    uninterrupted.fit(&data).expect("uninterrupted fit");

    for codec in [PayloadCodec::Json, PayloadCodec::Bincode] {
        let path = unique_temp_checkpoint_path("boss-resume");
        let state = partial_state(&config, &data, 5);
        assert_eq!(state.candidates_built(), 5);
        write_snapshot(&path, &state, &config, &data, codec);

        let mut resumed = BossEnsemble::new(config.clone()).expect("valid config");
        resumed.set_checkpoint_path(&path);
        resumed.fit(&data).expect("resumed fit");

        let resumed_state = resumed.state().expect("trained state");
        assert_eq!(resumed_state.candidates_built(), 12);
        assert!(resumed_state.elapsed_ns() >= state.elapsed_ns());
        assert_eq!(history_params(&resumed), history_params(&uninterrupted));
        assert_eq!(resumed.parameters_summary(), uninterrupted.parameters_summary());
        assert!(!path.exists(), "snapshot should be cleaned up on finish");
    }
}

#[test]
fn snapshot_from_another_configuration_is_ignored() {
    let data = two_class_dataset(5, 40);
    let config = quick_config().with_ensemble_size(6).with_max_ensemble_size(3);
    let foreign = config.clone().with_seed(1234);

    let path = unique_temp_checkpoint_path("boss-foreign");
    let state = partial_state(&foreign, &data, 3);
    write_snapshot(&path, &state, &foreign, &data, PayloadCodec::Bincode);

    let mut fresh = BossEnsemble::new(config.clone()).expect("valid config");
    fresh.fit(&data).expect("fresh fit");

    let mut restarted = BossEnsemble::new(config).expect("valid config");
    restarted.set_checkpoint_path(&path);
    restarted.fit(&data).expect("fit should ignore the foreign snapshot");
    assert_eq!(restarted.parameters_summary(), fresh.parameters_summary());
}

#[test]
fn corrupt_snapshot_is_ignored() {
    let data = two_class_dataset(4, 40);
    let path = unique_temp_checkpoint_path("boss-corrupt");
    std::fs::write(&path, b"{\"snapshot_id\": \"boss-ensemble\"").expect("write garbage");

    let mut model = BossEnsemble::new(quick_config().with_ensemble_size(4)).expect("valid config");
    model.set_checkpoint_path(&path);
    model.fit(&data).expect("corrupt snapshot must not fail training");
    assert_eq!(model.state().expect("trained state").candidates_built(), 4);
    let _ = remove_snapshot_file(&path);
}

#[test]
fn kept_snapshot_holds_the_final_state() {
    let data = two_class_dataset(4, 40);
    let path = unique_temp_checkpoint_path("boss-keep");
    let config = quick_config()
        .with_ensemble_size(5)
        .with_max_ensemble_size(2)
        .with_checkpoint(Some(CheckpointConfig {
            path: path.clone(),
            codec: PayloadCodec::Json,
            cleanup_on_finish: false,
        }));
    let mut model = BossEnsemble::new(config.clone()).expect("valid config");
    model.fit(&data).expect("fit should succeed");

    let snapshot = load_snapshot_file(&path).expect("snapshot should remain on disk");
    let state = snapshot
        .restore(
            &config.search_fingerprint().expect("fingerprint"),
            &DatasetShape::of(&data),
        )
        .expect("snapshot should match its own run");
    assert_eq!(state.status(), BuildStatus::TargetReached);
    assert_eq!(state.member_count(), model.ensemble_size());
    assert_eq!(state.candidates_built(), 5);

    let mut rerun = BossEnsemble::new(config).expect("valid config");
    rerun.fit(&data).expect("rerun from a finished snapshot");
    assert_eq!(rerun.parameters_summary(), model.parameters_summary());
    assert!(remove_snapshot_file(&path).expect("remove should work"));
}

#[test]
fn unwritable_checkpoint_path_does_not_fail_training() {
    let data = two_class_dataset(4, 40);
    let dir = unique_temp_checkpoint_path("boss-no-such-dir");
    let mut model = BossEnsemble::new(quick_config().with_ensemble_size(4)).expect("valid config");
    model.set_checkpoint_path(dir.join("snapshot.json"));
    model.fit(&data).expect("checkpoint failures are logged, not returned");
    assert!(model.ensemble_size() > 0);
}

#[test]
fn restored_ensemble_predicts_identically_without_retraining() {
    let data = two_class_dataset(4, 40);
    let held_out: Vec<_> = two_class_series(8, 40)
        .split_off(8)
        .into_iter()
        .map(|instance| instance.without_label())
        .collect();

    for codec in [PayloadCodec::Json, PayloadCodec::Bincode] {
        let path = unique_temp_checkpoint_path("boss-roundtrip");
        let config = quick_config()
            .with_ensemble_size(6)
            .with_max_ensemble_size(3)
            .with_weights(true)
            .with_checkpoint(Some(CheckpointConfig {
                path: path.clone(),
                codec,
                cleanup_on_finish: false,
            }));
        let mut original = BossEnsemble::new(config.clone()).expect("valid config");
        original.fit(&data).expect("original fit");

        let mut restored = BossEnsemble::new(config).expect("valid config");
        restored.fit(&data).expect("restore from the finished snapshot");

        let before = original.state().expect("trained state");
        let after = restored.state().expect("restored state");
        assert_eq!(after.candidates_built(), before.candidates_built());
        assert_eq!(after.channels()[0].history(), before.channels()[0].history());
        for (kept, reloaded) in original.members(0).iter().zip(restored.members(0)) {
            assert_eq!(reloaded.params(), kept.params());
            assert_eq!(reloaded.bags(), kept.bags());
            assert_eq!(reloaded.breakpoints(), kept.breakpoints());
            assert_eq!(reloaded.weight().to_bits(), kept.weight().to_bits());
        }
        assert_eq!(restored.members(0).len(), original.members(0).len());

        for query in &held_out {
            let expected = original.predict_proba(query).expect("original proba");
            let actual = restored.predict_proba(query).expect("restored proba");
            let expected_bits: Vec<u64> = expected.iter().map(|p| p.to_bits()).collect();
            let actual_bits: Vec<u64> = actual.iter().map(|p| p.to_bits()).collect();
            assert_eq!(actual_bits, expected_bits, "codec={codec:?}");
        }
        assert!(remove_snapshot_file(&path).expect("remove should work"));
    }
}
