// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::config::CheckpointConfig;
use crate::controller::EnsembleState;
use boss_core::{BossError, Dataset};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// Identifier stored in every ensemble snapshot envelope.
pub const ENSEMBLE_SNAPSHOT_ID: &str = "boss-ensemble";
/// Current snapshot schema version emitted by writers.
pub const CURRENT_SNAPSHOT_SCHEMA_VERSION: u32 = 1;
/// Minimum snapshot schema version accepted by readers.
pub const MIN_SUPPORTED_SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Supported codec for snapshot payload bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadCodec {
    Json,
    Bincode,
}

/// Serialized envelope around a snapshot payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEnvelope {
    pub snapshot_id: String,
    pub state_schema_version: u32,
    pub engine_fingerprint: String,
    pub created_at_ns: i64,
    pub payload_crc32: u32,
    pub payload_codec: PayloadCodec,
    pub payload: Vec<u8>,
}

impl CheckpointEnvelope {
    fn validate_metadata(&self) -> Result<(), BossError> {
        if self.snapshot_id.trim().is_empty() {
            return Err(BossError::checkpoint(
                "checkpoint snapshot_id must be non-empty",
            ));
        }
        if self.engine_fingerprint.trim().is_empty() {
            return Err(BossError::checkpoint(
                "checkpoint engine_fingerprint must be non-empty",
            ));
        }
        if self.created_at_ns < 0 {
            return Err(BossError::checkpoint(format!(
                "checkpoint created_at_ns must be >= 0; got {}",
                self.created_at_ns
            )));
        }
        validate_snapshot_schema_version(self.state_schema_version)
    }

    fn verify_payload_crc32(&self) -> Result<(), BossError> {
        let observed = crc32fast::hash(&self.payload);
        if observed != self.payload_crc32 {
            return Err(BossError::checkpoint(format!(
                "checkpoint payload crc32 mismatch: expected=0x{:08x}, observed=0x{:08x}",
                self.payload_crc32, observed
            )));
        }
        Ok(())
    }
}

/// Shape and content fingerprint of the training set a snapshot was taken on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetShape {
    pub n_instances: usize,
    pub n_channels: usize,
    pub series_len: usize,
    pub num_classes: usize,
    pub content_crc32: u32,
}

impl DatasetShape {
    pub fn of(data: &Dataset) -> Self {
        let mut hasher = crc32fast::Hasher::new();
        for instance in data.instances() {
            for channel in instance.channels() {
                for value in channel {
                    hasher.update(&value.to_le_bytes());
                }
            }
            let label = instance.label().map_or(u64::MAX, |label| label as u64);
            hasher.update(&label.to_le_bytes());
        }
        Self {
            n_instances: data.len(),
            n_channels: data.n_channels(),
            series_len: data.series_len(),
            num_classes: data.num_classes(),
            content_crc32: hasher.finalize(),
        }
    }
}

/// Everything needed to resume an interrupted build: the search
/// configuration fingerprint, the dataset shape and the controller state.
/// Raw training data is never included.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnsembleSnapshot {
    pub config_fingerprint: String,
    pub dataset: DatasetShape,
    pub state: EnsembleState,
}

#[derive(Serialize)]
struct EnsembleSnapshotRef<'a> {
    config_fingerprint: &'a str,
    dataset: &'a DatasetShape,
    state: &'a EnsembleState,
}

impl EnsembleSnapshot {
    pub fn capture(state: &EnsembleState, config_fingerprint: &str, dataset: &DatasetShape) -> Self {
        Self {
            config_fingerprint: config_fingerprint.to_string(),
            dataset: dataset.clone(),
            state: state.clone(),
        }
    }

    /// Returns the stored state when it was taken under the same search
    /// configuration and on the same dataset.
    pub fn restore(
        self,
        config_fingerprint: &str,
        dataset: &DatasetShape,
    ) -> Result<EnsembleState, BossError> {
        if self.config_fingerprint != config_fingerprint {
            return Err(BossError::checkpoint(format!(
                "snapshot config fingerprint mismatch: expected='{config_fingerprint}', found='{}'",
                self.config_fingerprint
            )));
        }
        if &self.dataset != dataset {
            return Err(BossError::checkpoint(format!(
                "snapshot dataset mismatch: expected {dataset:?}, found {:?}",
                self.dataset
            )));
        }
        if self.state.channels().len() != dataset.n_channels {
            return Err(BossError::checkpoint(format!(
                "snapshot holds {} channels, dataset has {}",
                self.state.channels().len(),
                dataset.n_channels
            )));
        }
        Ok(self.state)
    }
}

fn checkpoint_engine_fingerprint() -> String {
    format!(
        "boss-ensemble/{}/{}-{}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn now_unix_ns() -> Result<i64, BossError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| {
            BossError::resource_limit(format!(
                "system clock before UNIX epoch; cannot timestamp checkpoint: {err}"
            ))
        })?;
    i64::try_from(elapsed.as_nanos()).map_err(|_| {
        BossError::resource_limit("system timestamp overflow while constructing checkpoint")
    })
}

fn io_resource_error(action: &str, path: &Path, err: std::io::Error) -> BossError {
    BossError::resource_limit(format!("{action} '{}': {err}", path.display()))
}

fn serialize_state_payload<State: Serialize + ?Sized>(
    state: &State,
    payload_codec: PayloadCodec,
) -> Result<Vec<u8>, BossError> {
    match payload_codec {
        PayloadCodec::Json => serde_json::to_vec(state).map_err(|err| {
            BossError::checkpoint(format!(
                "checkpoint payload serialization failed (codec=json): {err}"
            ))
        }),
        PayloadCodec::Bincode => bincode::serialize(state).map_err(|err| {
            BossError::checkpoint(format!(
                "checkpoint payload serialization failed (codec=bincode): {err}"
            ))
        }),
    }
}

fn deserialize_state_payload<State: DeserializeOwned>(
    payload: &[u8],
    payload_codec: PayloadCodec,
) -> Result<State, BossError> {
    match payload_codec {
        PayloadCodec::Json => serde_json::from_slice(payload).map_err(|err| {
            BossError::checkpoint(format!(
                "checkpoint payload deserialization failed (codec=json): {err}"
            ))
        }),
        PayloadCodec::Bincode => bincode::deserialize(payload).map_err(|err| {
            BossError::checkpoint(format!(
                "checkpoint payload deserialization failed (codec=bincode): {err}"
            ))
        }),
    }
}

fn write_checkpoint_file_atomic(path: &Path, encoded: &[u8]) -> Result<(), BossError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().ok_or_else(|| {
        BossError::checkpoint(format!(
            "checkpoint path '{}' must include a file name",
            path.display()
        ))
    })?;
    let file_name = file_name.to_string_lossy();

    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let temp_path = parent.join(format!("{file_name}.tmp-{}-{suffix}", process::id()));

    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .map_err(|err| {
            io_resource_error("failed creating checkpoint temp file", &temp_path, err)
        })?;

    if let Err(err) = file.write_all(encoded) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_resource_error(
            "failed writing checkpoint temp file",
            &temp_path,
            err,
        ));
    }

    if let Err(err) = file.sync_all() {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_resource_error(
            "failed fsync on checkpoint temp file",
            &temp_path,
            err,
        ));
    }

    if let Err(err) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_resource_error(
            "failed renaming checkpoint temp file",
            path,
            err,
        ));
    }

    Ok(())
}

/// Validates snapshot schema version compatibility.
pub fn validate_snapshot_schema_version(state_schema_version: u32) -> Result<(), BossError> {
    if (MIN_SUPPORTED_SNAPSHOT_SCHEMA_VERSION..=CURRENT_SNAPSHOT_SCHEMA_VERSION)
        .contains(&state_schema_version)
    {
        return Ok(());
    }

    Err(BossError::checkpoint(format!(
        "checkpoint state_schema_version={state_schema_version} is unsupported; supported versions are {MIN_SUPPORTED_SNAPSHOT_SCHEMA_VERSION}..={CURRENT_SNAPSHOT_SCHEMA_VERSION}"
    )))
}

/// Serializes a checkpoint envelope to JSON bytes.
pub fn encode_checkpoint_envelope(envelope: &CheckpointEnvelope) -> Result<Vec<u8>, BossError> {
    envelope.validate_metadata()?;
    envelope.verify_payload_crc32()?;
    serde_json::to_vec(envelope).map_err(|err| {
        BossError::checkpoint(format!("checkpoint envelope serialization failed: {err}"))
    })
}

/// Deserializes checkpoint envelope JSON bytes and verifies its payload.
pub fn decode_checkpoint_envelope(encoded: &[u8]) -> Result<CheckpointEnvelope, BossError> {
    let envelope: CheckpointEnvelope = serde_json::from_slice(encoded).map_err(|err| {
        BossError::checkpoint(format!("checkpoint envelope JSON parse failed: {err}"))
    })?;
    envelope.validate_metadata()?;
    envelope.verify_payload_crc32()?;
    Ok(envelope)
}

fn save_state_to_checkpoint_envelope<State: Serialize + ?Sized>(
    state: &State,
    payload_codec: PayloadCodec,
) -> Result<CheckpointEnvelope, BossError> {
    let payload = serialize_state_payload(state, payload_codec)?;
    let envelope = CheckpointEnvelope {
        snapshot_id: ENSEMBLE_SNAPSHOT_ID.to_string(),
        state_schema_version: CURRENT_SNAPSHOT_SCHEMA_VERSION,
        engine_fingerprint: checkpoint_engine_fingerprint(),
        created_at_ns: now_unix_ns()?,
        payload_crc32: crc32fast::hash(&payload),
        payload_codec,
        payload,
    };
    envelope.validate_metadata()?;
    Ok(envelope)
}

/// Wraps a snapshot in a checkpoint envelope.
pub fn save_snapshot_to_envelope(
    snapshot: &EnsembleSnapshot,
    payload_codec: PayloadCodec,
) -> Result<CheckpointEnvelope, BossError> {
    save_state_to_checkpoint_envelope(snapshot, payload_codec)
}

/// Extracts the snapshot from an envelope after compatibility and CRC checks.
pub fn load_snapshot_from_envelope(
    envelope: &CheckpointEnvelope,
) -> Result<EnsembleSnapshot, BossError> {
    envelope.validate_metadata()?;
    envelope.verify_payload_crc32()?;
    if envelope.snapshot_id != ENSEMBLE_SNAPSHOT_ID {
        return Err(BossError::checkpoint(format!(
            "checkpoint snapshot mismatch: expected='{ENSEMBLE_SNAPSHOT_ID}', found='{}'",
            envelope.snapshot_id
        )));
    }
    deserialize_state_payload(&envelope.payload, envelope.payload_codec)
}

/// Saves a snapshot to `path` using atomic persistence (tmp + fsync + rename).
pub fn save_snapshot_file(
    path: impl AsRef<Path>,
    snapshot: &EnsembleSnapshot,
    payload_codec: PayloadCodec,
) -> Result<CheckpointEnvelope, BossError> {
    let envelope = save_snapshot_to_envelope(snapshot, payload_codec)?;
    let encoded = encode_checkpoint_envelope(&envelope)?;
    write_checkpoint_file_atomic(path.as_ref(), &encoded)?;
    Ok(envelope)
}

/// Loads a snapshot from the checkpoint file at `path`.
pub fn load_snapshot_file(path: impl AsRef<Path>) -> Result<EnsembleSnapshot, BossError> {
    let path = path.as_ref();
    let encoded = std::fs::read(path)
        .map_err(|err| io_resource_error("failed reading checkpoint file", path, err))?;
    let envelope = decode_checkpoint_envelope(&encoded)?;
    load_snapshot_from_envelope(&envelope)
}

/// Deletes the checkpoint file at `path`; returns whether a file was removed.
pub fn remove_snapshot_file(path: impl AsRef<Path>) -> Result<bool, BossError> {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_resource_error("failed removing checkpoint file", path, err)),
    }
}

/// Persists controller state during a build. The first failed write is
/// logged and disables further writes.
#[derive(Clone, Debug)]
pub struct SnapshotWriter {
    path: PathBuf,
    codec: PayloadCodec,
    config_fingerprint: String,
    dataset: DatasetShape,
    enabled: bool,
    writes: usize,
}

impl SnapshotWriter {
    pub fn new(config: &CheckpointConfig, config_fingerprint: String, dataset: DatasetShape) -> Self {
        Self {
            path: config.path.clone(),
            codec: config.codec,
            config_fingerprint,
            dataset,
            enabled: true,
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn save(&mut self, state: &EnsembleState) {
        if !self.enabled {
            return;
        }
        match self.try_save(state) {
            Ok(()) => {
                self.writes += 1;
                debug!(path = %self.path.display(), writes = self.writes, "snapshot written");
            }
            Err(err) => {
                self.enabled = false;
                error!(
                    path = %self.path.display(),
                    %err,
                    "snapshot write failed; checkpointing disabled for this run"
                );
            }
        }
    }

    fn try_save(&self, state: &EnsembleState) -> Result<(), BossError> {
        let snapshot = EnsembleSnapshotRef {
            config_fingerprint: &self.config_fingerprint,
            dataset: &self.dataset,
            state,
        };
        let envelope = save_state_to_checkpoint_envelope(&snapshot, self.codec)?;
        let encoded = encode_checkpoint_envelope(&envelope)?;
        write_checkpoint_file_atomic(&self.path, &encoded)
    }
}
