//! Accumulates one zone's tick history as it runs live, producing a
//! [`ReplayArtifact`] on [`ReplayRecorder::finalize`]. Recording never
//! fails or blocks the tick thread: every method here is an infallible
//! push onto an in-memory buffer, matching the "tick thread never
//! blocks on I/O" design this crate's caller (`meridian-server`) is
//! built around — the artifact is only serialized to disk after the
//! match ends.

use std::io::Read;

use meridian_sim::components::EntityType;
use sha2::{Digest, Sha256};

use crate::artifact::{
    AppliedInputProto, BuildFingerprintProto, EntitySpawnProto, ReplayArtifact,
    REPLAY_FORMAT_VERSION,
};
use crate::config::ReplayConfig;

/// Identifies the exact binary a replay was recorded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFingerprintData {
    pub binary_sha256: [u8; 32],
    pub target_triple: String,
    pub profile: String,
    pub git_commit: String,
}

impl BuildFingerprintData {
    /// Hashes the currently running executable on disk. The server calls
    /// this once at startup and feeds the result to every zone's
    /// recorder, so two zones on the same host share one fingerprint.
    pub fn for_current_binary(git_commit: impl Into<String>) -> std::io::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let mut file = std::fs::File::open(exe_path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        let binary_sha256: [u8; 32] = hasher.finalize().into();
        Ok(Self {
            binary_sha256,
            target_triple: std::env::consts::ARCH.to_string(),
            profile: if cfg!(debug_assertions) { "debug".to_string() } else { "release".to_string() },
            git_commit: git_commit.into(),
        })
    }
}

impl From<BuildFingerprintData> for BuildFingerprintProto {
    fn from(data: BuildFingerprintData) -> Self {
        Self {
            binary_sha256: data.binary_sha256.to_vec(),
            target_triple: data.target_triple,
            profile: data.profile,
            git_commit: data.git_commit,
        }
    }
}

/// A live entity's state the instant it was spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySpawn {
    pub entity_id: u32,
    pub entity_type: EntityType,
    pub position_raw: (i64, i64, i64),
    pub bounding_radius_raw: i64,
    pub bounding_height_raw: i64,
}

fn entity_type_to_u32(entity_type: EntityType) -> u32 {
    match entity_type {
        EntityType::Player => 0,
        EntityType::Npc => 1,
        EntityType::Projectile => 2,
        EntityType::Projected => 3,
    }
}

/// One entity's accepted (or last-known-intent fallback) input at a
/// tick, the unit `verify_replay` replays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedInput {
    pub tick: u32,
    pub entity_id: u32,
    pub input_flags: u8,
    pub yaw: f32,
    pub pitch: f32,
    pub is_fallback: bool,
}

impl From<AppliedInput> for AppliedInputProto {
    fn from(input: AppliedInput) -> Self {
        Self {
            tick: input.tick,
            entity_id: input.entity_id,
            input_flags: u32::from(input.input_flags),
            yaw: input.yaw,
            pitch: input.pitch,
            is_fallback: input.is_fallback,
        }
    }
}

pub struct ReplayRecorder {
    config: ReplayConfig,
    build_fingerprint: Option<BuildFingerprintData>,
    spawn_order: Vec<EntitySpawn>,
    initial_digest: Option<u64>,
    initial_tick: u32,
    inputs: Vec<AppliedInput>,
}

impl ReplayRecorder {
    #[must_use]
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            build_fingerprint: None,
            spawn_order: Vec::new(),
            initial_digest: None,
            initial_tick: 0,
            inputs: Vec::new(),
        }
    }

    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        self.build_fingerprint = Some(fingerprint);
    }

    pub fn record_spawn(&mut self, spawn: EntitySpawn) {
        self.spawn_order.push(spawn);
    }

    /// Record the world's digest at the tick recording began — the
    /// anchor `verify_replay` reconstructs the world against before
    /// replaying a single input.
    pub fn record_baseline(&mut self, digest: u64, tick: u32) {
        self.initial_digest = Some(digest);
        self.initial_tick = tick;
    }

    pub fn record_input(&mut self, input: AppliedInput) {
        self.inputs.push(input);
    }

    /// Consume the recorder, producing the artifact. `final_digest` and
    /// `checkpoint_tick` come from the live `World` the caller just
    /// finished stepping; `end_reason` is a short caller-defined tag
    /// (e.g. `"complete"`, `"disconnect"`).
    #[must_use]
    pub fn finalize(self, final_digest: u64, checkpoint_tick: u32, end_reason: &str) -> ReplayArtifact {
        ReplayArtifact {
            replay_format_version: REPLAY_FORMAT_VERSION,
            zone_id: self.config.zone_id,
            tick_rate_hz: self.config.tick_rate_hz,
            spatial_cell_size_m: self.config.spatial_cell_size_m,
            test_mode: self.config.test_mode,
            test_entity_ids: self.config.test_entity_ids,
            build: self.build_fingerprint.map(Into::into),
            spawn_order: self
                .spawn_order
                .into_iter()
                .map(|spawn| EntitySpawnProto {
                    entity_id: spawn.entity_id,
                    entity_type: entity_type_to_u32(spawn.entity_type),
                    pos_x: spawn.position_raw.0,
                    pos_y: spawn.position_raw.1,
                    pos_z: spawn.position_raw.2,
                    bounding_radius: spawn.bounding_radius_raw,
                    bounding_height: spawn.bounding_height_raw,
                })
                .collect(),
            initial_digest: self.initial_digest.unwrap_or(0),
            initial_tick: self.initial_tick,
            inputs: self.inputs.into_iter().map(Into::into).collect(),
            final_digest,
            checkpoint_tick,
            end_reason: end_reason.to_string(),
        }
    }
}
