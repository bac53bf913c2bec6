//! Re-simulates a recorded [`ReplayArtifact`] from its initial spawn
//! state and asserts the result matches what was recorded live. Only
//! the deterministic movement substrate (`meridian_sim::MovementSystem`)
//! is replayed here — combat and migration are driven by descriptors
//! this crate does not capture, so a replay that exercised combat can
//! only be verified up to the movement/anti-cheat determinism it also
//! depends on, not the damage outcomes themselves.

use std::collections::HashMap;

use meridian_geom::{Fixed, Vec3Fixed};
use meridian_sim::components::{BoundingVolume, EntityType, InputFlags, InputState};
use meridian_sim::{MovementConfig, MovementSystem, World};

use crate::artifact::ReplayArtifact;
use crate::recorder::BuildFingerprintData;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("replay was recorded under a different build: expected {expected_git_commit}, current build is {current_git_commit}")]
    BuildMismatch {
        expected_git_commit: String,
        current_git_commit: String,
    },
    #[error("artifact carries no initial digest to anchor reconstruction against")]
    MissingInitialDigest,
    #[error("reconstructed world's initial digest {actual} does not match the recorded {expected}")]
    InitialDigestMismatch { expected: u64, actual: u64 },
    #[error("spawning entity #{index} produced id {actual}, recorded spawn order expected {expected}")]
    SpawnReconstructionMismatch { index: usize, expected: u32, actual: u32 },
    #[error("input stream invalid: {reason}")]
    InputStreamInvalid { reason: String },
    #[error("reconstructed world stopped at tick {actual}, checkpoint recorded {expected}")]
    CheckpointTickMismatch { expected: u32, actual: u32 },
    #[error("reconstructed world's final digest {actual} does not match the recorded {expected}")]
    FinalDigestMismatch { expected: u64, actual: u64 },
    #[error("artifact is malformed: {reason}")]
    InvalidFormat { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub strict_build_check: bool,
    pub current_build: Option<BuildFingerprintData>,
}

fn entity_type_from_u32(value: u32) -> Result<EntityType, VerifyError> {
    match value {
        0 => Ok(EntityType::Player),
        1 => Ok(EntityType::Npc),
        2 => Ok(EntityType::Projectile),
        3 => Ok(EntityType::Projected),
        other => Err(VerifyError::InvalidFormat {
            reason: format!("unknown entity_type byte {other} in spawn_order"),
        }),
    }
}

fn check_build(artifact: &ReplayArtifact, options: &VerifyOptions) -> Result<(), VerifyError> {
    if !options.strict_build_check {
        return Ok(());
    }
    let Some(current) = &options.current_build else {
        return Err(VerifyError::BuildMismatch {
            expected_git_commit: artifact
                .build
                .as_ref()
                .map(|b| b.git_commit.clone())
                .unwrap_or_default(),
            current_git_commit: String::new(),
        });
    };
    let Some(recorded) = &artifact.build else {
        return Err(VerifyError::BuildMismatch {
            expected_git_commit: String::new(),
            current_git_commit: current.git_commit.clone(),
        });
    };
    if recorded.binary_sha256 != current.binary_sha256.to_vec() || recorded.git_commit != current.git_commit {
        return Err(VerifyError::BuildMismatch {
            expected_git_commit: recorded.git_commit.clone(),
            current_git_commit: current.git_commit.clone(),
        });
    }
    Ok(())
}

fn check_input_stream(artifact: &ReplayArtifact) -> Result<(), VerifyError> {
    let mut last_tick = artifact.initial_tick;
    for input in &artifact.inputs {
        if input.tick < artifact.initial_tick || input.tick > artifact.checkpoint_tick {
            return Err(VerifyError::InputStreamInvalid {
                reason: format!(
                    "input at tick {} falls outside recorded range [{}, {}]",
                    input.tick, artifact.initial_tick, artifact.checkpoint_tick
                ),
            });
        }
        if input.tick < last_tick {
            return Err(VerifyError::InputStreamInvalid {
                reason: format!("input tick {} precedes earlier input at tick {last_tick}", input.tick),
            });
        }
        last_tick = input.tick;
    }
    Ok(())
}

/// Reconstructs the recorded world from its spawn order and replays
/// every recorded input through `MovementSystem`, checking the
/// reconstructed digest at the initial tick and at the checkpoint
/// against what was recorded live.
pub fn verify_replay(artifact: &ReplayArtifact, options: &VerifyOptions) -> Result<(), VerifyError> {
    check_build(artifact, options)?;
    check_input_stream(artifact)?;

    if artifact.initial_digest == 0 && artifact.spawn_order.is_empty() {
        return Err(VerifyError::MissingInitialDigest);
    }

    let cell_size = Fixed::from_meters_f64(artifact.spatial_cell_size_m);
    let mut world = World::new(artifact.zone_id, cell_size);
    world.tick = artifact.initial_tick;

    for (index, spawn) in artifact.spawn_order.iter().enumerate() {
        let entity_type = entity_type_from_u32(spawn.entity_type)?;
        let position = Vec3Fixed {
            x: Fixed::from_raw(spawn.pos_x),
            y: Fixed::from_raw(spawn.pos_y),
            z: Fixed::from_raw(spawn.pos_z),
        };
        let bounding = BoundingVolume {
            radius: Fixed::from_raw(spawn.bounding_radius),
            height: Fixed::from_raw(spawn.bounding_height),
        };
        let id = world.spawn(entity_type, position, bounding);
        if id.index() != spawn.entity_id {
            return Err(VerifyError::SpawnReconstructionMismatch {
                index,
                expected: spawn.entity_id,
                actual: id.index(),
            });
        }
        world.input_states.insert(
            id,
            InputState {
                flags: InputFlags::default(),
                yaw: 0.0,
                pitch: 0.0,
                seq: 0,
                client_tick_ms: 0,
            },
        );
    }

    let initial_actual = world.state_digest();
    if initial_actual != artifact.initial_digest {
        return Err(VerifyError::InitialDigestMismatch {
            expected: artifact.initial_digest,
            actual: initial_actual,
        });
    }

    let mut inputs_by_tick: HashMap<u32, Vec<&crate::artifact::AppliedInputProto>> = HashMap::new();
    for input in &artifact.inputs {
        inputs_by_tick.entry(input.tick).or_default().push(input);
    }

    let bounds = meridian_sim::WorldBounds {
        min: Vec3Fixed::from_meters(-10_000.0, 0.0, -10_000.0),
        max: Vec3Fixed::from_meters(10_000.0, 10_000.0, 10_000.0),
    };
    let movement = MovementSystem::new(MovementConfig::standard(artifact.tick_rate_hz, bounds));

    for tick in (artifact.initial_tick + 1)..=artifact.checkpoint_tick {
        if let Some(inputs) = inputs_by_tick.get(&tick) {
            for input in inputs {
                let entity_id = meridian_sim::EntityId(input.entity_id);
                if let Some(state) = world.input_states.get_mut(entity_id) {
                    state.flags = InputFlags(u8::try_from(input.input_flags).unwrap_or(0));
                    state.yaw = f64::from(input.yaw);
                    state.pitch = f64::from(input.pitch);
                }
            }
        }
        world.tick = tick;
        movement.step(&mut world);
    }

    if world.tick != artifact.checkpoint_tick {
        return Err(VerifyError::CheckpointTickMismatch {
            expected: artifact.checkpoint_tick,
            actual: world.tick,
        });
    }

    let final_actual = world.state_digest();
    if final_actual != artifact.final_digest {
        return Err(VerifyError::FinalDigestMismatch {
            expected: artifact.final_digest,
            actual: final_actual,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplayConfig;
    use crate::recorder::{AppliedInput, EntitySpawn, ReplayRecorder};

    #[test]
    fn a_replay_with_no_inputs_verifies_against_its_own_digest() {
        let cell_size = Fixed::from_meters_f64(10.0);
        let mut world = World::new(1, cell_size);
        let id = world.spawn(
            EntityType::Player,
            Vec3Fixed::from_meters(1.0, 0.0, 2.0),
            BoundingVolume {
                radius: Fixed::from_meters_f64(0.5),
                height: Fixed::from_meters_f64(1.8),
            },
        );
        let initial_digest = world.state_digest();

        let mut recorder = ReplayRecorder::new(ReplayConfig {
            zone_id: 1,
            tick_rate_hz: 60,
            spatial_cell_size_m: 10.0,
            test_mode: false,
            test_entity_ids: Vec::new(),
        });
        recorder.record_spawn(EntitySpawn {
            entity_id: id.index(),
            entity_type: EntityType::Player,
            position_raw: (
                world.positions.get(id).unwrap().pos.x.raw(),
                world.positions.get(id).unwrap().pos.y.raw(),
                world.positions.get(id).unwrap().pos.z.raw(),
            ),
            bounding_radius_raw: Fixed::from_meters_f64(0.5).raw(),
            bounding_height_raw: Fixed::from_meters_f64(1.8).raw(),
        });
        recorder.record_baseline(initial_digest, 0);
        let artifact = recorder.finalize(initial_digest, 0, "complete");

        assert!(verify_replay(&artifact, &VerifyOptions::default()).is_ok());
    }

    #[test]
    fn mismatched_final_digest_is_rejected() {
        let cell_size = Fixed::from_meters_f64(10.0);
        let mut world = World::new(1, cell_size);
        let id = world.spawn(
            EntityType::Player,
            Vec3Fixed::ZERO,
            BoundingVolume {
                radius: Fixed::from_meters_f64(0.5),
                height: Fixed::from_meters_f64(1.8),
            },
        );
        let initial_digest = world.state_digest();

        let mut recorder = ReplayRecorder::new(ReplayConfig::default());
        recorder.record_spawn(EntitySpawn {
            entity_id: id.index(),
            entity_type: EntityType::Player,
            position_raw: (0, 0, 0),
            bounding_radius_raw: Fixed::from_meters_f64(0.5).raw(),
            bounding_height_raw: Fixed::from_meters_f64(1.8).raw(),
        });
        recorder.record_baseline(initial_digest, 0);
        recorder.record_input(AppliedInput {
            tick: 1,
            entity_id: id.index(),
            input_flags: InputFlags::FORWARD,
            yaw: 0.0,
            pitch: 0.0,
            is_fallback: false,
        });
        // Deliberately wrong final digest.
        let artifact = recorder.finalize(initial_digest.wrapping_add(1), 1, "complete");

        assert!(matches!(
            verify_replay(&artifact, &VerifyOptions::default()),
            Err(VerifyError::FinalDigestMismatch { .. })
        ));
    }

    #[test]
    fn out_of_order_input_tick_is_rejected_before_simulation_starts() {
        let mut artifact = ReplayArtifact {
            replay_format_version: crate::artifact::REPLAY_FORMAT_VERSION,
            zone_id: 1,
            tick_rate_hz: 60,
            spatial_cell_size_m: 10.0,
            test_mode: false,
            test_entity_ids: Vec::new(),
            build: None,
            spawn_order: Vec::new(),
            initial_digest: 1,
            initial_tick: 0,
            inputs: Vec::new(),
            final_digest: 1,
            checkpoint_tick: 5,
            end_reason: "complete".to_string(),
        };
        artifact.inputs.push(crate::artifact::AppliedInputProto {
            tick: 3,
            entity_id: 0,
            input_flags: 0,
            yaw: 0.0,
            pitch: 0.0,
            is_fallback: false,
        });
        artifact.inputs.push(crate::artifact::AppliedInputProto {
            tick: 1,
            entity_id: 0,
            input_flags: 0,
            yaw: 0.0,
            pitch: 0.0,
            is_fallback: false,
        });

        assert!(matches!(
            verify_replay(&artifact, &VerifyOptions::default()),
            Err(VerifyError::InputStreamInvalid { .. })
        ));
    }
}
