//! Binds a live connection to the player and entity it controls, and
//! validates each inbound [`meridian_wire::ClientInput`] before it is
//! allowed to overwrite that entity's `InputState`.
//!
//! Adapted from the teacher's session/validation split: a `Session` is
//! the connection-to-entity binding, `validate_input` is the gate. Unlike
//! the teacher's target-tick-floor scheme, Meridian's wire `ClientInput`
//! carries no target tick (§6) — the server applies each accepted input to
//! the entity immediately rather than buffering it per future tick, so
//! there is no analogue to the teacher's `InputBuffer`/`LastKnownIntent`
//! machinery here: sequence and rate validation alone (both already
//! implemented by `meridian_sim::AntiCheatValidator`) are the gate.

use meridian_sim::components::{AntiCheatState, InputFlags, InputState};
use meridian_sim::{AntiCheatValidator, EntityId, RateVerdict};
use meridian_wire::ClientInput;

use crate::net::ConnectionId;

pub type SessionId = u64;

/// A live connection's binding to the player and entity it controls.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub id: SessionId,
    pub connection: ConnectionId,
    pub player_id: u64,
    pub controlled_entity: EntityId,
    pub last_accepted_seq: u32,
}

impl Session {
    #[must_use]
    pub fn new(id: SessionId, connection: ConnectionId, player_id: u64, controlled_entity: EntityId) -> Self {
        Self {
            id,
            connection,
            player_id,
            controlled_entity,
            last_accepted_seq: 0,
        }
    }
}

/// Outcome of validating one inbound `ClientInput`, mirroring the
/// disjoint accept/drop shape of the teacher's `ValidationResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    Accepted,
    DroppedNanInf,
    /// `seq` did not strictly exceed the session's last accepted sequence.
    DroppedStaleSequence,
    DroppedRateLimit { strikes_after: u32 },
    DroppedUnknownSession,
}

impl ValidationResult {
    #[must_use]
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Validate and, if accepted, apply `input` to `session`'s controlled
/// entity's `InputState`. Sequence monotonicity and rolling-window rate
/// limiting are delegated to `meridian_sim::AntiCheatValidator` so the two
/// crates never drift on what "too fast" means.
pub fn validate_and_apply_input(
    session: &mut Session,
    input: &ClientInput,
    input_states: &mut meridian_sim::world::ComponentStore<InputState>,
    anticheat_states: &mut meridian_sim::world::ComponentStore<AntiCheatState>,
    validator: &AntiCheatValidator,
    now_tick: u32,
) -> ValidationResult {
    if !input.yaw.is_finite() || !input.pitch.is_finite() {
        return ValidationResult::DroppedNanInf;
    }

    if !AntiCheatValidator::is_sequence_valid(session.last_accepted_seq, input.seq) {
        return ValidationResult::DroppedStaleSequence;
    }

    let Some(anticheat) = anticheat_states.get_mut(session.controlled_entity) else {
        return ValidationResult::DroppedUnknownSession;
    };
    if let RateVerdict::RateLimited { strikes_after } = validator.validate_rate(anticheat, now_tick) {
        return ValidationResult::DroppedRateLimit { strikes_after };
    }

    session.last_accepted_seq = input.seq;
    input_states.insert(
        session.controlled_entity,
        InputState {
            flags: InputFlags(input.input_flags),
            yaw: f64::from(input.yaw),
            pitch: f64::from(input.pitch),
            seq: input.seq,
            client_tick_ms: input.client_tick_ms,
        },
    );
    ValidationResult::Accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_geom::Vec3Fixed;
    use meridian_sim::world::ComponentStore;

    fn input(seq: u32) -> ClientInput {
        ClientInput {
            seq,
            client_tick_ms: 0,
            input_flags: InputFlags::FORWARD,
            yaw: 0.0,
            pitch: 0.0,
            target_entity: 0,
            ack_baseline_tick: 0,
        }
    }

    #[test]
    fn first_input_is_accepted_and_written() {
        let mut session = Session::new(1, 1, 1, EntityId(0));
        let mut input_states = ComponentStore::new();
        let mut anticheat_states = ComponentStore::new();
        anticheat_states.insert(EntityId(0), AntiCheatState::at(Vec3Fixed::ZERO, 0));
        let validator = AntiCheatValidator::new(meridian_sim::AntiCheatConfig::standard(60));

        let result = validate_and_apply_input(&mut session, &input(1), &mut input_states, &mut anticheat_states, &validator, 0);
        assert_eq!(result, ValidationResult::Accepted);
        assert_eq!(input_states.get(EntityId(0)).unwrap().seq, 1);
    }

    #[test]
    fn stale_sequence_is_dropped() {
        let mut session = Session::new(1, 1, 1, EntityId(0));
        session.last_accepted_seq = 5;
        let mut input_states = ComponentStore::new();
        let mut anticheat_states = ComponentStore::new();
        anticheat_states.insert(EntityId(0), AntiCheatState::at(Vec3Fixed::ZERO, 0));
        let validator = AntiCheatValidator::new(meridian_sim::AntiCheatConfig::standard(60));

        let result = validate_and_apply_input(&mut session, &input(5), &mut input_states, &mut anticheat_states, &validator, 0);
        assert_eq!(result, ValidationResult::DroppedStaleSequence);
    }

    #[test]
    fn nan_yaw_is_dropped() {
        let mut session = Session::new(1, 1, 1, EntityId(0));
        let mut input_states = ComponentStore::new();
        let mut anticheat_states = ComponentStore::new();
        anticheat_states.insert(EntityId(0), AntiCheatState::at(Vec3Fixed::ZERO, 0));
        let validator = AntiCheatValidator::new(meridian_sim::AntiCheatConfig::standard(60));

        let mut bad = input(1);
        bad.yaw = f32::NAN;
        let result = validate_and_apply_input(&mut session, &bad, &mut input_states, &mut anticheat_states, &validator, 0);
        assert_eq!(result, ValidationResult::DroppedNanInf);
    }
}
