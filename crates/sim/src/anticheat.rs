//! Per-input validation against speed, teleport, input-rate, and sequence
//! rules. Returns typed verdicts rather than logging directly — this crate
//! never touches I/O, so turning a verdict into an observability event is
//! `meridian-server`'s job.

use meridian_geom::{Fixed, Vec3Fixed};

use crate::components::AntiCheatState;

#[derive(Debug, Clone, Copy)]
pub struct AntiCheatConfig {
    pub tick_rate_hz: u32,
    /// Base horizontal speed cap, per tick (matches `MovementConfig`).
    pub max_speed_per_tick: Fixed,
    pub sprint_multiplier_numerator: i64,
    pub sprint_multiplier_denominator: i64,
    /// `Tolerance` in the spec's `MaxSpeed·Sprint·tickΔ·Tolerance` bound,
    /// as a ratio (1.2 == 12/10).
    pub tolerance_numerator: i64,
    pub tolerance_denominator: i64,
    pub max_teleport_distance: Fixed,
    pub max_inputs_per_second: u32,
    pub strike_threshold: u32,
}

impl AntiCheatConfig {
    #[must_use]
    pub fn standard(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            max_speed_per_tick: Fixed::from_meters_f64(5.0).scale_frac(1, i64::from(tick_rate_hz)),
            sprint_multiplier_numerator: 8,
            sprint_multiplier_denominator: 5,
            tolerance_numerator: 12,
            tolerance_denominator: 10,
            max_teleport_distance: Fixed::from_meters_f64(100.0),
            max_inputs_per_second: 60,
            strike_threshold: 3,
        }
    }

    fn allowed_delta(&self, tick_delta: u32, sprinting: bool) -> Fixed {
        let cap = if sprinting {
            self.max_speed_per_tick
                .scale_frac(self.sprint_multiplier_numerator, self.sprint_multiplier_denominator)
        } else {
            self.max_speed_per_tick
        };
        cap.scale_frac(i64::from(tick_delta), 1)
            .scale_frac(self.tolerance_numerator, self.tolerance_denominator)
    }
}

/// Outcome of validating a candidate position against a tracked entity's
/// last known-good state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementVerdict {
    /// Within bounds; `AntiCheatState` advances to the new position/tick.
    Accepted,
    /// Exceeded the speed/tolerance bound but not the teleport threshold:
    /// a strike is recorded and the caller must snap the entity back to
    /// `AntiCheatState::last_valid_pos`.
    SpeedViolation { strikes_after: u32 },
    /// Single-frame delta exceeded `MaxTeleportDistance`: immediate
    /// disconnect, no snap-back (the connection is going away anyway).
    Teleport,
    /// `SpeedViolation` pushed strikes to the kick threshold.
    StrikeThresholdExceeded,
}

/// Outcome of the per-connection input-rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateVerdict {
    Accepted,
    /// Excess input for this second; caller drops the packet silently and
    /// records a strike per spec §4.3.
    RateLimited { strikes_after: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct AntiCheatValidator {
    pub config: AntiCheatConfig,
}

impl AntiCheatValidator {
    #[must_use]
    pub fn new(config: AntiCheatConfig) -> Self {
        Self { config }
    }

    /// Sequence monotonicity: an incoming `seq` must be strictly greater
    /// than the last accepted one for this connection.
    #[must_use]
    pub fn is_sequence_valid(last_seq: u32, incoming_seq: u32) -> bool {
        incoming_seq > last_seq
    }

    /// Validate a candidate position reached at `now_tick`, given the
    /// entity's current anti-cheat state. Mutates `state` to reflect the
    /// verdict: advances `last_valid_pos`/`last_valid_tick` on acceptance,
    /// or bumps `strikes` on a violation.
    pub fn validate_movement(
        &self,
        state: &mut AntiCheatState,
        candidate_pos: Vec3Fixed,
        now_tick: u32,
        sprinting: bool,
    ) -> MovementVerdict {
        let delta = state.last_valid_pos.distance(candidate_pos);

        if delta > self.config.max_teleport_distance {
            return MovementVerdict::Teleport;
        }

        let tick_delta = now_tick.saturating_sub(state.last_valid_tick).max(1);
        let allowed = self.config.allowed_delta(tick_delta, sprinting);

        if delta > allowed {
            state.strikes += 1;
            if delta > state.max_observed_speed {
                state.max_observed_speed = delta;
            }
            if state.strikes >= self.config.strike_threshold {
                return MovementVerdict::StrikeThresholdExceeded;
            }
            return MovementVerdict::SpeedViolation {
                strikes_after: state.strikes,
            };
        }

        state.last_valid_pos = candidate_pos;
        state.last_valid_tick = now_tick;
        MovementVerdict::Accepted
    }

    /// Rolling-second input-rate check. Pushes `now_tick` into the window,
    /// evicts entries older than one second, and rejects once the window
    /// exceeds `max_inputs_per_second`.
    pub fn validate_rate(&self, state: &mut AntiCheatState, now_tick: u32) -> RateVerdict {
        let window_start = now_tick.saturating_sub(self.config.tick_rate_hz);
        while matches!(state.input_window.front(), Some(&t) if t < window_start) {
            state.input_window.pop_front();
        }
        state.input_window.push_back(now_tick);

        if state.input_window.len() as u32 > self.config.max_inputs_per_second {
            state.input_window.pop_back();
            state.strikes += 1;
            return RateVerdict::RateLimited {
                strikes_after: state.strikes,
            };
        }
        RateVerdict::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_strictly_increasing_required() {
        assert!(AntiCheatValidator::is_sequence_valid(10, 11));
        assert!(!AntiCheatValidator::is_sequence_valid(10, 10));
        assert!(!AntiCheatValidator::is_sequence_valid(10, 9));
    }

    #[test]
    fn small_movement_within_tolerance_is_accepted() {
        let validator = AntiCheatValidator::new(AntiCheatConfig::standard(60));
        let mut state = AntiCheatState::at(Vec3Fixed::ZERO, 0);
        let candidate = Vec3Fixed::from_meters(0.0, 0.0, 0.08); // < 5m/s*1.2/60 ~ 0.1m
        let verdict = validator.validate_movement(&mut state, candidate, 1, false);
        assert_eq!(verdict, MovementVerdict::Accepted);
        assert_eq!(state.last_valid_pos, candidate);
    }

    #[test]
    fn teleport_beyond_max_distance_is_immediate_disconnect() {
        let validator = AntiCheatValidator::new(AntiCheatConfig::standard(60));
        let mut state = AntiCheatState::at(Vec3Fixed::ZERO, 0);
        let candidate = Vec3Fixed::from_meters(200.0, 0.0, 0.0);
        let verdict = validator.validate_movement(&mut state, candidate, 1, false);
        assert_eq!(verdict, MovementVerdict::Teleport);
        // last_valid_pos is untouched on a teleport verdict.
        assert_eq!(state.last_valid_pos, Vec3Fixed::ZERO);
    }

    #[test]
    fn speed_violation_accumulates_strikes_then_trips_threshold() {
        let validator = AntiCheatValidator::new(AntiCheatConfig::standard(60));
        let mut state = AntiCheatState::at(Vec3Fixed::ZERO, 0);
        let too_far = Vec3Fixed::from_meters(0.0, 0.0, 3.0); // exceeds per-tick tolerance, under teleport

        let first = validator.validate_movement(&mut state, too_far, 1, false);
        assert_eq!(first, MovementVerdict::SpeedViolation { strikes_after: 1 });
        let second = validator.validate_movement(&mut state, too_far, 2, false);
        assert_eq!(second, MovementVerdict::SpeedViolation { strikes_after: 2 });
        let third = validator.validate_movement(&mut state, too_far, 3, false);
        assert_eq!(third, MovementVerdict::StrikeThresholdExceeded);
    }

    #[test]
    fn rate_limiter_rejects_past_sixty_per_second() {
        let validator = AntiCheatValidator::new(AntiCheatConfig::standard(60));
        let mut state = AntiCheatState::at(Vec3Fixed::ZERO, 0);
        for tick in 0..60 {
            let verdict = validator.validate_rate(&mut state, tick);
            assert_eq!(verdict, RateVerdict::Accepted);
        }
        let verdict = validator.validate_rate(&mut state, 60);
        assert!(matches!(verdict, RateVerdict::RateLimited { .. }));
    }
}
