//! The source-zone side of inter-zone entity handoff: drives
//! `meridian_sim::components::MigrationState` through its five phases.
//! The destination side never runs this state machine — it only holds a
//! shadow and consults `DestinationLedger` for duplicate suppression.

use meridian_sim::components::{MigrationPhase, MigrationState};

#[derive(Debug, Clone, Copy)]
pub struct MigrationConfig {
    pub timeout_ms: u64,
    pub retry_cooldown_ms: u64,
    pub grace_period_ms: u64,
}

impl MigrationConfig {
    #[must_use]
    pub fn standard() -> Self {
        Self {
            timeout_ms: 500,
            retry_cooldown_ms: 1_000,
            // Not pinned by a binding constant; chosen to comfortably
            // outlast lag-compensated rewinds (MaxRewind=500ms) so a
            // neighbour's AOI query never observes a resurrected handle.
            grace_period_ms: 1_000,
        }
    }
}

/// A side effect the caller (the zone's migration system) must carry
/// out — sending a message on the `CrossZoneBus`, or a purely local
/// bookkeeping note. Modeled as a tagged variant rather than a callback,
/// per the "no virtual dispatch" guidance for hot-path polymorphism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationEffect {
    SendMigrateReq { peer_zone: u32, epoch: u32 },
    SendMigrateState { epoch: u32 },
    RollbackToNormal,
    StopSimulatingKeepShadow,
    DropShadow,
}

/// Stateless; every transition is a pure function of the `MigrationState`
/// component it is given plus the event/clock arguments.
#[derive(Debug, Clone, Copy)]
pub struct MigrationStateMachine {
    config: MigrationConfig,
}

impl MigrationStateMachine {
    #[must_use]
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn standard() -> Self {
        Self::new(MigrationConfig::standard())
    }

    /// Whether a fresh migration attempt may start: the entity must be
    /// `Normal` and past any retry cooldown left by a prior timeout.
    #[must_use]
    pub fn can_begin(&self, state: &MigrationState, now_ms: u64) -> bool {
        state.phase == MigrationPhase::Normal && now_ms >= state.deadline_ms
    }

    /// `Normal -> Notifying`: the entity crossed into a peer zone's inner
    /// boundary.
    pub fn begin(&self, state: &mut MigrationState, peer_zone: u32, now_ms: u64) -> Option<MigrationEffect> {
        if !self.can_begin(state, now_ms) {
            return None;
        }
        state.phase = MigrationPhase::Notifying;
        state.peer_zone = Some(peer_zone);
        state.epoch = state.epoch.wrapping_add(1);
        state.deadline_ms = now_ms + self.config.timeout_ms;
        Some(MigrationEffect::SendMigrateReq {
            peer_zone,
            epoch: state.epoch,
        })
    }

    /// `Notifying -> Migrating`: the peer acked. A stale ack (wrong
    /// epoch, or arriving after rollback) is silently ignored.
    pub fn on_peer_ack(&self, state: &mut MigrationState, epoch: u32, now_ms: u64) -> Option<MigrationEffect> {
        if state.phase != MigrationPhase::Notifying || state.epoch != epoch {
            return None;
        }
        state.phase = MigrationPhase::Migrating;
        state.deadline_ms = now_ms + self.config.timeout_ms;
        Some(MigrationEffect::SendMigrateState { epoch })
    }

    /// `Migrating -> HandedOff`: the peer confirmed it applied the full
    /// state. Simulation stops locally; the shadow is kept for the grace
    /// period in case of in-flight lag-compensated rewinds.
    pub fn on_peer_applied(&self, state: &mut MigrationState, epoch: u32, now_ms: u64) -> Option<MigrationEffect> {
        if state.phase != MigrationPhase::Migrating || state.epoch != epoch {
            return None;
        }
        state.phase = MigrationPhase::HandedOff;
        state.deadline_ms = now_ms + self.config.grace_period_ms;
        Some(MigrationEffect::StopSimulatingKeepShadow)
    }

    /// Call once per tick for every entity whose phase is not `Normal`:
    /// rolls `Notifying`/`Migrating` back to `Normal` on timeout, and
    /// advances `HandedOff` to the terminal `Cleanup` once the grace
    /// period elapses.
    pub fn poll_deadline(&self, state: &mut MigrationState, now_ms: u64) -> Option<MigrationEffect> {
        match state.phase {
            MigrationPhase::Notifying | MigrationPhase::Migrating if now_ms >= state.deadline_ms => {
                state.phase = MigrationPhase::Normal;
                state.peer_zone = None;
                state.deadline_ms = now_ms + self.config.retry_cooldown_ms;
                Some(MigrationEffect::RollbackToNormal)
            }
            MigrationPhase::HandedOff if now_ms >= state.deadline_ms => {
                state.phase = MigrationPhase::Cleanup;
                Some(MigrationEffect::DropShadow)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal() -> MigrationState {
        MigrationState::default()
    }

    #[test]
    fn happy_path_walks_every_phase() {
        let machine = MigrationStateMachine::standard();
        let mut state = normal();

        let effect = machine.begin(&mut state, 2, 0).unwrap();
        assert_eq!(state.phase, MigrationPhase::Notifying);
        assert_eq!(effect, MigrationEffect::SendMigrateReq { peer_zone: 2, epoch: 1 });

        let effect = machine.on_peer_ack(&mut state, 1, 10).unwrap();
        assert_eq!(state.phase, MigrationPhase::Migrating);
        assert_eq!(effect, MigrationEffect::SendMigrateState { epoch: 1 });

        let effect = machine.on_peer_applied(&mut state, 1, 20).unwrap();
        assert_eq!(state.phase, MigrationPhase::HandedOff);
        assert_eq!(effect, MigrationEffect::StopSimulatingKeepShadow);

        let effect = machine.poll_deadline(&mut state, state.deadline_ms).unwrap();
        assert_eq!(state.phase, MigrationPhase::Cleanup);
        assert_eq!(effect, MigrationEffect::DropShadow);
    }

    #[test]
    fn notifying_times_out_back_to_normal_with_cooldown() {
        let machine = MigrationStateMachine::standard();
        let mut state = normal();
        machine.begin(&mut state, 2, 0).unwrap();

        let effect = machine.poll_deadline(&mut state, 500).unwrap();
        assert_eq!(state.phase, MigrationPhase::Normal);
        assert_eq!(effect, MigrationEffect::RollbackToNormal);
        assert!(!machine.can_begin(&state, 500));
        assert!(machine.can_begin(&state, 1_500));
    }

    #[test]
    fn migrating_times_out_back_to_normal() {
        let machine = MigrationStateMachine::standard();
        let mut state = normal();
        machine.begin(&mut state, 2, 0).unwrap();
        machine.on_peer_ack(&mut state, 1, 10).unwrap();

        let effect = machine.poll_deadline(&mut state, 10 + 500).unwrap();
        assert_eq!(state.phase, MigrationPhase::Normal);
        assert_eq!(effect, MigrationEffect::RollbackToNormal);
    }

    #[test]
    fn stale_epoch_ack_is_ignored() {
        let machine = MigrationStateMachine::standard();
        let mut state = normal();
        machine.begin(&mut state, 2, 0).unwrap();

        assert!(machine.on_peer_ack(&mut state, 999, 10).is_none());
        assert_eq!(state.phase, MigrationPhase::Notifying);
    }

    #[test]
    fn cannot_begin_while_not_normal() {
        let machine = MigrationStateMachine::standard();
        let mut state = normal();
        machine.begin(&mut state, 2, 0).unwrap();
        assert!(machine.begin(&mut state, 3, 1).is_none());
    }

    #[test]
    fn duplicate_applied_after_handoff_is_ignored() {
        let machine = MigrationStateMachine::standard();
        let mut state = normal();
        machine.begin(&mut state, 2, 0).unwrap();
        machine.on_peer_ack(&mut state, 1, 10).unwrap();
        machine.on_peer_applied(&mut state, 1, 20).unwrap();

        assert!(machine.on_peer_applied(&mut state, 1, 30).is_none());
        assert_eq!(state.phase, MigrationPhase::HandedOff);
    }
}
