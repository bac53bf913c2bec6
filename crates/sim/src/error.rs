//! Simulation-path error types.
//!
//! Every variant here is handled per-entity: a bad input or a failed
//! resolve never aborts the tick for anyone else. `meridian-server` is the
//! only place these get mapped onto connection-level consequences
//! (strikes, disconnects).

use crate::entity::EntityId;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    #[error("entity {0} has no such component")]
    MissingComponent(EntityId),

    #[error("entity reference is stale (slot freed or reused)")]
    StaleReference,

    #[error("rewind requested for tick {requested}, older than the retained window back to {oldest}")]
    RewindTooOld { requested: u32, oldest: u32 },

    #[error("combat validation rejected: {0:?}")]
    CombatRejected(CombatRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatRejection {
    AttackTickOutOfWindow,
    AttackerDeadAtAttackTick,
    TargetDeadAtAttackTick,
    SameTeam,
    OutOfRange,
    OutOfCone,
    NoRewindData,
}
