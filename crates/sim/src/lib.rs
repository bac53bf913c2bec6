//! Deterministic zone simulation core.
//!
//! This crate owns the entity/component world, movement integration,
//! anti-cheat validation, lag-compensated hit resolution, and the state
//! digest used to verify replays. It never touches I/O, a wall clock, or
//! non-deterministic randomness: every system here is a pure function of
//! `World` state plus its inputs, so the same tick sequence produces the
//! same result on every host. Everything network-, clock-, or
//! randomness-shaped lives in `meridian-server` instead.

pub mod anticheat;
pub mod combat;
pub mod components;
pub mod digest;
pub mod entity;
pub mod error;
pub mod lag_compensation;
pub mod movement;
pub mod world;

pub use anticheat::{AntiCheatConfig, AntiCheatValidator, MovementVerdict, RateVerdict};
pub use combat::{AttackDescriptor, AttackMode, CombatEvent, CombatEventKind, CombatResolver};
pub use components::{
    AntiCheatState, BoundingVolume, CombatState, EntityType, InputFlags, InputState,
    MigrationPhase, MigrationState, NetworkState, PlayerInfo, Position, Rotation, SpatialCell,
    Velocity,
};
pub use digest::{canonicalize_f64, Fnv1a64};
pub use entity::{EntityId, EntityRef, EntityTable};
pub use error::{CombatRejection, SimError};
pub use lag_compensation::{LagCompensator, PositionSnapshot};
pub use movement::{MovementConfig, MovementSystem, WorldBounds};
pub use world::{ComponentStore, World};
