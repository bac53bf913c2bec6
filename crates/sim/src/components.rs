//! Component value types stored in [`crate::world::World`]'s per-kind tables.
//!
//! Components are plain data, no behaviour — systems in `movement`,
//! `anticheat`, `lag_compensation`, and `combat` are the only code that
//! mutates them, each owning exactly the fields its doc comment claims.

use std::collections::VecDeque;

use meridian_geom::{Fixed, Vec3Fixed};

use crate::entity::EntityRef;

/// World-space position, stamped with the tick it was written on.
///
/// Overwritten every tick by [`crate::movement::MovementSystem`]; nothing
/// else is permitted to write `pos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub pos: Vec3Fixed,
    pub tick: u32,
}

/// Per-tick velocity (not per-second — already scaled by the fixed
/// timestep), mutated only by `MovementSystem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Velocity {
    pub v: Vec3Fixed,
}

/// Facing, in radians. `yaw` wraps to `[-pi, pi]`; `pitch` clamps to
/// `[-pi/2, pi/2]`. Floating point is acceptable here — rotation never feeds
/// back into position determinism directly, only through the unit direction
/// vectors `geom::Dir2` derives from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub yaw: f64,
    pub pitch: f64,
}

/// Macro producing a minimal bitflags-style newtype without pulling in the
/// `bitflags` crate for a single byte's worth of flags.
macro_rules! bitflags_like_input {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(pub $repr);

        impl $name {
            $(pub const $flag: $repr = $value;)*

            #[must_use]
            pub fn contains(self, flag: $repr) -> bool {
                self.0 & flag == flag
            }
        }
    };
}

bitflags_like_input! {
    /// Bit flags packed into the wire `inputFlags` byte.
    pub struct InputFlags: u8 {
        const FORWARD = 0b0000_0001;
        const BACK    = 0b0000_0010;
        const LEFT    = 0b0000_0100;
        const RIGHT   = 0b0000_1000;
        const JUMP    = 0b0001_0000;
        const SPRINT  = 0b0010_0000;
        const ATTACK  = 0b0100_0000;
    }
}

/// The most recently received input for a controlled entity, replaced
/// wholesale on each accepted packet. `seq` must strictly increase per
/// connection; enforced by `AntiCheatValidator`, not here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputState {
    pub flags: InputFlags,
    pub yaw: f64,
    pub pitch: f64,
    pub seq: u32,
    pub client_tick_ms: u32,
}

/// Health/team bookkeeping, mutated by `CombatResolver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatState {
    pub hp: i32,
    pub max_hp: i32,
    pub team: u8,
    pub last_attacker: Option<EntityRef>,
    pub last_attack_tick: u32,
    pub is_dead: bool,
}

impl CombatState {
    #[must_use]
    pub fn full_health(max_hp: i32, team: u8) -> Self {
        Self {
            hp: max_hp,
            max_hp,
            team,
            last_attacker: None,
            last_attack_tick: 0,
            is_dead: false,
        }
    }

    /// Health expressed as a percentage in `0..=100`, the form the wire
    /// format carries (one byte rather than a full integer field).
    #[must_use]
    pub fn health_percent(&self) -> u8 {
        if self.max_hp <= 0 {
            return 0;
        }
        let pct = (i64::from(self.hp) * 100) / i64::from(self.max_hp);
        pct.clamp(0, 100) as u8
    }
}

/// The grid cell `SpatialHash` currently files this entity under.
/// Maintained exclusively by `SpatialHash`/`BroadPhase::rebuild`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialCell {
    pub cx: i64,
    pub cz: i64,
    pub zone_id: u32,
}

/// Collision/query footprint. Immutable once an entity is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingVolume {
    pub radius: Fixed,
    pub height: Fixed,
}

/// Rolling window used for the per-connection input-rate check: a tick
/// number is pushed per accepted input and entries older than one second
/// are evicted before counting.
#[derive(Debug, Clone, Default)]
pub struct AntiCheatState {
    pub last_valid_pos: Vec3Fixed,
    pub last_valid_tick: u32,
    pub strikes: u32,
    pub max_observed_speed: Fixed,
    pub input_window: VecDeque<u32>,
}

impl AntiCheatState {
    #[must_use]
    pub fn at(pos: Vec3Fixed, tick: u32) -> Self {
        Self {
            last_valid_pos: pos,
            last_valid_tick: tick,
            strikes: 0,
            max_observed_speed: Fixed::from_raw(0),
            input_window: VecDeque::new(),
        }
    }
}

/// Per-connection network bookkeeping visible to replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    pub connection_id: u64,
    pub last_acked_baseline_tick: u32,
    pub rtt_ms: u32,
    pub loss_permille: u16,
}

/// Identity binding a live entity to the player controlling it. 1:1 between
/// `player_id` and a live entity; destroyed on disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub player_id: u64,
    pub connection_id: u64,
    pub username: String,
}

/// Phase of the inter-zone handoff state machine, see
/// [`crate::migration`]'s counterpart in `meridian-migration` for the
/// transition logic; this is the component the rest of the world reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    Normal,
    Notifying,
    Migrating,
    HandedOff,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationState {
    pub phase: MigrationPhase,
    pub peer_zone: Option<u32>,
    /// Wall-clock deadline in milliseconds since an arbitrary server epoch.
    /// Meaningful only when `phase != Normal`.
    pub deadline_ms: u64,
    /// Monotonic counter bumped on every fresh migration attempt for this
    /// entity, distinguishing a retry from the attempt it replaced so a
    /// stale `MIGRATE_APPLIED` can never be mistaken for the current one.
    pub epoch: u32,
}

impl Default for MigrationState {
    fn default() -> Self {
        Self {
            phase: MigrationPhase::Normal,
            peer_zone: None,
            deadline_ms: 0,
            epoch: 0,
        }
    }
}

/// What kind of thing an entity id names, carried on the wire only when a
/// snapshot introduces a new entity to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Player,
    Npc,
    Projectile,
    /// A read-only aura shadow replicated in from a neighbour zone; never
    /// simulated locally.
    Projected,
}
