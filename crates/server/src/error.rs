//! Zone-level error kinds: everything the simulation/wire crates keep
//! per-entity or per-frame gets mapped here onto per-connection or
//! process-fatal consequences. Only [`ZoneError::FatalInit`] ever
//! terminates the process; every other variant is handled and logged
//! without aborting the tick it was raised on.

use meridian_sim::EntityId;

use crate::net::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
    #[error("connection {0} failed the handshake: protocol version mismatch")]
    ProtocolMismatch(ConnectionId),

    #[error("connection {0} sent a malformed frame: {reason}")]
    Malformed { connection: ConnectionId, reason: String },

    #[error("connection {0} is not authenticated")]
    Unauthenticated(ConnectionId),

    #[error("connection {0} is banned")]
    Banned(ConnectionId),

    #[error("entity {entity} accumulated {strikes} anti-cheat strikes; kicking connection {connection}")]
    AntiCheatViolation {
        connection: ConnectionId,
        entity: EntityId,
        strikes: u32,
    },

    #[error("connection {0} exceeded its input rate; packet dropped")]
    RateLimited(ConnectionId),

    #[error("connection {0} acked a baseline tick the server no longer holds")]
    BaselineMismatch(ConnectionId),

    #[error("migration of entity {entity} to zone {peer_zone} timed out")]
    MigrationTimeout { entity: EntityId, peer_zone: u32 },

    #[error("cross-zone channel to zone {dest_zone_id} overflowed; non-migration traffic suppressed")]
    CrossZoneOverflow { dest_zone_id: u32 },

    #[error("tick {tick} overran its budget ({actual_micros}us > {budget_micros}us)")]
    TickOverrun {
        tick: u32,
        actual_micros: u64,
        budget_micros: u64,
    },

    #[error("fatal initialization failure: {0}")]
    FatalInit(String),
}

impl ZoneError {
    /// Process exit code per spec §6: 0 clean, 1 init failure, 2 fatal
    /// runtime. Only [`Self::FatalInit`] is reachable from `main`'s
    /// startup path; every other variant is handled inline and never
    /// escapes to the top level.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::FatalInit(_) => 1,
            _ => 2,
        }
    }
}
