//! Runtime configuration: a single `ZoneConfig` constructed once at
//! startup from CLI flags (mirrored by environment variables per §6) and
//! passed by reference to the systems that need it. No global mutable
//! config, per §9.

use clap::Parser;

/// Binding constants from spec §6, not configurable: changing them would
/// change the wire protocol or the simulation's determinism guarantees.
pub const TICK_RATE_HZ: u32 = 60;
pub const TICK_BUDGET_MICROS: u64 = 16_666;
pub const SNAPSHOT_RATE_HZ: u32 = 20;
pub const SPATIAL_CELL_SIZE_M: f64 = 10.0;
pub const AURA_BUFFER_M: f64 = 50.0;
pub const MAX_PLAYERS_PER_ZONE: usize = 400;
pub const MAX_ENTITIES_PER_ZONE: usize = 4000;
pub const LAG_COMPENSATION_HISTORY_MS: u64 = 2000;
pub const MAX_REWIND_MS: u64 = 500;
pub const MAX_TELEPORT_DISTANCE_M: f64 = 100.0;
pub const POSITION_TOLERANCE_M: f64 = 0.5;
pub const SPEED_TOLERANCE_NUMERATOR: i64 = 12;
pub const SPEED_TOLERANCE_DENOMINATOR: i64 = 10;
pub const MAX_INPUTS_PER_SECOND: u32 = 60;
pub const SUSPICIOUS_MOVEMENT_THRESHOLD: u32 = 3;
pub const MAX_RTT_MS: u64 = 300;
pub const MAX_RTT_SUSTAINED_TICKS: u32 = 60;
pub const PLAYER_SAVE_INTERVAL_MS: u64 = 30_000;

/// Not a spec §6 binding constant: the spec names `AuraBuffer` and the AOI
/// far radius (200 m) but never a zone's outer extent. A square
/// `[0, ZONE_EXTENT_M] x [0, ZONE_EXTENT_M]` footprint is this crate's
/// simplifying choice, recorded in DESIGN.md.
pub const ZONE_EXTENT_M: f64 = 1000.0;

/// Command-line interface for the zone server binary. Every flag mirrors
/// an environment variable of the same name (upper-cased, `-` → `_`), per
/// §6 "Environment variables mirror flags".
#[derive(Debug, Clone, Parser)]
#[command(name = "meridian-server", about = "Authoritative zone server")]
pub struct Cli {
    /// Port the unreliable/reliable transport listens on.
    #[arg(long, env = "PORT", default_value_t = 7777)]
    pub port: u16,

    /// This zone's id, used for spatial ownership and cross-zone routing.
    #[arg(long, env = "ZONE_ID")]
    pub zone_id: u32,

    /// Redis host backing `ZoneStore` (persistence is a trait boundary
    /// only in this workspace — see `store.rs`; the flag still exists so
    /// a real deployment's config surface matches this one).
    #[arg(long, env = "REDIS_HOST", default_value = "127.0.0.1")]
    pub redis_host: String,

    #[arg(long, env = "REDIS_PORT", default_value_t = 6379)]
    pub redis_port: u16,

    #[arg(long, env = "SCYLLA_HOST", default_value = "127.0.0.1")]
    pub scylla_host: String,

    #[arg(long, env = "SCYLLA_PORT", default_value_t = 9042)]
    pub scylla_port: u16,

    /// Neighbouring zone ids this zone exchanges migration/aura traffic
    /// with, e.g. `--neighbor-zones 2,3`. Not in the spec's literal flag
    /// list but required for `CrossZoneBus` routing to have a target.
    #[arg(long, env = "NEIGHBOR_ZONES", value_delimiter = ',')]
    pub neighbor_zones: Vec<u32>,
}

/// The resolved configuration a `Zone` is built from. Separate from
/// [`Cli`] so tests can construct one directly without going through argv.
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    pub zone_id: u32,
    pub tick_rate_hz: u32,
    pub tick_budget_micros: u64,
    pub snapshot_rate_hz: u32,
    pub spatial_cell_size_m: f64,
    pub aura_buffer_m: f64,
    pub max_players: usize,
    pub max_entities: usize,
    pub lag_compensation_history_ms: u64,
    pub max_rewind_ms: u64,
    pub max_teleport_distance_m: f64,
    pub max_inputs_per_second: u32,
    pub suspicious_movement_threshold: u32,
    pub max_rtt_ms: u64,
    pub max_rtt_sustained_ticks: u32,
    pub zone_extent_m: f64,
    pub player_save_interval_ms: u64,
    pub neighbor_zones: Vec<u32>,
}

impl ZoneConfig {
    #[must_use]
    pub fn standard(zone_id: u32, neighbor_zones: Vec<u32>) -> Self {
        Self {
            zone_id,
            tick_rate_hz: TICK_RATE_HZ,
            tick_budget_micros: TICK_BUDGET_MICROS,
            snapshot_rate_hz: SNAPSHOT_RATE_HZ,
            spatial_cell_size_m: SPATIAL_CELL_SIZE_M,
            aura_buffer_m: AURA_BUFFER_M,
            max_players: MAX_PLAYERS_PER_ZONE,
            max_entities: MAX_ENTITIES_PER_ZONE,
            lag_compensation_history_ms: LAG_COMPENSATION_HISTORY_MS,
            max_rewind_ms: MAX_REWIND_MS,
            max_teleport_distance_m: MAX_TELEPORT_DISTANCE_M,
            max_inputs_per_second: MAX_INPUTS_PER_SECOND,
            suspicious_movement_threshold: SUSPICIOUS_MOVEMENT_THRESHOLD,
            max_rtt_ms: MAX_RTT_MS,
            max_rtt_sustained_ticks: MAX_RTT_SUSTAINED_TICKS,
            zone_extent_m: ZONE_EXTENT_M,
            player_save_interval_ms: PLAYER_SAVE_INTERVAL_MS,
            neighbor_zones,
        }
    }

    /// Startup sanity checks that have nothing to do with parsing flags:
    /// a zone can't neighbour itself (that would hand migrating entities
    /// straight back to the zone they just left) and a neighbour id can't
    /// be listed twice (it would silently claim two of the four cycled
    /// edges, per `edge_for_index` in `zone.rs`, for the same peer).
    pub fn validate(&self) -> Result<(), crate::error::ZoneError> {
        if self.neighbor_zones.contains(&self.zone_id) {
            return Err(crate::error::ZoneError::FatalInit(format!(
                "zone {} lists itself in --neighbor-zones",
                self.zone_id
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for &neighbor in &self.neighbor_zones {
            if !seen.insert(neighbor) {
                return Err(crate::error::ZoneError::FatalInit(format!(
                    "zone {neighbor} is listed more than once in --neighbor-zones"
                )));
            }
        }
        Ok(())
    }
}

impl From<&Cli> for ZoneConfig {
    fn from(cli: &Cli) -> Self {
        Self::standard(cli.zone_id, cli.neighbor_zones.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_minimal_required_flags() {
        let cli = Cli::parse_from(["meridian-server", "--zone-id", "1"]);
        assert_eq!(cli.zone_id, 1);
        assert_eq!(cli.port, 7777);
        assert!(cli.neighbor_zones.is_empty());
    }

    #[test]
    fn cli_parses_neighbor_zone_list() {
        let cli = Cli::parse_from(["meridian-server", "--zone-id", "1", "--neighbor-zones", "2,3"]);
        assert_eq!(cli.neighbor_zones, vec![2, 3]);
    }

    #[test]
    fn zone_config_from_cli_carries_binding_constants() {
        let cli = Cli::parse_from(["meridian-server", "--zone-id", "5"]);
        let config = ZoneConfig::from(&cli);
        assert_eq!(config.zone_id, 5);
        assert_eq!(config.tick_rate_hz, TICK_RATE_HZ);
        assert_eq!(config.max_rewind_ms, MAX_REWIND_MS);
    }

    #[test]
    fn validate_accepts_distinct_neighbors() {
        let config = ZoneConfig::standard(1, vec![2, 3]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_self_as_neighbor() {
        let config = ZoneConfig::standard(1, vec![1]);
        let error = config.validate().unwrap_err();
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn validate_rejects_duplicate_neighbors() {
        let config = ZoneConfig::standard(1, vec![2, 2]);
        let error = config.validate().unwrap_err();
        assert_eq!(error.exit_code(), 1);
    }
}
