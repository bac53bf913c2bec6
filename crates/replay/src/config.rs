//! Fixed configuration a replay was recorded under. Recorded verbatim
//! into the artifact so `verify_replay` can reconstruct an identical
//! `World` without any side channel back to the live server.

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    pub zone_id: u32,
    pub tick_rate_hz: u32,
    /// Spatial hash cell size, in meters, the zone was built with.
    pub spatial_cell_size_m: f64,
    pub test_mode: bool,
    /// Entity ids singled out for scenario assertions in test mode; empty
    /// outside tests.
    pub test_entity_ids: Vec<u32>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            zone_id: 0,
            tick_rate_hz: 60,
            spatial_cell_size_m: 10.0,
            test_mode: false,
            test_entity_ids: Vec::new(),
        }
    }
}
