//! Area-of-interest tiering and delta snapshot assembly for the
//! network-facing side of a zone. Reads `meridian_sim::World` state and
//! produces `meridian_wire::Snapshot` frames; never mutates the world.

pub mod aoi;
pub mod baseline;
pub mod snapshot_builder;

pub use aoi::{AoiConfig, AoiManager, AoiTier};
pub use baseline::{BaselineCache, EntityRecord};
pub use snapshot_builder::SnapshotBuilder;
