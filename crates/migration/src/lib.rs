//! Inter-zone entity handoff: the migration state machine, aura (edge)
//! projection, and the cross-zone message bus they ride on.

pub mod aura;
pub mod cross_zone_bus;
pub mod destination_ledger;
pub mod state_machine;

pub use aura::{AuraProjector, Edge, NeighborEdge, ZoneBounds};
pub use cross_zone_bus::{CrossZoneBus, CrossZoneBusError, InMemoryCrossZoneBus};
pub use destination_ledger::DestinationLedger;
pub use state_machine::{MigrationConfig, MigrationEffect, MigrationStateMachine};
