//! Destination-zone side of a migration: no state machine runs here,
//! only a record of which `(handle, epoch)` pairs have already been
//! applied, so a retried `MIGRATE_STATE`/`MIGRATE_APPLIED` pair can
//! never double-spawn or double-free an entity.

use std::collections::{HashMap, HashSet};

use meridian_wire::EntityHandle;

/// Bounds how many entities' migration history a destination zone
/// retains. Entries are evicted oldest-first once the ledger is full,
/// mirroring `InMemoryCrossZoneBus`'s bound on its `seen` set — a
/// destination that never hears from a source again doesn't need to
/// remember it forever.
const MAX_TRACKED_ENTITIES: usize = 8192;

/// Tracks, per migrating entity handle, the highest epoch already
/// applied and the full set of epochs seen, so a duplicate
/// `MIGRATE_APPLIED` (same handle, same epoch, redelivered by an
/// at-least-once bus) is recognized and discarded rather than reapplied.
#[derive(Default)]
pub struct DestinationLedger {
    applied: HashMap<EntityHandle, HashSet<u32>>,
    order: std::collections::VecDeque<EntityHandle>,
}

impl DestinationLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `(handle, epoch)` has already been applied.
    #[must_use]
    pub fn already_applied(&self, handle: EntityHandle, epoch: u32) -> bool {
        self.applied.get(&handle).is_some_and(|epochs| epochs.contains(&epoch))
    }

    /// Record that `(handle, epoch)` has now been applied. Returns
    /// `true` if this is the first time this pair was seen (the caller
    /// should actually spawn/apply the state), `false` if it was already
    /// recorded (the caller must discard the message as a duplicate).
    pub fn record_applied(&mut self, handle: EntityHandle, epoch: u32) -> bool {
        let epochs = self.applied.entry(handle).or_default();
        let first_time = epochs.insert(epoch);
        if first_time {
            self.order.push_back(handle);
            self.evict_if_over_capacity();
        }
        first_time
    }

    /// Drop all history for a handle, once its grace period has elapsed
    /// and the shadow has been freed — nothing will ever migrate it in
    /// again under the same handle, since the generation counter will
    /// differ on reuse.
    pub fn forget(&mut self, handle: EntityHandle) {
        self.applied.remove(&handle);
    }

    fn evict_if_over_capacity(&mut self) {
        while self.applied.len() > MAX_TRACKED_ENTITIES {
            if let Some(oldest) = self.order.pop_front() {
                self.applied.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> EntityHandle {
        EntityHandle { index: 7, generation: 2 }
    }

    #[test]
    fn first_applied_pair_is_not_a_duplicate() {
        let mut ledger = DestinationLedger::new();
        assert!(!ledger.already_applied(handle(), 1));
        assert!(ledger.record_applied(handle(), 1));
    }

    #[test]
    fn repeated_applied_for_same_epoch_is_a_duplicate() {
        let mut ledger = DestinationLedger::new();
        ledger.record_applied(handle(), 1);
        assert!(ledger.already_applied(handle(), 1));
        assert!(!ledger.record_applied(handle(), 1));
    }

    #[test]
    fn a_later_epoch_for_the_same_handle_is_not_a_duplicate() {
        let mut ledger = DestinationLedger::new();
        ledger.record_applied(handle(), 1);
        assert!(!ledger.already_applied(handle(), 2));
        assert!(ledger.record_applied(handle(), 2));
    }

    #[test]
    fn forget_clears_history_for_a_handle() {
        let mut ledger = DestinationLedger::new();
        ledger.record_applied(handle(), 1);
        ledger.forget(handle());
        assert!(!ledger.already_applied(handle(), 1));
    }
}
