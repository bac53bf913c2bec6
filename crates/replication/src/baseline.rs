//! Per-connection baseline tracking: which tick's entity state a
//! connection last acknowledged, so `SnapshotBuilder` knows what to diff
//! against.

use std::collections::{HashMap, VecDeque};

use meridian_sim::EntityId;

/// The absolute, server-authoritative values a `Snapshot`'s delta fields
/// are computed against. One per entity, per connection, per tracked
/// tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityRecord {
    pub position: (i64, i64, i64),
    pub rotation: (f64, f64),
    pub velocity: (i64, i64, i64),
    pub health_percent: u8,
    pub anim_state: u8,
    pub entity_type: u8,
}

type ConnectionId = u64;

struct PendingSnapshot {
    tick: u32,
    records: HashMap<EntityId, EntityRecord>,
}

/// Bounds how many unacked snapshots are retained per connection before
/// the oldest is dropped; a connection that never acks degrades to
/// full-entity snapshots once its pending window empties, rather than
/// growing unbounded.
const PENDING_WINDOW: usize = 64;

#[derive(Default)]
pub struct BaselineCache {
    pending: HashMap<ConnectionId, VecDeque<PendingSnapshot>>,
    current: HashMap<ConnectionId, (u32, HashMap<EntityId, EntityRecord>)>,
}

impl BaselineCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The connection's current acknowledged baseline tick, or `0` if it
    /// has none yet (every entity is then `NEW_ENTITY`).
    #[must_use]
    pub fn baseline_tick(&self, connection_id: ConnectionId) -> u32 {
        self.current.get(&connection_id).map_or(0, |(tick, _)| *tick)
    }

    #[must_use]
    pub fn baseline_records(&self, connection_id: ConnectionId) -> Option<&HashMap<EntityId, EntityRecord>> {
        self.current.get(&connection_id).map(|(_, records)| records)
    }

    /// Record a snapshot just sent at `tick`, so a later ack of `tick`
    /// can promote it to the current baseline.
    pub fn record_sent(&mut self, connection_id: ConnectionId, tick: u32, records: HashMap<EntityId, EntityRecord>) {
        let queue = self.pending.entry(connection_id).or_default();
        queue.push_back(PendingSnapshot { tick, records });
        while queue.len() > PENDING_WINDOW {
            queue.pop_front();
        }
    }

    /// Advance the connection's baseline to `acked_tick`, dropping every
    /// pending snapshot at or before it. Returns `false` on
    /// `BaselineMismatch` (the acked tick is not among those retained) —
    /// the caller must then `reset` the connection so the next snapshot
    /// downgrades every visible entity to `NEW_ENTITY`.
    pub fn ack(&mut self, connection_id: ConnectionId, acked_tick: u32) -> bool {
        let Some(queue) = self.pending.get_mut(&connection_id) else {
            return false;
        };

        let mut found = None;
        while let Some(front) = queue.front() {
            if front.tick > acked_tick {
                break;
            }
            let popped = queue.pop_front().unwrap();
            if popped.tick == acked_tick {
                found = Some(popped);
            }
        }

        match found {
            Some(snapshot) => {
                self.current.insert(connection_id, (snapshot.tick, snapshot.records));
                true
            }
            None => false,
        }
    }

    /// Drop all baseline state for a connection: the next snapshot built
    /// for it will treat every visible entity as new.
    pub fn reset(&mut self, connection_id: ConnectionId) {
        self.pending.remove(&connection_id);
        self.current.remove(&connection_id);
    }

    pub fn remove_connection(&mut self, connection_id: ConnectionId) {
        self.reset(connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x: i64) -> EntityRecord {
        EntityRecord {
            position: (x, 0, 0),
            rotation: (0.0, 0.0),
            velocity: (0, 0, 0),
            health_percent: 100,
            anim_state: 0,
            entity_type: 0,
        }
    }

    #[test]
    fn unacked_connection_has_no_baseline() {
        let cache = BaselineCache::new();
        assert_eq!(cache.baseline_tick(1), 0);
        assert!(cache.baseline_records(1).is_none());
    }

    #[test]
    fn ack_promotes_matching_pending_snapshot() {
        let mut cache = BaselineCache::new();
        let mut records = HashMap::new();
        records.insert(EntityId(0), record(10));
        cache.record_sent(1, 5, records);

        assert!(cache.ack(1, 5));
        assert_eq!(cache.baseline_tick(1), 5);
        assert!(cache.baseline_records(1).unwrap().contains_key(&EntityId(0)));
    }

    #[test]
    fn ack_drops_older_pending_snapshots() {
        let mut cache = BaselineCache::new();
        cache.record_sent(1, 1, HashMap::new());
        cache.record_sent(1, 2, HashMap::new());
        cache.record_sent(1, 3, HashMap::new());

        assert!(cache.ack(1, 2));
        assert_eq!(cache.baseline_tick(1), 2);
        // Tick 1 was dropped as stale, tick 3 remains pending for a later ack.
        assert!(!cache.ack(1, 1));
    }

    #[test]
    fn ack_of_unknown_tick_is_a_mismatch() {
        let mut cache = BaselineCache::new();
        cache.record_sent(1, 5, HashMap::new());
        assert!(!cache.ack(1, 999));
    }

    #[test]
    fn reset_clears_both_pending_and_current() {
        let mut cache = BaselineCache::new();
        cache.record_sent(1, 5, HashMap::new());
        cache.ack(1, 5);
        cache.reset(1);
        assert_eq!(cache.baseline_tick(1), 0);
        assert!(!cache.ack(1, 5));
    }
}
