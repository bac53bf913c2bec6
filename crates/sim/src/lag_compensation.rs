//! Bounded per-entity position history for rewinding the world to a past
//! tick, so `CombatResolver` can validate an attack against where a target
//! actually was under network delay rather than where it is now.

use std::collections::{HashMap, VecDeque};

use meridian_geom::{Fixed, Vec3Fixed};

use crate::entity::EntityId;
use crate::error::SimError;

/// One retained position sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub tick: u32,
    pub position: Vec3Fixed,
    pub bounding_radius: Fixed,
}

/// Per-entity ring of `PositionSnapshot`s, capped at 120 entries (2 s at
/// 60 Hz) regardless of the configured tick rate's actual window size.
pub struct LagCompensator {
    capacity: usize,
    tick_rate_hz: u32,
    max_rewind_ms: u32,
    history: HashMap<EntityId, VecDeque<PositionSnapshot>>,
}

impl LagCompensator {
    #[must_use]
    pub fn new(tick_rate_hz: u32, max_rewind_ms: u32) -> Self {
        Self {
            capacity: 120,
            tick_rate_hz,
            max_rewind_ms,
            history: HashMap::new(),
        }
    }

    /// Append a sample for `id`, evicting the oldest once the per-entity
    /// ring exceeds capacity.
    pub fn record(&mut self, id: EntityId, tick: u32, position: Vec3Fixed, bounding_radius: Fixed) {
        let ring = self.history.entry(id).or_default();
        ring.push_back(PositionSnapshot {
            tick,
            position,
            bounding_radius,
        });
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    /// Drop all history for a despawned entity.
    pub fn forget(&mut self, id: EntityId) {
        self.history.remove(&id);
    }

    fn ticks_to_ms(&self, ticks: u32) -> u32 {
        ticks.saturating_mul(1000) / self.tick_rate_hz.max(1)
    }

    /// Nearest sample with `tick <= requested`, for `id`. Refuses (without
    /// searching) if `requested` is further than `MaxRewindMs` behind
    /// `now_tick`.
    pub fn rewind(
        &self,
        id: EntityId,
        requested_tick: u32,
        now_tick: u32,
    ) -> Result<PositionSnapshot, SimError> {
        let age_ticks = now_tick.saturating_sub(requested_tick);
        if self.ticks_to_ms(age_ticks) > self.max_rewind_ms {
            return Err(SimError::RewindTooOld {
                requested: requested_tick,
                oldest: now_tick.saturating_sub(self.max_rewind_ticks()),
            });
        }

        let ring = self
            .history
            .get(&id)
            .ok_or(SimError::RewindTooOld {
                requested: requested_tick,
                oldest: now_tick,
            })?;

        ring.iter()
            .rev()
            .find(|snap| snap.tick <= requested_tick)
            .copied()
            .ok_or(SimError::RewindTooOld {
                requested: requested_tick,
                oldest: ring.front().map_or(now_tick, |s| s.tick),
            })
    }

    fn max_rewind_ticks(&self) -> u32 {
        self.max_rewind_ms.saturating_mul(self.tick_rate_hz) / 1000
    }

    /// Rewind every tracked entity to `requested_tick` at once, silently
    /// omitting entities with no sample at-or-before that tick (they simply
    /// didn't exist yet, which is not itself an error for a bulk rewind).
    #[must_use]
    pub fn rewind_all(&self, requested_tick: u32, now_tick: u32) -> HashMap<EntityId, PositionSnapshot> {
        let mut out = HashMap::new();
        for &id in self.history.keys() {
            if let Ok(snapshot) = self.rewind(id, requested_tick, now_tick) {
                out.insert(id, snapshot);
            }
        }
        out
    }
}
