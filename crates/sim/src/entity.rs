//! Entity identity: opaque handles over a generation-counted slot table.
//!
//! Systems never hold pointers into component storage; they hold an
//! [`EntityId`] (the 32-bit value that also appears on the wire) and look
//! components up through [`World`]. Back-references that outlive the tick
//! they were recorded on (`CombatState::last_attacker`, migration shadow
//! pointers) use [`EntityRef`], which pairs the id with the generation it was
//! observed at so a stale reference to a freed-and-reused slot is detected
//! rather than silently resolving to the wrong entity.

use std::fmt;

/// Wire-visible entity identifier: the slot index in the world's entity
/// table. Stable for the entity's lifetime; reused (with a bumped
/// generation) once the entity is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u32);

impl EntityId {
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// A weak, liveness-checked reference to an entity: survives across ticks
/// but must be resolved through [`World::resolve`] before use, since the
/// slot may have been freed and reused for an unrelated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub id: EntityId,
    pub generation: u32,
}

impl EntityRef {
    #[must_use]
    pub fn new(id: EntityId, generation: u32) -> Self {
        Self { id, generation }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Generation-counted slot table handing out [`EntityId`]s.
///
/// Spawning reuses the lowest freed slot (stack discipline via `free_list`)
/// so entity ids stay dense, which keeps component-table iteration cache
/// friendly even under high churn.
#[derive(Debug, Default)]
pub struct EntityTable {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl EntityTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh entity id, reusing a freed slot if one exists.
    pub fn spawn(&mut self) -> EntityRef {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            return EntityRef::new(EntityId(index), slot.generation);
        }
        let index = u32::try_from(self.slots.len()).expect("entity table exceeded u32 capacity");
        self.slots.push(Slot {
            generation: 0,
            alive: true,
        });
        EntityRef::new(EntityId(index), 0)
    }

    /// Free `id`, bumping its generation so outstanding [`EntityRef`]s fail
    /// to resolve. A no-op if the id is already dead or unknown.
    pub fn despawn(&mut self, id: EntityId) {
        let Some(slot) = self.slots.get_mut(id.0 as usize) else {
            return;
        };
        if !slot.alive {
            return;
        }
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.0);
    }

    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.slots
            .get(id.0 as usize)
            .is_some_and(|slot| slot.alive)
    }

    #[must_use]
    pub fn generation_of(&self, id: EntityId) -> Option<u32> {
        self.slots.get(id.0 as usize).map(|slot| slot.generation)
    }

    /// Resolve a weak reference, returning `None` if the slot was freed and
    /// (possibly) reused since the reference was recorded.
    #[must_use]
    pub fn resolve(&self, reference: EntityRef) -> Option<EntityId> {
        let slot = self.slots.get(reference.id.0 as usize)?;
        if slot.alive && slot.generation == reference.generation {
            Some(reference.id)
        } else {
            None
        }
    }

    /// All currently live entity ids, in ascending index order.
    pub fn live_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.alive)
            .map(|(index, _)| EntityId(u32::try_from(index).expect("index fits u32")))
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.alive).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_assigns_dense_increasing_ids_when_no_frees() {
        let mut table = EntityTable::new();
        let a = table.spawn();
        let b = table.spawn();
        assert_eq!(a.id, EntityId(0));
        assert_eq!(b.id, EntityId(1));
    }

    #[test]
    fn despawn_then_spawn_reuses_slot_with_bumped_generation() {
        let mut table = EntityTable::new();
        let a = table.spawn();
        table.despawn(a.id);
        let b = table.spawn();

        assert_eq!(a.id, b.id);
        assert_ne!(a.generation, b.generation);
    }

    #[test]
    fn stale_reference_fails_to_resolve_after_reuse() {
        let mut table = EntityTable::new();
        let a = table.spawn();
        table.despawn(a.id);
        let _b = table.spawn();

        assert_eq!(table.resolve(a), None);
    }

    #[test]
    fn live_reference_resolves() {
        let mut table = EntityTable::new();
        let a = table.spawn();
        assert_eq!(table.resolve(a), Some(a.id));
    }

    #[test]
    fn despawn_is_idempotent() {
        let mut table = EntityTable::new();
        let a = table.spawn();
        table.despawn(a.id);
        table.despawn(a.id);
        assert_eq!(table.live_count(), 0);
    }
}
