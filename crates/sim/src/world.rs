//! The entity-index + component-table world: the single owner of
//! simulation state for one zone's tick thread.
//!
//! No system holds a pointer into these tables across a system boundary;
//! each system call takes `&mut World` (or a narrower borrow) and reads or
//! writes exactly the component columns its doc comment names.

use meridian_geom::Vec3Fixed;
use meridian_spatial::SpatialHash;

use crate::components::{
    AntiCheatState, BoundingVolume, CombatState, EntityType, InputState, MigrationState,
    NetworkState, PlayerInfo, Position, Rotation, SpatialCell, Velocity,
};
use crate::entity::{EntityId, EntityRef, EntityTable};

/// A dense, index-addressed optional column. Kept in lockstep with
/// `EntityTable`'s slot indices rather than a `HashMap<EntityId, T>` so
/// component access is a bounds-checked array read, not a hash lookup.
#[derive(Debug, Default)]
pub struct ComponentStore<T> {
    slots: Vec<Option<T>>,
}

impl<T> ComponentStore<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn insert(&mut self, id: EntityId, value: T) {
        let index = id.index() as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(value);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        self.slots.get_mut(id.index() as usize)?.take()
    }

    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.slots.get(id.index() as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.slots.get_mut(id.index() as usize)?.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref()
                .map(|v| (EntityId(u32::try_from(i).expect("index fits u32")), v))
        })
    }
}

/// Per-zone simulation state: the entity table plus one column per
/// component kind named in the data model, and the broad-phase spatial
/// index kept in sync with `Position`.
pub struct World {
    pub zone_id: u32,
    pub tick: u32,
    pub entities: EntityTable,
    pub positions: ComponentStore<Position>,
    pub velocities: ComponentStore<Velocity>,
    pub rotations: ComponentStore<Rotation>,
    pub input_states: ComponentStore<InputState>,
    pub combat_states: ComponentStore<CombatState>,
    pub bounding_volumes: ComponentStore<BoundingVolume>,
    pub anticheat_states: ComponentStore<AntiCheatState>,
    pub network_states: ComponentStore<NetworkState>,
    pub player_infos: ComponentStore<PlayerInfo>,
    pub migration_states: ComponentStore<MigrationState>,
    pub entity_types: ComponentStore<EntityType>,
    pub spatial_hash: SpatialHash<EntityId>,
}

impl World {
    #[must_use]
    pub fn new(zone_id: u32, spatial_cell_size: meridian_geom::Fixed) -> Self {
        Self {
            zone_id,
            tick: 0,
            entities: EntityTable::new(),
            positions: ComponentStore::new(),
            velocities: ComponentStore::new(),
            rotations: ComponentStore::new(),
            input_states: ComponentStore::new(),
            combat_states: ComponentStore::new(),
            bounding_volumes: ComponentStore::new(),
            anticheat_states: ComponentStore::new(),
            network_states: ComponentStore::new(),
            player_infos: ComponentStore::new(),
            migration_states: ComponentStore::new(),
            entity_types: ComponentStore::new(),
            spatial_hash: SpatialHash::new(spatial_cell_size),
        }
    }

    /// Spawn a fresh entity at `pos` with the given bounding volume,
    /// registering it in the spatial hash and anti-cheat baseline so it is
    /// valid input for every system from the next tick on.
    pub fn spawn(
        &mut self,
        entity_type: EntityType,
        pos: Vec3Fixed,
        bounding: BoundingVolume,
    ) -> EntityId {
        let entity = self.entities.spawn();
        let id = entity.id;
        self.positions.insert(
            id,
            Position {
                pos,
                tick: self.tick,
            },
        );
        self.velocities.insert(id, Velocity { v: Vec3Fixed::ZERO });
        self.bounding_volumes.insert(id, bounding);
        self.anticheat_states.insert(id, AntiCheatState::at(pos, self.tick));
        self.entity_types.insert(id, entity_type);
        self.spatial_hash.insert(id, pos.x, pos.z);
        id
    }

    /// Destroy an entity and drop every component column's entry for it.
    pub fn despawn(&mut self, id: EntityId) {
        self.entities.despawn(id);
        self.positions.remove(id);
        self.velocities.remove(id);
        self.rotations.remove(id);
        self.input_states.remove(id);
        self.combat_states.remove(id);
        self.bounding_volumes.remove(id);
        self.anticheat_states.remove(id);
        self.network_states.remove(id);
        self.player_infos.remove(id);
        self.migration_states.remove(id);
        self.entity_types.remove(id);
        self.spatial_hash.remove(id);
    }

    #[must_use]
    pub fn resolve(&self, reference: EntityRef) -> Option<EntityId> {
        self.entities.resolve(reference)
    }

    #[must_use]
    pub fn reference_of(&self, id: EntityId) -> Option<EntityRef> {
        self.entities
            .generation_of(id)
            .map(|generation| EntityRef::new(id, generation))
    }

    /// Entities carrying `Position + Velocity + InputState`: the set
    /// `MovementSystem` iterates.
    pub fn controlled_entities(&self) -> Vec<EntityId> {
        self.input_states
            .iter()
            .filter(|(id, _)| self.positions.get(*id).is_some() && self.velocities.get(*id).is_some())
            .map(|(id, _)| id)
            .collect()
    }

    /// Rebuild the spatial hash from current positions. Satisfies the
    /// invariant that every entity with a `Position` has exactly one cell
    /// membership after a rebuild: stale memberships left by entities that
    /// lost their `Position` are implicitly dropped since `clear` discards
    /// all prior bucket contents.
    pub fn rebuild_spatial_hash(&mut self) {
        self.spatial_hash.clear();
        for (id, position) in self.positions.iter() {
            self.spatial_hash.insert(id, position.pos.x, position.pos.z);
        }
    }
}
