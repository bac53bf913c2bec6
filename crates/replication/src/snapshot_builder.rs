//! Assembles a `meridian_wire::Snapshot` for one connection from the
//! current world state and its `BaselineCache` entry.

use std::collections::HashMap;

use meridian_sim::{EntityId, World};
use meridian_wire::{EntityDelta, Snapshot};

use crate::baseline::EntityRecord;

/// Server-side animation state is not simulated (content/rendering is
/// explicitly out of scope) — this is a cheap best-effort hint derived
/// from combat/velocity state for the client's own renderer.
fn derive_anim_state(world: &World, id: EntityId) -> u8 {
    if let Some(combat) = world.combat_states.get(id) {
        if combat.is_dead {
            return 2;
        }
    }
    match world.velocities.get(id) {
        Some(velocity) if !velocity.v.x.is_zero() || !velocity.v.z.is_zero() => 1,
        _ => 0,
    }
}

fn health_percent_of(world: &World, id: EntityId) -> u8 {
    world
        .combat_states
        .get(id)
        .map_or(100, meridian_sim::components::CombatState::health_percent)
}

fn entity_type_byte(world: &World, id: EntityId) -> u8 {
    match world.entity_types.get(id) {
        Some(meridian_sim::EntityType::Player) => 0,
        Some(meridian_sim::EntityType::Npc) => 1,
        Some(meridian_sim::EntityType::Projectile) => 2,
        Some(meridian_sim::EntityType::Projected) => 3,
        None => 0,
    }
}

fn current_record(world: &World, id: EntityId) -> Option<EntityRecord> {
    let position = world.positions.get(id)?;
    let velocity = world.velocities.get(id).map_or((0, 0, 0), |v| {
        (v.v.x.raw(), v.v.y.raw(), v.v.z.raw())
    });
    let rotation = world
        .rotations
        .get(id)
        .map_or((0.0, 0.0), |r| (r.yaw, r.pitch));

    Some(EntityRecord {
        position: (position.pos.x.raw(), position.pos.y.raw(), position.pos.z.raw()),
        rotation,
        velocity,
        health_percent: health_percent_of(world, id),
        anim_state: derive_anim_state(world, id),
        entity_type: entity_type_byte(world, id),
    })
}

/// Stateless; every call is a pure function of its arguments, matching
/// `CombatResolver`'s shape in the simulation crate.
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build a snapshot for `visible` entities against `baseline`
    /// (`None` means the connection holds no baseline — everything is
    /// `NEW_ENTITY`). Returns the snapshot alongside the full record set
    /// to retain as a pending baseline candidate for a future ack.
    #[must_use]
    pub fn build(
        &self,
        world: &World,
        visible: &[EntityId],
        baseline: Option<&HashMap<EntityId, EntityRecord>>,
        server_tick: u32,
        baseline_tick: u32,
    ) -> (Snapshot, HashMap<EntityId, EntityRecord>) {
        let mut entities = Vec::new();
        let mut current_records = HashMap::new();

        for &id in visible {
            let Some(current) = current_record(world, id) else {
                continue;
            };
            current_records.insert(id, current);

            match baseline.and_then(|b| b.get(&id)) {
                None => {
                    entities.push(EntityDelta::new_entity(
                        id.0,
                        current.position,
                        current.rotation,
                        current.velocity,
                        current.health_percent,
                        current.anim_state,
                        current.entity_type,
                    ));
                }
                Some(prior) => {
                    let position_delta = delta_if_changed(prior.position, current.position);
                    let velocity_delta = delta_if_changed(prior.velocity, current.velocity);
                    let rotation = rotation_if_changed(prior.rotation, current.rotation);
                    let health_percent = (prior.health_percent != current.health_percent)
                        .then_some(current.health_percent);
                    let anim_state = (prior.anim_state != current.anim_state).then_some(current.anim_state);

                    if position_delta.is_none()
                        && velocity_delta.is_none()
                        && rotation.is_none()
                        && health_percent.is_none()
                        && anim_state.is_none()
                    {
                        continue;
                    }

                    entities.push(EntityDelta::changed(
                        id.0,
                        position_delta,
                        rotation,
                        velocity_delta,
                        health_percent,
                        anim_state,
                    ));
                }
            }
        }

        let removed = baseline
            .map(|b| {
                b.keys()
                    .filter(|id| !visible.contains(id))
                    .map(|id| id.0)
                    .collect()
            })
            .unwrap_or_default();

        let snapshot = Snapshot {
            server_tick,
            baseline_tick,
            entities,
            removed,
        };

        (snapshot, current_records)
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn delta_if_changed(prior: (i64, i64, i64), current: (i64, i64, i64)) -> Option<(i64, i64, i64)> {
    let delta = (current.0 - prior.0, current.1 - prior.1, current.2 - prior.2);
    (delta != (0, 0, 0)).then_some(delta)
}

fn rotation_if_changed(prior: (f64, f64), current: (f64, f64)) -> Option<(f64, f64)> {
    const EPSILON: f64 = 1e-3;
    let changed = (prior.0 - current.0).abs() > EPSILON || (prior.1 - current.1).abs() > EPSILON;
    changed.then_some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_geom::{Fixed, Vec3Fixed};
    use meridian_sim::components::BoundingVolume;
    use meridian_sim::EntityType;

    fn bounding() -> BoundingVolume {
        BoundingVolume {
            radius: Fixed::from_meters_f64(0.5),
            height: Fixed::from_meters_f64(1.8),
        }
    }

    #[test]
    fn entity_absent_from_baseline_is_a_new_entity() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        let id = world.spawn(EntityType::Player, Vec3Fixed::from_meters(1.0, 0.0, 1.0), bounding());

        let builder = SnapshotBuilder::new();
        let (snapshot, records) = builder.build(&world, &[id], None, 10, 0);

        assert_eq!(snapshot.entities.len(), 1);
        assert!(snapshot.entities[0].entity_type.is_some());
        assert!(records.contains_key(&id));
    }

    #[test]
    fn unchanged_entity_is_omitted_from_the_delta() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        let id = world.spawn(EntityType::Player, Vec3Fixed::from_meters(1.0, 0.0, 1.0), bounding());

        let builder = SnapshotBuilder::new();
        let (_, baseline_records) = builder.build(&world, &[id], None, 10, 0);
        let (snapshot, _) = builder.build(&world, &[id], Some(&baseline_records), 11, 10);

        assert!(snapshot.entities.is_empty());
    }

    #[test]
    fn moved_entity_produces_a_position_delta() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        let id = world.spawn(EntityType::Player, Vec3Fixed::ZERO, bounding());

        let builder = SnapshotBuilder::new();
        let (_, baseline_records) = builder.build(&world, &[id], None, 10, 0);

        world.positions.get_mut(id).unwrap().pos = Vec3Fixed::from_meters(1.0, 0.0, 0.0);
        let (snapshot, _) = builder.build(&world, &[id], Some(&baseline_records), 11, 10);

        assert_eq!(snapshot.entities.len(), 1);
        assert!(snapshot.entities[0].position_delta.is_some());
        assert!(snapshot.entities[0].entity_type.is_none());
    }

    #[test]
    fn entity_no_longer_visible_is_removed() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        let id = world.spawn(EntityType::Player, Vec3Fixed::ZERO, bounding());

        let builder = SnapshotBuilder::new();
        let (_, baseline_records) = builder.build(&world, &[id], None, 10, 0);
        let (snapshot, _) = builder.build(&world, &[], Some(&baseline_records), 11, 10);

        assert_eq!(snapshot.removed, vec![id.0]);
    }
}
