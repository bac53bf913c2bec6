//! Publishes compact shadow-entity records for entities near a zone
//! edge into the neighbouring zone, so that zone's AOI queries can see
//! them without simulating them.

use meridian_geom::{Fixed, Vec3Fixed};
use meridian_sim::{EntityType, World};
use meridian_wire::ProjectedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    MinX,
    MaxX,
    MinZ,
    MaxZ,
}

/// A zone's axis-aligned footprint in the XZ plane.
#[derive(Debug, Clone, Copy)]
pub struct ZoneBounds {
    pub min_x: Fixed,
    pub max_x: Fixed,
    pub min_z: Fixed,
    pub max_z: Fixed,
}

impl ZoneBounds {
    /// Signed distance from `pos` to `edge`, measured inward (positive
    /// means `pos` is inside the zone, on the near side of that edge).
    #[must_use]
    pub fn distance_to_edge(&self, edge: Edge, pos: Vec3Fixed) -> Fixed {
        match edge {
            Edge::MinX => pos.x - self.min_x,
            Edge::MaxX => self.max_x - pos.x,
            Edge::MinZ => pos.z - self.min_z,
            Edge::MaxZ => self.max_z - pos.z,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NeighborEdge {
    pub neighbor_zone_id: u32,
    pub edge: Edge,
}

fn entity_type_byte(entity_type: EntityType) -> u8 {
    match entity_type {
        EntityType::Player => 0,
        EntityType::Npc => 1,
        EntityType::Projectile => 2,
        EntityType::Projected => 3,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuraProjector {
    pub buffer: Fixed,
}

impl AuraProjector {
    #[must_use]
    pub fn new(buffer: Fixed) -> Self {
        Self { buffer }
    }

    #[must_use]
    pub fn standard() -> Self {
        Self::new(Fixed::from_meters_f64(50.0))
    }

    /// Collect every locally-owned entity within `buffer` of `neighbor`'s
    /// edge. Entities already hosted here as someone else's shadow
    /// (`EntityType::Projected`) are never re-projected onward.
    #[must_use]
    pub fn project_for_neighbor(
        &self,
        world: &World,
        bounds: &ZoneBounds,
        neighbor: &NeighborEdge,
    ) -> Vec<ProjectedState> {
        let mut out = Vec::new();
        for (id, position) in world.positions.iter() {
            if matches!(world.entity_types.get(id), Some(EntityType::Projected)) {
                continue;
            }
            let distance = bounds.distance_to_edge(neighbor.edge, position.pos);
            if distance < Fixed::ZERO || distance > self.buffer {
                continue;
            }

            let health_percent = world
                .combat_states
                .get(id)
                .map_or(100, meridian_sim::components::CombatState::health_percent);
            let entity_type = world
                .entity_types
                .get(id)
                .copied()
                .map_or(0, entity_type_byte);

            out.push(ProjectedState {
                entity_id: id.0,
                position: (position.pos.x.raw(), position.pos.y.raw(), position.pos.z.raw()),
                entity_type,
                health_percent,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_sim::components::BoundingVolume;

    fn bounding() -> BoundingVolume {
        BoundingVolume {
            radius: Fixed::from_meters_f64(0.5),
            height: Fixed::from_meters_f64(1.8),
        }
    }

    fn bounds() -> ZoneBounds {
        ZoneBounds {
            min_x: Fixed::ZERO,
            max_x: Fixed::from_meters_f64(200.0),
            min_z: Fixed::ZERO,
            max_z: Fixed::from_meters_f64(200.0),
        }
    }

    #[test]
    fn entity_within_buffer_of_edge_is_projected() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        world.spawn(EntityType::Player, Vec3Fixed::from_meters(195.0, 0.0, 100.0), bounding());

        let projector = AuraProjector::standard();
        let neighbor = NeighborEdge { neighbor_zone_id: 2, edge: Edge::MaxX };
        let projected = projector.project_for_neighbor(&world, &bounds(), &neighbor);

        assert_eq!(projected.len(), 1);
    }

    #[test]
    fn entity_far_from_edge_is_not_projected() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        world.spawn(EntityType::Player, Vec3Fixed::from_meters(100.0, 0.0, 100.0), bounding());

        let projector = AuraProjector::standard();
        let neighbor = NeighborEdge { neighbor_zone_id: 2, edge: Edge::MaxX };
        let projected = projector.project_for_neighbor(&world, &bounds(), &neighbor);

        assert!(projected.is_empty());
    }

    #[test]
    fn shadow_entities_are_never_reprojected() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        world.spawn(EntityType::Projected, Vec3Fixed::from_meters(195.0, 0.0, 100.0), bounding());

        let projector = AuraProjector::standard();
        let neighbor = NeighborEdge { neighbor_zone_id: 2, edge: Edge::MaxX };
        let projected = projector.project_for_neighbor(&world, &bounds(), &neighbor);

        assert!(projected.is_empty());
    }
}
