//! Kinematic movement: direction from input, acceleration toward desired
//! velocity, gravity, integration, and soft-overlap separation.
//!
//! Everything here runs in fixed-point; the only floating point is the
//! transient yaw/pitch rotation math `meridian_geom::Dir2` wraps.

use meridian_geom::{clamp_pitch, normalize_yaw, Dir2, Fixed, Vec3Fixed};

use crate::components::{InputFlags, Position, Velocity};
use crate::entity::EntityId;
use crate::world::World;

/// An axis-aligned box entities may not leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldBounds {
    pub min: Vec3Fixed,
    pub max: Vec3Fixed,
}

impl WorldBounds {
    #[must_use]
    pub fn clamp(&self, p: Vec3Fixed) -> Vec3Fixed {
        Vec3Fixed::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }
}

/// Movement tuning, precomputed into per-tick fixed-point units so the hot
/// loop never divides. Base speed/acceleration/gravity magnitudes are not
/// pinned by a binding constant; the defaults mirror the only concrete
/// movement speed this codebase's lineage specifies (see DESIGN.md).
#[derive(Debug, Clone, Copy)]
pub struct MovementConfig {
    pub tick_rate_hz: u32,
    /// Maximum horizontal speed, already scaled to distance-per-tick.
    pub max_speed_per_tick: Fixed,
    pub sprint_multiplier_numerator: i64,
    pub sprint_multiplier_denominator: i64,
    /// Horizontal acceleration toward the desired velocity, per tick.
    pub acceleration_per_tick: Fixed,
    /// Horizontal deceleration applied when no directional input is held.
    pub deceleration_per_tick: Fixed,
    /// Downward speed added per tick while airborne.
    pub gravity_per_tick: Fixed,
    /// Vertical speed set on a rising jump edge.
    pub jump_impulse_per_tick: Fixed,
    pub bounds: WorldBounds,
    /// Horizontal separation speed applied per tick while two entities
    /// overlap, per meter of penetration.
    pub overlap_push_per_tick: Fixed,
}

impl MovementConfig {
    #[must_use]
    pub fn standard(tick_rate_hz: u32, bounds: WorldBounds) -> Self {
        let per_tick = |meters_per_sec: f64| {
            Fixed::from_meters_f64(meters_per_sec).scale_frac(1, i64::from(tick_rate_hz))
        };
        Self {
            tick_rate_hz,
            max_speed_per_tick: per_tick(5.0),
            sprint_multiplier_numerator: 8,
            sprint_multiplier_denominator: 5, // 1.6x
            acceleration_per_tick: per_tick(40.0),
            deceleration_per_tick: per_tick(60.0),
            gravity_per_tick: per_tick(20.0),
            jump_impulse_per_tick: per_tick(6.0),
            bounds,
            overlap_push_per_tick: per_tick(3.0),
        }
    }

    #[must_use]
    pub fn sprint_cap(&self) -> Fixed {
        self.max_speed_per_tick
            .scale_frac(self.sprint_multiplier_numerator, self.sprint_multiplier_denominator)
    }
}

/// Processes every entity carrying (Position, Velocity); entities that also
/// carry an InputState get the full acceleration/gravity pipeline applied
/// to their velocity first. Entities without InputState (projectiles,
/// externally-driven knockback) integrate whatever velocity they already
/// have, unmodified — there is no player input to accelerate toward.
pub struct MovementSystem {
    pub config: MovementConfig,
}

impl MovementSystem {
    #[must_use]
    pub fn new(config: MovementConfig) -> Self {
        Self { config }
    }

    pub fn step(&self, world: &mut World) {
        let grounded_y = self.config.bounds.min.y;
        let ids: Vec<EntityId> = world.positions.iter().map(|(id, _)| id).collect();

        for id in ids {
            if world.velocities.get(id).is_none() {
                continue;
            }
            if world.input_states.get(id).is_some() {
                self.apply_input_driven_velocity(world, id, grounded_y);
            }
            self.integrate(world, id);
        }

        let overlap_ids = ids_with_bounds(world);
        self.resolve_overlaps(world, &overlap_ids);
    }

    fn apply_input_driven_velocity(&self, world: &mut World, id: EntityId, grounded_y: Fixed) {
        let input = *world.input_states.get(id).expect("checked by caller");
        let position = *world.positions.get(id).expect("checked by caller");
        let velocity = world.velocities.get_mut(id).expect("checked by caller");

        let yaw = normalize_yaw(input.yaw);
        let _pitch = clamp_pitch(input.pitch);

        let forward = i64::from(input.flags.contains(InputFlags::FORWARD))
            - i64::from(input.flags.contains(InputFlags::BACK));
        let strafe = i64::from(input.flags.contains(InputFlags::RIGHT))
            - i64::from(input.flags.contains(InputFlags::LEFT));

        let moving = forward != 0 || strafe != 0;
        let cap = if input.flags.contains(InputFlags::SPRINT) {
            self.config.sprint_cap()
        } else {
            self.config.max_speed_per_tick
        };

        if moving {
            let dir = Dir2::from_yaw_relative(forward as f64, strafe as f64, yaw);
            let (dx, dz) = dir.to_fixed_unit();
            let desired_x = dx.mul_fixed(cap).clamp(-cap, cap);
            let desired_z = dz.mul_fixed(cap).clamp(-cap, cap);
            velocity.v.x = step_toward(velocity.v.x, desired_x, self.config.acceleration_per_tick);
            velocity.v.z = step_toward(velocity.v.z, desired_z, self.config.acceleration_per_tick);
        } else {
            velocity.v.x = step_toward(velocity.v.x, Fixed::from_raw(0), self.config.deceleration_per_tick);
            velocity.v.z = step_toward(velocity.v.z, Fixed::from_raw(0), self.config.deceleration_per_tick);
        }

        let grounded = position.pos.y <= grounded_y;
        if grounded && input.flags.contains(InputFlags::JUMP) {
            velocity.v.y = self.config.jump_impulse_per_tick;
        } else if !grounded {
            velocity.v.y = velocity.v.y - self.config.gravity_per_tick;
        } else {
            velocity.v.y = Fixed::from_raw(0);
        }
    }

    fn integrate(&self, world: &mut World, id: EntityId) {
        let velocity = *world.velocities.get(id).expect("checked by caller");
        let position = world.positions.get_mut(id).expect("checked by caller");
        let next = position.pos.add(velocity.v);
        position.pos = self.config.bounds.clamp(next);
        position.tick = world.tick;
    }

    /// Push apart entities whose bounding cylinders overlap on XZ,
    /// preserving vertical motion. Candidates come from a spatial query at
    /// twice the larger radius, then filtered by exact distance.
    fn resolve_overlaps(&self, world: &mut World, ids: &[EntityId]) {
        for &id in ids {
            let Some(&radius) = world.bounding_volumes.get(id).map(|b| &b.radius) else {
                continue;
            };
            let Some(&pos) = world.positions.get(id).map(|p| &p.pos) else {
                continue;
            };
            let search_radius = radius.scale_frac(2, 1);
            let candidates = world.spatial_hash.query(pos.x, pos.z, search_radius);

            let mut push = Vec3Fixed::ZERO;
            for other in candidates {
                if other == id {
                    continue;
                }
                let Some(&other_radius) = world.bounding_volumes.get(other).map(|b| &b.radius) else {
                    continue;
                };
                let Some(&other_pos) = world.positions.get(other).map(|p| &p.pos) else {
                    continue;
                };
                let min_distance = radius + other_radius;
                let distance = pos.distance_xz(other_pos);
                if distance.raw() > 0 && distance < min_distance {
                    let overlap = min_distance - distance;
                    let dx = pos.x - other_pos.x;
                    let dz = pos.z - other_pos.z;
                    push.x = push.x + dx.scale_frac(overlap.raw(), distance.raw());
                    push.z = push.z + dz.scale_frac(overlap.raw(), distance.raw());
                }
            }

            if !push.x.is_zero() || !push.z.is_zero() {
                let push = push.clamp_length_xz(self.config.overlap_push_per_tick);
                if let Some(position) = world.positions.get_mut(id) {
                    let moved = Vec3Fixed::new(position.pos.x + push.x, position.pos.y, position.pos.z + push.z);
                    position.pos = self.config.bounds.clamp(moved);
                }
            }
        }
    }
}

fn ids_with_bounds(world: &World) -> Vec<EntityId> {
    world
        .positions
        .iter()
        .filter(|(id, _)| world.bounding_volumes.get(*id).is_some())
        .map(|(id, _)| id)
        .collect()
}

fn step_toward(current: Fixed, target: Fixed, max_delta: Fixed) -> Fixed {
    let diff = target - current;
    if diff.abs() <= max_delta {
        target
    } else if diff.raw() > 0 {
        current + max_delta
    } else {
        current - max_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::EntityType;

    fn bounds() -> WorldBounds {
        WorldBounds {
            min: Vec3Fixed::from_meters(-1000.0, 0.0, -1000.0),
            max: Vec3Fixed::from_meters(1000.0, 1000.0, 1000.0),
        }
    }

    #[test]
    fn externally_driven_velocity_integrates_for_sixty_ticks() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        let id = world.spawn(
            EntityType::Player,
            Vec3Fixed::ZERO,
            crate::components::BoundingVolume {
                radius: Fixed::from_meters_f64(0.5),
                height: Fixed::from_meters_f64(1.8),
            },
        );
        let per_tick_z = Fixed::from_meters_f64(5.0).scale_frac(1, 60);
        world.velocities.get_mut(id).unwrap().v.z = per_tick_z;

        let system = MovementSystem::new(MovementConfig::standard(60, bounds()));
        for _ in 0..60 {
            world.tick += 1;
            system.step(&mut world);
        }

        let final_z = world.positions.get(id).unwrap().pos.to_meters_f64().2;
        assert!((4.5..=5.5).contains(&final_z), "final_z={final_z}");
    }

    #[test]
    fn deceleration_brings_unpressed_entity_to_rest() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        let id = world.spawn(
            EntityType::Player,
            Vec3Fixed::ZERO,
            crate::components::BoundingVolume {
                radius: Fixed::from_meters_f64(0.5),
                height: Fixed::from_meters_f64(1.8),
            },
        );
        world.input_states.insert(
            id,
            crate::components::InputState {
                flags: InputFlags::default(),
                yaw: 0.0,
                pitch: 0.0,
                seq: 1,
                client_tick_ms: 0,
            },
        );
        world.velocities.get_mut(id).unwrap().v.x = Fixed::from_meters_f64(1.0).scale_frac(1, 60);

        let system = MovementSystem::new(MovementConfig::standard(60, bounds()));
        for _ in 0..120 {
            world.tick += 1;
            system.step(&mut world);
        }

        assert_eq!(world.velocities.get(id).unwrap().v.x.raw(), 0);
    }
}
