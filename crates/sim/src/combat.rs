//! Melee and projectile hit resolution against lag-compensated positions.
//!
//! Both broad-phase candidate gathering and the precise distance/cone test
//! run against a spatial hash rebuilt from `LagCompensator::rewind_all` at
//! the attack's own tick, not the current one: a target that has since
//! moved away from where the attack landed must still be hit if it was in
//! range at `attack_tick`.

use std::collections::HashMap;

use meridian_geom::{Fixed, Vec3Fixed};
use meridian_spatial::SpatialHash;

use crate::entity::EntityId;
use crate::error::{CombatRejection, SimError};
use crate::lag_compensation::{LagCompensator, PositionSnapshot};
use crate::world::World;

#[derive(Debug, Clone, Copy)]
pub enum AttackMode {
    Melee {
        attacker_pos: Vec3Fixed,
        attacker_yaw: f64,
        range: Fixed,
        cone_half_angle_cos: f64,
    },
    Projectile {
        segment_start: Vec3Fixed,
        segment_end: Vec3Fixed,
        /// Hit-test radius around the segment (weapon/projectile girth).
        radius: Fixed,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct AttackDescriptor {
    pub attacker: EntityId,
    pub attack_tick: u32,
    pub mode: AttackMode,
    pub base_damage: i32,
    pub allow_friendly_fire: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatEventKind {
    Damage,
    Death,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatEvent {
    pub kind: CombatEventKind,
    pub source: EntityId,
    pub target: EntityId,
    pub tick: u32,
    pub amount: i32,
}

/// Stateless: the rewind window is enforced by the `LagCompensator` passed
/// into `resolve`, so there is nothing for this resolver to configure.
#[derive(Debug, Default)]
pub struct CombatResolver;

impl CombatResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolve one attack, applying damage atomically to the target's
    /// present-day `CombatState` on success. Returns every event produced
    /// (zero or more `Damage`, plus a trailing `Death` if the hit killed).
    pub fn resolve(
        &self,
        world: &mut World,
        lag: &LagCompensator,
        descriptor: &AttackDescriptor,
        now_tick: u32,
    ) -> Result<Vec<CombatEvent>, SimError> {
        if descriptor.attack_tick > now_tick {
            return Err(SimError::CombatRejected(CombatRejection::AttackTickOutOfWindow));
        }

        let attacker_alive = world
            .combat_states
            .get(descriptor.attacker)
            .is_some_and(|c| !c.is_dead);
        if !attacker_alive {
            return Err(SimError::CombatRejected(CombatRejection::AttackerDeadAtAttackTick));
        }

        // Broad-phase candidates come from a spatial hash built over
        // *rewound* positions at `attack_tick`, not the current one: a
        // target that has since moved away from where the attack landed
        // must still be reachable by the sweep.
        let rewound = lag.rewind_all(descriptor.attack_tick, now_tick);
        let mut rewound_hash: SpatialHash<EntityId> = SpatialHash::new(world.spatial_hash.cell_size());
        for (&id, snapshot) in &rewound {
            rewound_hash.insert(id, snapshot.position.x, snapshot.position.z);
        }

        let targets = match descriptor.mode {
            AttackMode::Melee {
                attacker_pos,
                attacker_yaw,
                range,
                cone_half_angle_cos,
            } => melee_targets(&rewound_hash, &rewound, attacker_pos, attacker_yaw, range, cone_half_angle_cos),
            AttackMode::Projectile {
                segment_start,
                segment_end,
                radius,
            } => projectile_targets(&rewound_hash, &rewound, segment_start, segment_end, radius),
        };

        let mut events = Vec::new();
        for target in targets {
            if target == descriptor.attacker {
                continue;
            }
            // A rejected or un-rewindable target is contained per-entity: it
            // does not abort resolution of the other candidates in the cone
            // or along the segment.
            if let Ok(mut target_events) = self.apply_hit(world, lag, descriptor, target, now_tick) {
                events.append(&mut target_events);
            }
        }
        Ok(events)
    }

    fn apply_hit(
        &self,
        world: &mut World,
        lag: &LagCompensator,
        descriptor: &AttackDescriptor,
        target: EntityId,
        now_tick: u32,
    ) -> Result<Vec<CombatEvent>, SimError> {
        lag.rewind(target, descriptor.attack_tick, now_tick)?;

        let attacker_team = world
            .combat_states
            .get(descriptor.attacker)
            .map(|c| c.team)
            .ok_or(SimError::CombatRejected(CombatRejection::NoRewindData))?;

        let target_state = world
            .combat_states
            .get(target)
            .ok_or(SimError::CombatRejected(CombatRejection::NoRewindData))?;

        if target_state.is_dead {
            return Err(SimError::CombatRejected(CombatRejection::TargetDeadAtAttackTick));
        }
        if !descriptor.allow_friendly_fire && target_state.team == attacker_team {
            return Err(SimError::CombatRejected(CombatRejection::SameTeam));
        }

        let damage = compute_damage(descriptor.base_damage);
        let attacker_ref = world.reference_of(descriptor.attacker);
        let state = world
            .combat_states
            .get_mut(target)
            .expect("checked present above");
        state.hp = (state.hp - damage).max(0);
        state.last_attacker = attacker_ref;
        state.last_attack_tick = now_tick;
        let died = state.hp == 0 && !state.is_dead;
        if died {
            state.is_dead = true;
        }

        let mut events = vec![CombatEvent {
            kind: CombatEventKind::Damage,
            source: descriptor.attacker,
            target,
            tick: now_tick,
            amount: damage,
        }];
        if died {
            events.push(CombatEvent {
                kind: CombatEventKind::Death,
                source: descriptor.attacker,
                target,
                tick: now_tick,
                amount: 0,
            });
        }
        Ok(events)
    }
}

fn melee_targets(
    rewound_hash: &SpatialHash<EntityId>,
    rewound: &HashMap<EntityId, PositionSnapshot>,
    attacker_pos: Vec3Fixed,
    attacker_yaw: f64,
    range: Fixed,
    cone_half_angle_cos: f64,
) -> Vec<EntityId> {
    let (fx, fz) = (attacker_yaw.sin(), attacker_yaw.cos());
    rewound_hash
        .query(attacker_pos.x, attacker_pos.z, range)
        .into_iter()
        .filter(|candidate| {
            let Some(snapshot) = rewound.get(candidate) else {
                return false;
            };
            let dx = (snapshot.position.x - attacker_pos.x).to_meters_f64();
            let dz = (snapshot.position.z - attacker_pos.z).to_meters_f64();
            let dist = (dx * dx + dz * dz).sqrt();
            if dist < 1e-6 {
                return true;
            }
            let dot = (dx * fx + dz * fz) / dist;
            dot >= cone_half_angle_cos
        })
        .collect()
}

fn projectile_targets(
    rewound_hash: &SpatialHash<EntityId>,
    rewound: &HashMap<EntityId, PositionSnapshot>,
    start: Vec3Fixed,
    end: Vec3Fixed,
    radius: Fixed,
) -> Vec<EntityId> {
    let mid = Vec3Fixed::new(
        Fixed::from_raw((start.x.raw() + end.x.raw()) / 2),
        Fixed::from_raw((start.y.raw() + end.y.raw()) / 2),
        Fixed::from_raw((start.z.raw() + end.z.raw()) / 2),
    );
    let half_len = start.distance(end).scale_frac(1, 2);
    let search_radius = half_len + radius;

    rewound_hash
        .query(mid.x, mid.z, search_radius)
        .into_iter()
        .filter(|candidate| {
            let Some(snapshot) = rewound.get(candidate) else {
                return false;
            };
            perpendicular_distance(start, end, snapshot.position) <= radius
        })
        .collect()
}

/// Damage is a pure function of the attack's declared base damage; team
/// and buff/debuff modifiers are folded into `base_damage` by the caller
/// before the descriptor reaches `CombatResolver`, keeping this resolver's
/// own logic modifier-agnostic.
#[must_use]
pub fn compute_damage(base_damage: i32) -> i32 {
    base_damage.max(0)
}

fn perpendicular_distance(start: Vec3Fixed, end: Vec3Fixed, point: Vec3Fixed) -> Fixed {
    let seg_len_sq = start.distance_sq(end);
    if seg_len_sq == 0 {
        return start.distance(point);
    }
    let to_point = (
        (point.x - start.x).raw(),
        (point.y - start.y).raw(),
        (point.z - start.z).raw(),
    );
    let to_end = (
        (end.x - start.x).raw(),
        (end.y - start.y).raw(),
        (end.z - start.z).raw(),
    );
    let dot = to_point.0 * to_end.0 + to_point.1 * to_end.1 + to_point.2 * to_end.2;
    let t = (dot as f64 / seg_len_sq as f64).clamp(0.0, 1.0);
    let closest = Vec3Fixed::new(
        Fixed::from_raw(start.x.raw() + (to_end.0 as f64 * t) as i64),
        Fixed::from_raw(start.y.raw() + (to_end.1 as f64 * t) as i64),
        Fixed::from_raw(start.z.raw() + (to_end.2 as f64 * t) as i64),
    );
    closest.distance(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{BoundingVolume, CombatState, EntityType};
    use crate::world::World;

    fn spawn_combatant(world: &mut World, pos: Vec3Fixed, team: u8) -> EntityId {
        let id = world.spawn(
            EntityType::Player,
            pos,
            BoundingVolume {
                radius: Fixed::from_meters_f64(0.5),
                height: Fixed::from_meters_f64(1.8),
            },
        );
        world.combat_states.insert(id, CombatState::full_health(100, team));
        id
    }

    #[test]
    fn lag_compensated_projectile_hits_where_target_used_to_be() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        let attacker = spawn_combatant(&mut world, Vec3Fixed::ZERO, 0);
        let target = spawn_combatant(&mut world, Vec3Fixed::from_meters(0.0, 0.0, 20.0), 1);

        let mut lag = LagCompensator::new(60, 500);
        // Target was at z=2 fifteen ticks ago (250ms at 60Hz), now at z=20.
        lag.record(target, 45, Vec3Fixed::from_meters(0.0, 0.0, 2.0), Fixed::from_meters_f64(0.5));
        lag.record(target, 60, Vec3Fixed::from_meters(0.0, 0.0, 20.0), Fixed::from_meters_f64(0.5));
        lag.record(attacker, 45, Vec3Fixed::ZERO, Fixed::from_meters_f64(0.5));
        lag.record(attacker, 60, Vec3Fixed::ZERO, Fixed::from_meters_f64(0.5));

        let resolver = CombatResolver::new();
        let descriptor = AttackDescriptor {
            attacker,
            attack_tick: 45,
            mode: AttackMode::Projectile {
                segment_start: Vec3Fixed::ZERO,
                segment_end: Vec3Fixed::from_meters(0.0, 0.0, 5.0),
                radius: Fixed::from_meters_f64(1.0),
            },
            base_damage: 25,
            allow_friendly_fire: false,
        };

        let events = resolver.resolve(&mut world, &lag, &descriptor, 60).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, CombatEventKind::Damage);
        assert_eq!(events[0].target, target);
        assert_eq!(world.combat_states.get(target).unwrap().hp, 75);
    }

    #[test]
    fn same_team_hit_rejected_without_friendly_fire() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        let attacker = spawn_combatant(&mut world, Vec3Fixed::ZERO, 0);
        let target = spawn_combatant(&mut world, Vec3Fixed::from_meters(0.0, 0.0, 2.0), 0);

        let mut lag = LagCompensator::new(60, 500);
        lag.record(target, 10, Vec3Fixed::from_meters(0.0, 0.0, 2.0), Fixed::from_meters_f64(0.5));
        lag.record(attacker, 10, Vec3Fixed::ZERO, Fixed::from_meters_f64(0.5));

        let resolver = CombatResolver::new();
        let descriptor = AttackDescriptor {
            attacker,
            attack_tick: 10,
            mode: AttackMode::Melee {
                attacker_pos: Vec3Fixed::ZERO,
                attacker_yaw: 0.0,
                range: Fixed::from_meters_f64(5.0),
                cone_half_angle_cos: 0.5,
            },
            base_damage: 25,
            allow_friendly_fire: false,
        };

        let events = resolver.resolve(&mut world, &lag, &descriptor, 10).unwrap();
        assert!(events.is_empty());
        assert_eq!(world.combat_states.get(target).unwrap().hp, 100);
    }

    #[test]
    fn lethal_hit_emits_death_event_and_marks_dead() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        let attacker = spawn_combatant(&mut world, Vec3Fixed::ZERO, 0);
        let target = spawn_combatant(&mut world, Vec3Fixed::from_meters(0.0, 0.0, 2.0), 1);
        world.combat_states.get_mut(target).unwrap().hp = 10;

        let mut lag = LagCompensator::new(60, 500);
        lag.record(target, 5, Vec3Fixed::from_meters(0.0, 0.0, 2.0), Fixed::from_meters_f64(0.5));
        lag.record(attacker, 5, Vec3Fixed::ZERO, Fixed::from_meters_f64(0.5));

        let resolver = CombatResolver::new();
        let descriptor = AttackDescriptor {
            attacker,
            attack_tick: 5,
            mode: AttackMode::Melee {
                attacker_pos: Vec3Fixed::ZERO,
                attacker_yaw: 0.0,
                range: Fixed::from_meters_f64(5.0),
                cone_half_angle_cos: 0.5,
            },
            base_damage: 25,
            allow_friendly_fire: false,
        };

        let events = resolver.resolve(&mut world, &lag, &descriptor, 5).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, CombatEventKind::Death);
        assert!(world.combat_states.get(target).unwrap().is_dead);
        assert_eq!(world.combat_states.get(target).unwrap().hp, 0);
    }
}
