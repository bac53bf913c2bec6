//! Area-of-interest tiering: which entities a connection's subject can
//! see, and how often each tier is due a snapshot update.

use meridian_geom::Fixed;
use meridian_sim::EntityId;
use meridian_sim::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AoiTier {
    Near,
    Mid,
    Far,
}

impl AoiTier {
    /// Effective snapshot rate for this tier at nominal (non-degraded)
    /// load, in Hz. Near matches the tick rate — "every tick for
    /// subject" is the same statement as "60 Hz" when the tick rate
    /// itself is 60 Hz.
    #[must_use]
    pub fn nominal_rate_hz(self) -> u32 {
        match self {
            Self::Near => 60,
            Self::Mid => 30,
            Self::Far => 6,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AoiConfig {
    pub near_radius: Fixed,
    pub mid_radius: Fixed,
    pub far_radius: Fixed,
}

impl AoiConfig {
    #[must_use]
    pub fn standard() -> Self {
        Self {
            near_radius: Fixed::from_meters_f64(50.0),
            mid_radius: Fixed::from_meters_f64(100.0),
            far_radius: Fixed::from_meters_f64(200.0),
        }
    }
}

/// Tiers visible entities by distance from a connection's subject and
/// decides, tick by tick, which tiers are due an update. QoS
/// degradation (`set_degraded`) halves the Mid/Far cadence; Near is
/// never degraded, since it always matches the tick rate.
pub struct AoiManager {
    config: AoiConfig,
    tick_rate_hz: u32,
    degraded: bool,
}

impl AoiManager {
    #[must_use]
    pub fn new(config: AoiConfig, tick_rate_hz: u32) -> Self {
        Self {
            config,
            tick_rate_hz,
            degraded: false,
        }
    }

    pub fn set_degraded(&mut self, degraded: bool) {
        self.degraded = degraded;
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    #[must_use]
    pub fn tier_of(&self, distance: Fixed) -> Option<AoiTier> {
        if distance <= self.config.near_radius {
            Some(AoiTier::Near)
        } else if distance <= self.config.mid_radius {
            Some(AoiTier::Mid)
        } else if distance <= self.config.far_radius {
            Some(AoiTier::Far)
        } else {
            None
        }
    }

    /// Divisor applied to `tick_rate_hz` to get this tier's cadence at
    /// the current degradation state. A tier is due whenever
    /// `tick % divisor == 0`.
    fn cadence_divisor(&self, tier: AoiTier) -> u32 {
        let rate = tier.nominal_rate_hz().max(1);
        let divisor = (self.tick_rate_hz / rate).max(1);
        match tier {
            AoiTier::Near => divisor,
            AoiTier::Mid | AoiTier::Far if self.degraded => divisor * 2,
            AoiTier::Mid | AoiTier::Far => divisor,
        }
    }

    #[must_use]
    pub fn is_due(&self, tier: AoiTier, tick: u32) -> bool {
        tick % self.cadence_divisor(tier) == 0
    }

    /// Entities within `far_radius` of `subject_pos`, each tagged with
    /// its tier, excluding `subject` itself. Uses the world's spatial
    /// hash for the broad query, then tiers by exact distance.
    #[must_use]
    pub fn visible_from(&self, world: &World, subject: EntityId, subject_pos: meridian_geom::Vec3Fixed) -> Vec<(EntityId, AoiTier)> {
        let candidates = world
            .spatial_hash
            .query(subject_pos.x, subject_pos.z, self.config.far_radius);

        let mut out = Vec::new();
        for id in candidates {
            if id == subject {
                continue;
            }
            let Some(position) = world.positions.get(id) else {
                continue;
            };
            let distance = subject_pos.distance_xz(position.pos);
            if let Some(tier) = self.tier_of(distance) {
                out.push((id, tier));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_sim::components::BoundingVolume;
    use meridian_sim::EntityType;
    use meridian_geom::Vec3Fixed;

    fn bounding() -> BoundingVolume {
        BoundingVolume {
            radius: Fixed::from_meters_f64(0.5),
            height: Fixed::from_meters_f64(1.8),
        }
    }

    #[test]
    fn tiers_by_distance() {
        let aoi = AoiManager::new(AoiConfig::standard(), 60);
        assert_eq!(aoi.tier_of(Fixed::from_meters_f64(10.0)), Some(AoiTier::Near));
        assert_eq!(aoi.tier_of(Fixed::from_meters_f64(75.0)), Some(AoiTier::Mid));
        assert_eq!(aoi.tier_of(Fixed::from_meters_f64(150.0)), Some(AoiTier::Far));
        assert_eq!(aoi.tier_of(Fixed::from_meters_f64(250.0)), None);
    }

    #[test]
    fn near_tier_is_due_every_tick() {
        let aoi = AoiManager::new(AoiConfig::standard(), 60);
        for tick in 0..10 {
            assert!(aoi.is_due(AoiTier::Near, tick));
        }
    }

    #[test]
    fn mid_and_far_tiers_are_due_on_their_cadence() {
        let aoi = AoiManager::new(AoiConfig::standard(), 60);
        assert!(aoi.is_due(AoiTier::Mid, 0));
        assert!(!aoi.is_due(AoiTier::Mid, 1));
        assert!(aoi.is_due(AoiTier::Mid, 2));
        assert!(aoi.is_due(AoiTier::Far, 0));
        assert!(!aoi.is_due(AoiTier::Far, 5));
        assert!(aoi.is_due(AoiTier::Far, 10));
    }

    #[test]
    fn degradation_halves_mid_and_far_cadence_not_near() {
        let mut aoi = AoiManager::new(AoiConfig::standard(), 60);
        aoi.set_degraded(true);
        assert!(aoi.is_due(AoiTier::Near, 1));
        assert!(!aoi.is_due(AoiTier::Mid, 2));
        assert!(aoi.is_due(AoiTier::Mid, 4));
    }

    #[test]
    fn visible_from_excludes_subject_and_out_of_range() {
        let mut world = World::new(1, Fixed::from_meters_f64(10.0));
        let subject = world.spawn(EntityType::Player, Vec3Fixed::ZERO, bounding());
        let near = world.spawn(EntityType::Player, Vec3Fixed::from_meters(10.0, 0.0, 0.0), bounding());
        let _far_away = world.spawn(EntityType::Player, Vec3Fixed::from_meters(1000.0, 0.0, 0.0), bounding());
        world.rebuild_spatial_hash();

        let aoi = AoiManager::new(AoiConfig::standard(), 60);
        let visible = aoi.visible_from(&world, subject, Vec3Fixed::ZERO);
        let ids: Vec<EntityId> = visible.iter().map(|(id, _)| *id).collect();
        assert!(ids.contains(&near));
        assert!(!ids.contains(&subject));
        assert_eq!(ids.len(), 1);
    }
}
