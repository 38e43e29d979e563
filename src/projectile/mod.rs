//! Projectile Lifecycle
//!
//! ```text
//!  spawn ──► grace (ignores every character) ──► armed
//!    │                                            │
//!    ├── first qualifying hit ─────────────┐      │
//!    ├── detonation delay elapsed ─────────┼──► detonate (once) ──► destroyed
//!    └── motionless near ground (stuck) ───┘
//! ```
//!
//! The firer is never a qualifying hit. Terrain always is.

pub mod damage;

use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::ProjectileConfig;
use crate::ids::EntityId;
use crate::weapon::{ProjectileLaunch, WeaponKind};

pub use damage::{crater_modification, falloff_damage, resolve_explosion, DamageApplication};

/// What a swept projectile ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Terrain,
    Character(EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub id: EntityId,
    pub kind: WeaponKind,
    pub position: Vec3,
    pub velocity: Vec3,
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: EntityId,
    pub instigator: EntityId,
    pub kind: WeaponKind,
    pub position: Vec3,
    pub velocity: Vec3,
    pub radius: f32,
    pub explosion_radius: f32,
    pub explosion_damage: f32,
    pub detonation_delay: f32,
    gravity: f32,
    collision_active: bool,
    detonated: bool,
    age: f32,
}

impl Projectile {
    pub fn new(id: EntityId, instigator: EntityId, launch: &ProjectileLaunch, config: &ProjectileConfig) -> Self {
        let profile = launch.kind.profile(config);
        Self {
            id,
            instigator,
            kind: launch.kind,
            position: launch.position,
            velocity: launch.velocity,
            radius: config.radius,
            explosion_radius: profile.explosion_radius,
            explosion_damage: profile.explosion_damage,
            detonation_delay: profile.detonation_delay,
            gravity: config.gravity * profile.gravity_scale,
            collision_active: false,
            detonated: false,
            age: 0.0,
        }
    }

    pub fn age(&self) -> f32 {
        self.age
    }

    pub fn collision_active(&self) -> bool {
        self.collision_active
    }

    pub fn is_detonated(&self) -> bool {
        self.detonated
    }

    /// End of the spawn grace period
    pub fn activate_collision(&mut self) {
        self.collision_active = true;
    }

    /// Advance one step; returns the swept segment
    pub fn integrate(&mut self, delta_seconds: f32) -> (Vec3, Vec3) {
        let from = self.position;
        self.velocity.z += self.gravity * delta_seconds;
        self.position += self.velocity * delta_seconds;
        self.age += delta_seconds;
        (from, self.position)
    }

    /// Whether running into `target` sets the projectile off
    pub fn qualifies(&self, target: HitTarget) -> bool {
        match target {
            HitTarget::Terrain => true,
            HitTarget::Character(id) if id == self.instigator => false,
            HitTarget::Character(_) => self.collision_active,
        }
    }

    /// Motionless near the ground without having gone off
    pub fn is_stuck(&self, speed_threshold: f32, height_threshold: f32) -> bool {
        self.velocity.length() < speed_threshold && self.position.z < height_threshold
    }

    /// Latch detonation. Only the first call returns true.
    pub fn mark_detonated(&mut self) -> bool {
        !std::mem::replace(&mut self.detonated, true)
    }

    pub fn snapshot(&self) -> ProjectileSnapshot {
        ProjectileSnapshot {
            id: self.id,
            kind: self.kind,
            position: self.position,
            velocity: self.velocity,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn launch(velocity: Vec3) -> ProjectileLaunch {
        ProjectileLaunch {
            kind: WeaponKind::Bazooka,
            position: Vec3::new(0.0, 0.0, 1000.0),
            velocity,
            reload_started: false,
        }
    }

    fn projectile() -> Projectile {
        Projectile::new(
            EntityId(20),
            EntityId(1),
            &launch(Vec3::new(3000.0, 0.0, 0.0)),
            &ProjectileConfig::default(),
        )
    }

    #[test]
    fn test_uses_weapon_profile() {
        let p = projectile();
        assert_eq!(p.explosion_radius, 200.0);
        assert_eq!(p.explosion_damage, 25.0);
        assert_eq!(p.detonation_delay, 3.0);
    }

    #[test]
    fn test_integrate_applies_gravity() {
        let mut p = projectile();
        let (from, to) = p.integrate(0.5);
        assert_eq!(from, Vec3::new(0.0, 0.0, 1000.0));
        assert!((to.x - 1500.0).abs() < 1e-3);
        assert!(to.z < 1000.0);
        assert!((p.age() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_collision_grace() {
        let mut p = projectile();
        assert!(p.qualifies(HitTarget::Terrain));
        assert!(!p.qualifies(HitTarget::Character(EntityId(1))));
        assert!(!p.qualifies(HitTarget::Character(EntityId(2))));

        p.activate_collision();
        assert!(!p.qualifies(HitTarget::Character(EntityId(1))));
        assert!(p.qualifies(HitTarget::Character(EntityId(2))));
    }

    #[test]
    fn test_detonates_once() {
        let mut p = projectile();
        assert!(p.mark_detonated());
        assert!(!p.mark_detonated());
        assert!(p.is_detonated());
    }

    #[test]
    fn test_stuck_heuristic() {
        let mut p = projectile();
        assert!(!p.is_stuck(100.0, 100.0));
        p.velocity = Vec3::new(10.0, 0.0, 0.0);
        assert!(!p.is_stuck(100.0, 100.0));
        p.position.z = 50.0;
        assert!(p.is_stuck(100.0, 100.0));
    }
}
