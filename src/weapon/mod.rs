//! Weapons
//!
//! A weapon is owned by exactly one character and turns aim + power into a
//! projectile launch:
//! - Power moves in fixed steps inside `[min_power, max_power]`
//! - Ammo runs down per shot; the empty magazine reloads over `reload_time`
//! - Trajectory preview integrates the launch under gravity (cosmetic only)

use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::{ProjectileConfig, WeaponConfig};
use crate::error::GameError;
use crate::ids::EntityId;
use crate::replication::NetRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponKind {
    Bazooka,
    Grenade,
    Mortar,
}

/// Projectile behaviour a weapon kind produces
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileProfile {
    pub explosion_radius: f32,
    pub explosion_damage: f32,
    pub detonation_delay: f32,
    pub gravity_scale: f32,
}

impl WeaponKind {
    pub fn profile(&self, base: &ProjectileConfig) -> ProjectileProfile {
        match self {
            WeaponKind::Bazooka => ProjectileProfile {
                explosion_radius: base.explosion_radius,
                explosion_damage: base.explosion_damage,
                detonation_delay: base.detonation_delay,
                gravity_scale: 1.0,
            },
            // Smaller blast, harder hit
            WeaponKind::Grenade => ProjectileProfile {
                explosion_radius: base.explosion_radius * 0.75,
                explosion_damage: base.explosion_damage * 1.2,
                detonation_delay: base.detonation_delay,
                gravity_scale: 1.0,
            },
            // Wide, weak, steep arc
            WeaponKind::Mortar => ProjectileProfile {
                explosion_radius: base.explosion_radius * 1.25,
                explosion_damage: base.explosion_damage * 0.8,
                detonation_delay: base.detonation_delay * 1.5,
                gravity_scale: 1.5,
            },
        }
    }
}

/// Everything needed to spawn a projectile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileLaunch {
    pub kind: WeaponKind,
    pub position: Vec3,
    pub velocity: Vec3,
    /// The launch emptied the magazine
    pub reload_started: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponSnapshot {
    pub id: EntityId,
    pub owner: EntityId,
    pub kind: WeaponKind,
    pub power: f32,
    pub ammo: u32,
    pub reloading: bool,
}

#[derive(Debug, Clone)]
pub struct Weapon {
    pub id: EntityId,
    pub owner: EntityId,
    pub kind: WeaponKind,
    power: f32,
    ammo: u32,
    reloading: bool,
    muzzle: Vec3,
    aim: Vec3,
    show_trajectory: bool,
    config: WeaponConfig,
}

impl Weapon {
    pub fn new(id: EntityId, owner: EntityId, kind: WeaponKind, config: &WeaponConfig) -> Self {
        Self {
            id,
            owner,
            kind,
            power: config.initial_power,
            ammo: config.max_ammo,
            reloading: false,
            muzzle: Vec3::ZERO,
            aim: Vec3::X,
            show_trajectory: false,
            config: config.clone(),
        }
    }

    pub fn power(&self) -> f32 {
        self.power
    }

    pub fn ammo(&self) -> u32 {
        self.ammo
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    pub fn aim(&self) -> Vec3 {
        self.aim
    }

    pub fn muzzle(&self) -> Vec3 {
        self.muzzle
    }

    /// Power as 0..=1 across the configured range
    pub fn normalized_power(&self) -> f32 {
        let span = self.config.max_power - self.config.min_power;
        if span <= 0.0 {
            return 1.0;
        }
        (self.power - self.config.min_power) / span
    }

    /// `delta` is in steps; returns the new normalized power
    pub fn adjust_power(&mut self, delta: f32) -> f32 {
        self.power = (self.power + delta * self.config.power_step)
            .clamp(self.config.min_power, self.config.max_power);
        self.normalized_power()
    }

    /// Move the muzzle; a zero aim keeps the previous direction
    pub fn set_muzzle(&mut self, position: Vec3, aim: Vec3) {
        self.muzzle = position;
        let dir = aim.normalize_or_zero();
        if dir != Vec3::ZERO {
            self.aim = dir;
        }
    }

    pub fn set_show_trajectory(&mut self, show: bool) {
        self.show_trajectory = show;
    }

    pub fn shows_trajectory(&self) -> bool {
        self.show_trajectory
    }

    fn launch_state(&self) -> (Vec3, Vec3) {
        (
            self.muzzle + self.aim * self.config.muzzle_offset,
            self.aim * self.power,
        )
    }

    pub fn fire(&mut self, role: NetRole) -> Result<ProjectileLaunch, GameError> {
        if !role.is_authority() {
            return Err(GameError::NotAuthoritative("fire"));
        }
        if self.reloading {
            return Err(GameError::Reloading);
        }
        if self.ammo == 0 {
            return Err(GameError::OutOfAmmo);
        }
        self.ammo -= 1;
        let reload_started = self.ammo == 0;
        if reload_started {
            self.reloading = true;
        }
        let (position, velocity) = self.launch_state();
        Ok(ProjectileLaunch {
            kind: self.kind,
            position,
            velocity,
            reload_started,
        })
    }

    pub fn finish_reload(&mut self) {
        self.ammo = self.config.max_ammo;
        self.reloading = false;
    }

    /// Predicted flight path from the current launch state, under the same
    /// scaled gravity the fired projectile will feel
    pub fn trajectory(&self, projectile: &ProjectileConfig) -> Vec<Vec3> {
        let (start, velocity) = self.launch_state();
        let gravity = projectile.gravity * self.kind.profile(projectile).gravity_scale;
        let g = Vec3::new(0.0, 0.0, gravity);
        let step = self.config.trajectory_time_step;
        (0..self.config.trajectory_points)
            .map(|i| {
                let t = i as f32 * step;
                start + velocity * t + 0.5 * g * t * t
            })
            .collect()
    }

    pub fn snapshot(&self) -> WeaponSnapshot {
        WeaponSnapshot {
            id: self.id,
            owner: self.owner,
            kind: self.kind,
            power: self.power,
            ammo: self.ammo,
            reloading: self.reloading,
        }
    }

    /// Build an observer-side replica
    pub fn from_snapshot(snapshot: &WeaponSnapshot, config: &WeaponConfig) -> Self {
        let mut weapon = Self::new(snapshot.id, snapshot.owner, snapshot.kind, config);
        weapon.apply_snapshot(snapshot);
        weapon
    }

    pub fn apply_snapshot(&mut self, snapshot: &WeaponSnapshot) {
        self.owner = snapshot.owner;
        self.kind = snapshot.kind;
        self.power = snapshot.power;
        self.ammo = snapshot.ammo;
        self.reloading = snapshot.reloading;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weapon() -> Weapon {
        Weapon::new(EntityId(10), EntityId(1), WeaponKind::Bazooka, &WeaponConfig::default())
    }

    #[test]
    fn test_initial_power() {
        let w = weapon();
        assert_eq!(w.power(), 3000.0);
        assert!((w.normalized_power() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_adjust_power_clamps() {
        let mut w = weapon();
        w.adjust_power(5.0);
        assert_eq!(w.power(), 3500.0);
        assert_eq!(w.adjust_power(100.0), 1.0);
        assert_eq!(w.power(), 5000.0);
        assert_eq!(w.adjust_power(-1000.0), 0.0);
        assert_eq!(w.power(), 1000.0);
    }

    #[test]
    fn test_fire_spawns_ahead_of_muzzle() {
        let mut w = weapon();
        w.set_muzzle(Vec3::new(100.0, 0.0, 500.0), Vec3::new(2.0, 0.0, 0.0));
        let launch = w.fire(NetRole::Authority).unwrap();
        assert_eq!(launch.position, Vec3::new(200.0, 0.0, 500.0));
        assert_eq!(launch.velocity, Vec3::new(3000.0, 0.0, 0.0));
        assert_eq!(w.ammo(), 4);
        assert!(!launch.reload_started);
    }

    #[test]
    fn test_fire_requires_authority() {
        let mut w = weapon();
        assert_eq!(
            w.fire(NetRole::Observer),
            Err(GameError::NotAuthoritative("fire"))
        );
        assert_eq!(w.ammo(), 5);
    }

    #[test]
    fn test_empty_magazine_reloads() {
        let mut w = weapon();
        for _ in 0..4 {
            w.fire(NetRole::Authority).unwrap();
        }
        let last = w.fire(NetRole::Authority).unwrap();
        assert!(last.reload_started);
        assert!(w.is_reloading());
        assert_eq!(w.fire(NetRole::Authority), Err(GameError::Reloading));

        w.finish_reload();
        assert_eq!(w.ammo(), 5);
        assert!(w.fire(NetRole::Authority).is_ok());
    }

    #[test]
    fn test_trajectory_follows_gravity() {
        let mut w = weapon();
        w.set_muzzle(Vec3::ZERO, Vec3::X);
        let projectile = ProjectileConfig {
            gravity: -980.0,
            ..Default::default()
        };
        let points = w.trajectory(&projectile);
        assert_eq!(points.len(), 30);
        assert_eq!(points[0], Vec3::new(100.0, 0.0, 0.0));
        // after 1s: x = 100 + 3000, z = -490
        let p = points[10];
        assert!((p.x - 3100.0).abs() < 1e-2);
        assert!((p.z + 490.0).abs() < 1e-2);
    }

    #[test]
    fn test_mortar_trajectory_uses_scaled_gravity() {
        let projectile = ProjectileConfig {
            gravity: -980.0,
            ..Default::default()
        };
        let mut w = Weapon::new(EntityId(10), EntityId(1), WeaponKind::Mortar, &WeaponConfig::default());
        w.set_muzzle(Vec3::ZERO, Vec3::X);
        let p = w.trajectory(&projectile)[10];
        // after 1s under 1.5 g
        assert!((p.x - 3100.0).abs() < 1e-2);
        assert!((p.z + 735.0).abs() < 1e-2);
    }

    #[test]
    fn test_profiles_scale_from_base() {
        let base = ProjectileConfig::default();
        assert_eq!(WeaponKind::Bazooka.profile(&base).explosion_radius, 200.0);
        assert!(WeaponKind::Mortar.profile(&base).explosion_radius > 200.0);
        assert!(WeaponKind::Grenade.profile(&base).explosion_damage > 25.0);
    }
}
