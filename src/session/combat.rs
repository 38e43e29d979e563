//! Weapons, firing, projectile flight and detonation. Authority only.

use bevy::math::Vec3;

use super::MatchSession;
use crate::error::GameError;
use crate::events::GameEvent;
use crate::ids::{EntityId, PlayerId};
use crate::physics::sweep_ball;
use crate::projectile::{crater_modification, resolve_explosion, HitTarget, Projectile};
use crate::replication::ServerMessage;
use crate::tasks::TaskOp;
use crate::terrain::DestroyOutcome;
use crate::weapon::Weapon;

impl MatchSession {
    // ------------------------------------------------------------------
    // Inventory
    // ------------------------------------------------------------------

    /// Give the match loadout to `target`, or to every character still
    /// without one when `target` is the match itself
    pub(super) fn assign_weapons(&mut self, target: EntityId) {
        let loadout = self.config.weapon.loadout.clone();
        let delay = self.config.character.weapon_spawn_delay;
        let ids: Vec<EntityId> = if target == self.mode_id {
            self.characters
                .values()
                .filter(|c| c.available_weapons().is_empty())
                .map(|c| c.id)
                .collect()
        } else {
            vec![target]
        };
        for id in ids {
            let Some(character) = self.characters.get_mut(&id) else {
                tracing::warn!(character = %id, "weapon assignment for missing character");
                continue;
            };
            character.set_available_weapons(loadout.clone());
            self.tasks.schedule(delay, id, TaskOp::SpawnWeapon);
            tracing::debug!(character = %id, weapons = loadout.len(), "weapons assigned");
        }
    }

    /// Catch characters whose weapon never materialized
    pub(super) fn recheck_weapons(&mut self) {
        let missing_loadout = self
            .characters
            .values()
            .any(|c| c.available_weapons().is_empty());
        if missing_loadout {
            self.assign_weapons(self.mode_id);
        }
        let unarmed: Vec<EntityId> = self
            .characters
            .values()
            .filter(|c| c.is_alive() && c.current_weapon.is_none() && !c.available_weapons().is_empty())
            .filter(|c| self.tasks.pending_for(c.id, TaskOp::SpawnWeapon).is_none())
            .map(|c| c.id)
            .collect();
        for id in unarmed {
            tracing::debug!(character = %id, "weapon missing on recheck, spawning");
            self.spawn_current_weapon(id);
        }
    }

    /// Replace the character's weapon with one of the selected kind
    pub(super) fn spawn_current_weapon(&mut self, character_id: EntityId) {
        let Some(character) = self.characters.get(&character_id) else {
            tracing::warn!(character = %character_id, "weapon spawn for missing character");
            return;
        };
        if !character.is_alive() {
            return;
        }
        let Some(kind) = character.current_weapon_kind() else {
            tracing::warn!(character = %character_id, "no weapon kind to spawn");
            return;
        };
        let (position, aim, old) = (character.position, character.aim(), character.current_weapon);
        if let Some(old) = old {
            self.destroy_weapon(old);
        }

        let id = self.ids.entity();
        let mut weapon = Weapon::new(id, character_id, kind, &self.config.weapon);
        weapon.set_muzzle(position, aim);
        self.weapons.insert(id, weapon);
        if let Some(character) = self.characters.get_mut(&character_id) {
            character.current_weapon = Some(id);
        }
        self.publish(GameEvent::WeaponEquipped {
            character: character_id,
            weapon: id,
            kind,
        });
    }

    pub(super) fn destroy_weapon(&mut self, id: EntityId) {
        if self.weapons.remove(&id).is_some() {
            self.tasks.cancel_target(id);
            self.sent.forget(id);
            self.outbox.push(ServerMessage::WeaponRemoved(id));
            for character in self.characters.values_mut() {
                if character.current_weapon == Some(id) {
                    character.current_weapon = None;
                }
            }
        }
    }

    pub(super) fn switch_weapon_for(&mut self, player: PlayerId, index: usize) -> Result<(), GameError> {
        let id = self.character_id_of(player).ok_or(GameError::MissingCharacter(player))?;
        let character = self
            .characters
            .get_mut(&id)
            .ok_or(GameError::MissingCharacter(player))?;
        if !character.is_alive() {
            return Err(GameError::Dead);
        }
        character.select_weapon(index)?;
        self.spawn_current_weapon(id);
        Ok(())
    }

    pub(super) fn finish_reload(&mut self, weapon_id: EntityId) {
        let Some(weapon) = self.weapons.get_mut(&weapon_id) else {
            return;
        };
        weapon.finish_reload();
        let ammo = weapon.ammo();
        self.publish(GameEvent::ReloadFinished { weapon: weapon_id });
        self.publish(GameEvent::AmmoChanged {
            weapon: weapon_id,
            ammo,
        });
    }

    // ------------------------------------------------------------------
    // Firing
    // ------------------------------------------------------------------

    pub(super) fn fire_for(&mut self, player: PlayerId) -> Result<EntityId, GameError> {
        let now = self.now();
        let character_id = self.character_id_of(player).ok_or(GameError::MissingCharacter(player))?;
        let character = self
            .characters
            .get(&character_id)
            .ok_or(GameError::MissingCharacter(player))?;
        let weapon_id = character.can_fire(now)?;
        let (position, aim) = (character.position, character.aim());

        let weapon = self
            .weapons
            .get_mut(&weapon_id)
            .ok_or(GameError::MissingEntity(weapon_id))?;
        weapon.set_muzzle(position, aim);
        let launch = weapon.fire(self.role)?;
        let ammo = weapon.ammo();
        if let Some(character) = self.characters.get_mut(&character_id) {
            character.record_fire(now);
        }

        self.publish(GameEvent::AmmoChanged {
            weapon: weapon_id,
            ammo,
        });
        if launch.reload_started {
            self.tasks
                .schedule(self.config.weapon.reload_time, weapon_id, TaskOp::FinishReload);
            self.publish(GameEvent::ReloadStarted { weapon: weapon_id });
        }

        let id = self.ids.entity();
        let projectile = Projectile::new(id, character_id, &launch, &self.config.projectile);
        let pc = &self.config.projectile;
        self.tasks
            .schedule(pc.collision_activation_delay, id, TaskOp::ArmProjectileCollision);
        self.tasks
            .schedule(projectile.detonation_delay, id, TaskOp::DetonateProjectile);
        self.tasks
            .schedule(pc.stuck_check_interval, id, TaskOp::CheckStuckProjectile);
        self.tasks.schedule(pc.lifespan, id, TaskOp::ExpireProjectile);
        self.projectiles.insert(id, projectile);

        tracing::info!(projectile = %id, instigator = %character_id, kind = ?launch.kind, "fired");
        self.publish(GameEvent::ProjectileFired {
            projectile: id,
            instigator: character_id,
        });
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Flight
    // ------------------------------------------------------------------

    /// Integrate every projectile and detonate on the earliest qualifying hit
    pub(super) fn step_projectiles(&mut self, delta_seconds: f32) {
        if self.projectiles.is_empty() {
            return;
        }
        let hit_radius = self.config.character.collision_radius;
        let mut impacts: Vec<(EntityId, Vec3)> = Vec::new();

        for projectile in self.projectiles.values_mut() {
            let (from, to) = projectile.integrate(delta_seconds);
            let mut best: Option<(f32, HitTarget)> = None;

            if let Some((s, _)) = self.terrain.as_ref().and_then(|t| t.raycast(from, to)) {
                best = Some((s, HitTarget::Terrain));
            }
            for character in self.characters.values() {
                if !character.is_alive() || !character.collision_enabled() {
                    continue;
                }
                let target = HitTarget::Character(character.id);
                if !projectile.qualifies(target) {
                    continue;
                }
                let radius = hit_radius + projectile.radius;
                if let Some(s) = sweep_ball(from, to, character.position, radius) {
                    if best.map_or(true, |(b, _)| s < b) {
                        best = Some((s, target));
                    }
                }
            }

            if let Some((s, target)) = best {
                let point = from + (to - from) * s;
                tracing::debug!(projectile = %projectile.id, ?target, "projectile hit");
                impacts.push((projectile.id, point));
            }
        }

        for (id, point) in impacts {
            self.detonate(id, point);
        }
    }

    pub(super) fn check_stuck(&mut self, id: EntityId) {
        let pc = &self.config.projectile;
        let (speed, height, interval) = (
            pc.stuck_speed_threshold,
            pc.stuck_height_threshold,
            pc.stuck_check_interval,
        );
        let Some(projectile) = self.projectiles.get(&id) else {
            return;
        };
        if projectile.is_stuck(speed, height) {
            tracing::info!(projectile = %id, "projectile stuck, forcing detonation");
            let position = projectile.position;
            self.detonate(id, position);
        } else {
            self.tasks.schedule(interval, id, TaskOp::CheckStuckProjectile);
        }
    }

    // ------------------------------------------------------------------
    // Detonation
    // ------------------------------------------------------------------

    /// Damage, crater, cosmetic notice, removal. Runs at most once per
    /// projectile.
    pub fn detonate(&mut self, id: EntityId, impact: Vec3) {
        if !self.role.is_authority() {
            tracing::warn!(projectile = %id, "detonate ignored on observer");
            return;
        }
        let Some(projectile) = self.projectiles.get_mut(&id) else {
            return;
        };
        if !projectile.mark_detonated() {
            return;
        }
        let (radius, damage) = (projectile.explosion_radius, projectile.explosion_damage);

        let targets: Vec<(EntityId, Vec3)> = self
            .characters
            .values()
            .filter(|c| c.is_alive())
            .map(|c| (c.id, c.position))
            .collect();
        let mut dead = Vec::new();
        for hit in resolve_explosion(impact, radius, damage, targets) {
            let Some(character) = self.characters.get_mut(&hit.target) else {
                continue;
            };
            match character.apply_damage(self.role, hit.damage, hit.direction) {
                Ok(outcome) => {
                    let player = character.player;
                    tracing::info!(
                        character = %hit.target,
                        damage = outcome.dealt,
                        health = outcome.health,
                        "explosion damage"
                    );
                    self.publish(GameEvent::HealthChanged {
                        character: hit.target,
                        health: outcome.health,
                    });
                    if outcome.died {
                        tracing::info!(character = %hit.target, %player, "character died");
                        self.publish(GameEvent::CharacterDied {
                            character: hit.target,
                            player,
                        });
                        dead.push(hit.target);
                    }
                }
                Err(e) => tracing::warn!("damage rejected: {e}"),
            }
        }

        if let Some(terrain) = self.terrain.as_mut() {
            let local = terrain.world_to_local(impact);
            let crater = crater_modification(local, radius, terrain.width(), terrain.height());
            let outcome = terrain.request_modification(crater);
            tracing::debug!(?outcome, "crater requested");
            if let DestroyOutcome::Applied { .. } = outcome {
                let (revision, triangles) = (terrain.revision(), terrain.mesh().triangle_count());
                self.publish(GameEvent::TerrainUpdated { revision, triangles });
            }
        }

        self.publish(GameEvent::Explosion {
            position: impact,
            radius,
        });
        self.outbox.push(ServerMessage::Explosion {
            position: impact,
            radius,
        });
        self.destroy_projectile(id);

        if !dead.is_empty() || self.check_game_end_condition() {
            self.after_casualties(&dead);
        }
    }

    pub(super) fn destroy_projectile(&mut self, id: EntityId) {
        if self.projectiles.remove(&id).is_some() {
            self.tasks.cancel_target(id);
            self.outbox.push(ServerMessage::ProjectileRemoved(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;

    /// Two characters on a small slab, both armed, first player active
    fn armed_session() -> (MatchSession, PlayerId, PlayerId) {
        let mut config = MatchConfig::default();
        config.terrain.width = 1000.0;
        config.terrain.height = 500.0;
        config.terrain.depth = 200.0;
        config.terrain.horizontal_resolution = 11;
        config.terrain.vertical_resolution = 6;
        let mut s = MatchSession::authority(config);
        let a = s.add_player("A", Vec3::new(200.0, 100.0, 600.0)).unwrap();
        let b = s.add_player("B", Vec3::new(800.0, 100.0, 600.0)).unwrap();
        s.spawn_terrain();
        s.initialize_terrain();
        s.assign_weapons(s.mode_id);
        let ids: Vec<EntityId> = s.characters.keys().copied().collect();
        for id in ids {
            s.spawn_current_weapon(id);
        }
        s.start_next_turn();
        (s, a, b)
    }

    #[test]
    fn test_fire_requires_turn() {
        let (mut s, _, b) = armed_session();
        assert_eq!(s.fire_for(b), Err(GameError::NotYourTurn(b)));
        assert!(s.projectiles.is_empty());
    }

    #[test]
    fn test_fire_spawns_and_cooldown() {
        let (mut s, a, _) = armed_session();
        let id = s.fire_for(a).unwrap();
        assert!(s.projectiles.contains_key(&id));
        assert!(matches!(s.fire_for(a), Err(GameError::WeaponCooldown { .. })));
        assert!(s.tasks.pending_for(id, TaskOp::DetonateProjectile).is_some());
    }

    #[test]
    fn test_detonation_damages_and_carves_once() {
        let (mut s, a, b) = armed_session();
        let id = s.fire_for(a).unwrap();
        let target = s.get_worm_character_from_controller(b).unwrap().position;
        let triangles = s.terrain().unwrap().mesh().triangle_count();

        s.detonate(id, target + Vec3::new(100.0, 0.0, 0.0));
        let hurt = s.get_worm_character_from_controller(b).unwrap();
        assert!((hurt.health() - 87.5).abs() < 1e-4);
        assert!(s.terrain().unwrap().mesh().triangle_count() < triangles);
        assert!(!s.projectiles.contains_key(&id));
        assert_eq!(s.tasks.pending_for(id, TaskOp::ExpireProjectile), None);

        // a second trigger on the same projectile does nothing
        s.detonate(id, target);
        assert!((s.get_worm_character_from_controller(b).unwrap().health() - 87.5).abs() < 1e-4);
        assert_eq!(s.terrain().unwrap().modifications().len(), 1);
    }

    #[test]
    fn test_crater_clamped_inside_terrain() {
        let (mut s, a, _) = armed_session();
        let id = s.fire_for(a).unwrap();
        s.detonate(id, Vec3::new(-50.0, 0.0, 10.0));
        let crater = s.terrain().unwrap().modifications()[0];
        assert_eq!(crater.position, bevy::math::Vec2::ZERO);
        assert_eq!(crater.size, bevy::math::Vec2::splat(400.0));
    }

    #[test]
    fn test_switch_weapon_replaces_instance() {
        let (mut s, a, _) = armed_session();
        let before = s.get_worm_character_from_controller(a).unwrap().current_weapon.unwrap();
        s.switch_weapon_for(a, 2).unwrap();
        let c = s.get_worm_character_from_controller(a).unwrap();
        let after = c.current_weapon.unwrap();
        assert_ne!(before, after);
        assert!(s.weapon(before).is_none());
        assert_eq!(s.weapon(after).unwrap().kind, crate::weapon::WeaponKind::Mortar);
        assert_eq!(
            s.switch_weapon_for(a, 7),
            Err(GameError::InvalidWeaponIndex { index: 7, count: 3 })
        );
    }

    #[test]
    fn test_stuck_projectile_detonates() {
        let (mut s, a, _) = armed_session();
        let id = s.fire_for(a).unwrap();
        {
            let p = s.projectiles.get_mut(&id).unwrap();
            p.velocity = Vec3::ZERO;
            p.position = Vec3::new(500.0, -300.0, 20.0);
        }
        s.check_stuck(id);
        assert!(!s.projectiles.contains_key(&id));
    }
}
