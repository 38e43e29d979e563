//! Replication
//!
//! ```text
//!  authority flush:  terrain ─► turn state ─► characters ─► weapons ─► projectiles ─► aim
//!                       (reliable, on change)                      (best-effort, every tick)
//!  observer input:   apply in arrival order, emit local notifications on diffs
//! ```

use super::MatchSession;
use crate::character::{CharacterSnapshot, WormCharacter};
use crate::events::GameEvent;
use crate::ids::EntityId;
use crate::replication::{Channel, ClientMessage, Envelope, NetRole, ServerMessage};
use crate::terrain::{DestructibleTerrain, TerrainSnapshot};
use crate::weapon::{Weapon, WeaponSnapshot};

impl MatchSession {
    // ------------------------------------------------------------------
    // Transport surface
    // ------------------------------------------------------------------

    /// Authority frames queued since the last call
    pub fn take_outgoing(&mut self) -> Vec<Envelope<ServerMessage>> {
        self.outbox.drain()
    }

    /// Observer requests queued since the last call
    pub fn take_requests(&mut self) -> Vec<Envelope<ClientMessage>> {
        self.requests.drain()
    }

    /// Frame arriving from the authority. Repeated reliable frames are dropped.
    pub fn receive_server(&mut self, envelope: Envelope<ServerMessage>) {
        if envelope.channel == Channel::Reliable {
            if self.server_seq.is_some_and(|seq| envelope.seq <= seq) {
                tracing::trace!(seq = envelope.seq, "duplicate frame dropped");
                return;
            }
            self.server_seq = Some(envelope.seq);
        }
        self.inbound_server.push(envelope.payload);
    }

    // ------------------------------------------------------------------
    // Outgoing
    // ------------------------------------------------------------------

    pub(super) fn flush(&mut self) {
        match self.role {
            NetRole::Authority => self.flush_authority(),
            NetRole::Observer => self.flush_observer(),
        }
    }

    fn flush_authority(&mut self) {
        if let Some(terrain) = self.terrain.as_mut() {
            if let Some(snapshot) = terrain.take_pending_push() {
                tracing::debug!(revision = snapshot.revision, "terrain push queued");
                self.outbox.push(ServerMessage::TerrainState(Box::new(snapshot)));
            }
            if terrain.take_initialized_notice() {
                self.outbox.push(ServerMessage::TerrainInitialized);
            }
        }

        let turn_changed = self
            .last_turn_sync
            .as_ref()
            .map_or(true, |last| self.turn_state.differs_for_sync(last));
        if turn_changed {
            self.last_turn_sync = Some(self.turn_state.clone());
            self.outbox.push(ServerMessage::TurnState(self.turn_state.clone()));
        }

        for character in self.characters.values() {
            let snapshot = character.snapshot();
            if self.sent.changed(character.id, &snapshot) {
                self.outbox.push(ServerMessage::Character(snapshot));
            }
        }
        for weapon in self.weapons.values() {
            let snapshot = weapon.snapshot();
            if self.sent.changed(weapon.id, &snapshot) {
                self.outbox.push(ServerMessage::Weapon(snapshot));
            }
        }
        for projectile in self.projectiles.values() {
            self.outbox.push(ServerMessage::ProjectileState(projectile.snapshot()));
        }

        if let Some(character) = self.characters.values_mut().find(|c| c.is_my_turn()) {
            if character.aim_limiter.ready() {
                self.outbox.push(ServerMessage::WeaponAim {
                    character: character.id,
                    direction: character.aim(),
                });
            }
        }
    }

    fn flush_observer(&mut self) {
        let Some(direction) = self.pending_aim else {
            return;
        };
        let ready = match self.local_player.and_then(|p| self.character_id_of(p)) {
            Some(id) => self
                .characters
                .get_mut(&id)
                .map_or(true, |c| c.aim_limiter.ready()),
            None => true,
        };
        if ready {
            self.pending_aim = None;
            self.requests.push(ClientMessage::Aim { direction });
        }
    }

    // ------------------------------------------------------------------
    // Incoming (observer)
    // ------------------------------------------------------------------

    pub(super) fn process_server_messages(&mut self) {
        for message in std::mem::take(&mut self.inbound_server) {
            self.apply_server_message(message);
        }
    }

    fn apply_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::TerrainState(snapshot) => self.apply_terrain(*snapshot),
            ServerMessage::TerrainInitialized => {
                if let Some(terrain) = self.terrain.as_mut() {
                    terrain.mark_initialized();
                }
                if !self.terrain_announced {
                    self.terrain_announced = true;
                    self.publish(GameEvent::TerrainInitialized);
                }
            }
            ServerMessage::TurnState(state) => {
                let previous = self.turn_state.current_player_name().to_string();
                self.turn_state = state;
                let name = self.turn_state.current_player_name().to_string();
                if name != previous {
                    self.publish(GameEvent::CurrentPlayerChanged { name });
                }
            }
            ServerMessage::Character(snapshot) => self.apply_character(snapshot),
            ServerMessage::CharacterRemoved(id) => {
                self.characters.remove(&id);
            }
            ServerMessage::Weapon(snapshot) => self.apply_weapon(snapshot),
            ServerMessage::WeaponRemoved(id) => {
                self.weapons.remove(&id);
            }
            ServerMessage::ProjectileState(snapshot) => {
                self.projectile_views.insert(snapshot.id, snapshot);
            }
            ServerMessage::ProjectileRemoved(id) => {
                self.projectile_views.remove(&id);
            }
            ServerMessage::Explosion { position, radius } => {
                self.publish(GameEvent::Explosion { position, radius });
            }
            ServerMessage::WeaponAim { character, direction } => {
                let local = self.local_player;
                let Some(c) = self.characters.get_mut(&character) else {
                    return;
                };
                // the local player's own aim is never overwritten by echoes
                if Some(c.player) == local {
                    return;
                }
                c.set_aim(direction);
                let (position, aim) = (c.position, c.aim());
                if let Some(weapon) = c.current_weapon.and_then(|w| self.weapons.get_mut(&w)) {
                    weapon.set_muzzle(position, aim);
                }
            }
            ServerMessage::GameOver { winner } => {
                if self.game_over.is_none() {
                    self.game_over = Some(winner);
                    tracing::info!(winner = ?winner, "game over");
                    self.publish(GameEvent::GameOver { winner });
                }
            }
        }
    }

    fn apply_terrain(&mut self, snapshot: TerrainSnapshot) {
        if self.terrain.is_none() {
            let id = self.ids.entity();
            self.terrain = Some(DestructibleTerrain::new(id, self.role, &self.config));
        }
        let Some(terrain) = self.terrain.as_mut() else {
            return;
        };
        match terrain.receive_snapshot(snapshot) {
            Ok(true) => {
                let (revision, triangles) = (terrain.revision(), terrain.mesh().triangle_count());
                tracing::debug!(revision, triangles, "terrain replica updated");
                self.publish(GameEvent::TerrainUpdated { revision, triangles });
            }
            Ok(false) => {}
            Err(e) => tracing::error!("terrain push rejected: {e}"),
        }
    }

    fn apply_character(&mut self, snapshot: CharacterSnapshot) {
        let id = snapshot.id;
        let Some(character) = self.characters.get_mut(&id) else {
            let character = WormCharacter::from_snapshot(
                &snapshot,
                &self.config.character,
                self.config.replication.aim_send_interval,
            );
            self.characters.insert(id, character);
            return;
        };
        let (health, alive, turn) = (character.health(), character.is_alive(), character.is_my_turn());
        character.apply_snapshot(&snapshot);
        let player = character.player;

        if snapshot.health != health {
            self.publish(GameEvent::HealthChanged {
                character: id,
                health: snapshot.health,
            });
        }
        if alive && !snapshot.alive {
            self.publish(GameEvent::CharacterDied {
                character: id,
                player,
            });
        }
        if turn != snapshot.is_my_turn {
            self.publish(GameEvent::TurnChanged {
                character: id,
                is_my_turn: snapshot.is_my_turn,
            });
        }
    }

    fn apply_weapon(&mut self, snapshot: WeaponSnapshot) {
        let id: EntityId = snapshot.id;
        let Some(weapon) = self.weapons.get_mut(&id) else {
            let mut weapon = Weapon::from_snapshot(&snapshot, &self.config.weapon);
            if let Some(owner) = self.characters.get(&snapshot.owner) {
                weapon.set_muzzle(owner.position, owner.aim());
            }
            self.weapons.insert(id, weapon);
            self.publish(GameEvent::WeaponEquipped {
                character: snapshot.owner,
                weapon: id,
                kind: snapshot.kind,
            });
            return;
        };
        let before = weapon.snapshot();
        weapon.apply_snapshot(&snapshot);
        let normalized = weapon.normalized_power();

        if before.power != snapshot.power {
            self.publish(GameEvent::PowerChanged { weapon: id, normalized });
        }
        if before.ammo != snapshot.ammo {
            self.publish(GameEvent::AmmoChanged {
                weapon: id,
                ammo: snapshot.ammo,
            });
        }
        match (before.reloading, snapshot.reloading) {
            (false, true) => self.publish(GameEvent::ReloadStarted { weapon: id }),
            (true, false) => self.publish(GameEvent::ReloadFinished { weapon: id }),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use bevy::math::Vec3;

    use super::*;
    use crate::config::MatchConfig;
    use crate::ids::PlayerId;

    #[test]
    fn test_unchanged_snapshots_not_resent() {
        let mut s = MatchSession::authority(MatchConfig::default());
        s.add_player("A", Vec3::new(100.0, 0.0, 2100.0)).unwrap();
        s.tick(1.0 / 60.0);
        let first = s.take_outgoing();
        assert!(first
            .iter()
            .any(|f| matches!(f.payload, ServerMessage::Character(_))));
        s.tick(1.0 / 60.0);
        let second = s.take_outgoing();
        assert!(!second
            .iter()
            .any(|f| matches!(f.payload, ServerMessage::Character(_) | ServerMessage::TurnState(_))));
    }

    #[test]
    fn test_duplicate_reliable_frames_applied_once() {
        let mut observer = MatchSession::observer(MatchConfig::default(), PlayerId(9));
        observer.events_mut().set_buffering(true);
        let frame = Envelope {
            seq: 4,
            channel: Channel::Reliable,
            payload: ServerMessage::Explosion {
                position: Vec3::ZERO,
                radius: 200.0,
            },
        };
        observer.receive_server(frame.clone());
        observer.receive_server(frame);
        observer.tick(1.0 / 60.0);
        let explosions = observer
            .events_mut()
            .drain()
            .into_iter()
            .filter(|e| matches!(e, GameEvent::Explosion { .. }))
            .count();
        assert_eq!(explosions, 1);
    }

    #[test]
    fn test_observer_aim_is_rate_limited() {
        let mut observer = MatchSession::observer(MatchConfig::default(), PlayerId(0));
        let snapshot = CharacterSnapshot {
            id: EntityId(1),
            player: PlayerId(0),
            name: "Local".into(),
            position: Vec3::ZERO,
            health: 100.0,
            movement_points: 100.0,
            is_my_turn: true,
            alive: true,
            available_weapons: Vec::new(),
            current_weapon_index: 0,
            current_weapon: None,
        };
        observer.receive_server(Envelope {
            seq: 0,
            channel: Channel::Reliable,
            payload: ServerMessage::Character(snapshot),
        });
        observer.tick(1.0 / 60.0);

        let mut sent = 0;
        for i in 0..20 {
            observer.set_aim(PlayerId(0), Vec3::new(1.0, 0.0, i as f32 * 0.01)).unwrap();
            observer.tick(1.0 / 60.0);
            sent += observer
                .take_requests()
                .iter()
                .filter(|f| matches!(f.payload, ClientMessage::Aim { .. }))
                .count();
        }
        assert_eq!(sent, 4);
    }

    #[test]
    fn test_remote_aim_applied_but_local_kept() {
        let mut observer = MatchSession::observer(MatchConfig::default(), PlayerId(0));
        for (id, player) in [(1, 0), (2, 1)] {
            observer.apply_character(CharacterSnapshot {
                id: EntityId(id),
                player: PlayerId(player),
                name: format!("P{player}"),
                position: Vec3::ZERO,
                health: 100.0,
                movement_points: 100.0,
                is_my_turn: false,
                alive: true,
                available_weapons: Vec::new(),
                current_weapon_index: 0,
                current_weapon: None,
            });
        }
        for id in [1, 2] {
            observer.apply_server_message(ServerMessage::WeaponAim {
                character: EntityId(id),
                direction: Vec3::Z,
            });
        }
        assert_eq!(observer.character(EntityId(1)).unwrap().aim(), Vec3::X);
        assert_eq!(observer.character(EntityId(2)).unwrap().aim(), Vec3::Z);
    }
}
