//! Player requests
//!
//! Every request enters through [`MatchSession::submit`]. On an observer it
//! is queued for the authority (aim is coalesced and rate limited); on the
//! authority it is validated against the live state and applied.

use bevy::math::{Vec2, Vec3};

use super::MatchSession;
use crate::error::GameError;
use crate::events::GameEvent;
use crate::ids::PlayerId;
use crate::replication::{Channel, ClientMessage, Envelope};

impl MatchSession {
    /// Route a request for `player` to wherever it can be decided
    pub fn submit(&mut self, player: PlayerId, message: ClientMessage) -> Result<(), GameError> {
        if self.role.is_authority() {
            return self.handle_client_message(player, message);
        }
        if self.local_player != Some(player) {
            return Err(GameError::NotAuthoritative("submit for a remote player"));
        }
        match message {
            ClientMessage::Aim { direction } => {
                // keep the local view responsive; the authority hears it later
                if let Some(id) = self.character_id_of(player) {
                    if let Some(character) = self.characters.get_mut(&id) {
                        character.set_aim(direction);
                    }
                }
                self.pending_aim = Some(direction);
            }
            other => {
                self.requests.push(other);
            }
        }
        Ok(())
    }

    pub fn move_character(&mut self, player: PlayerId, position: Vec3) -> Result<(), GameError> {
        self.submit(player, ClientMessage::Move { position })
    }

    pub fn set_aim(&mut self, player: PlayerId, direction: Vec3) -> Result<(), GameError> {
        self.submit(player, ClientMessage::Aim { direction })
    }

    pub fn request_end_turn(&mut self, player: PlayerId) -> Result<(), GameError> {
        self.submit(player, ClientMessage::EndTurn)
    }

    pub fn fire(&mut self, player: PlayerId) -> Result<(), GameError> {
        self.submit(player, ClientMessage::Fire)
    }

    pub fn switch_weapon(&mut self, player: PlayerId, index: usize) -> Result<(), GameError> {
        self.submit(player, ClientMessage::SwitchWeapon { index })
    }

    pub fn next_weapon(&mut self, player: PlayerId) -> Result<(), GameError> {
        self.submit(player, ClientMessage::NextWeapon)
    }

    pub fn previous_weapon(&mut self, player: PlayerId) -> Result<(), GameError> {
        self.submit(player, ClientMessage::PreviousWeapon)
    }

    /// `delta` is in power steps
    pub fn adjust_power(&mut self, player: PlayerId, delta: f32) -> Result<(), GameError> {
        self.submit(player, ClientMessage::AdjustPower { delta })
    }

    /// Terrain-local (X, Z) rectangle
    pub fn request_destroy_terrain_at(
        &mut self,
        player: PlayerId,
        position: Vec2,
        size: Vec2,
    ) -> Result<(), GameError> {
        self.submit(player, ClientMessage::DestroyTerrain { position, size })
    }

    /// Local preview toggle; never replicated
    pub fn set_show_trajectory(&mut self, player: PlayerId, show: bool) -> Result<(), GameError> {
        let weapon_id = self
            .get_worm_character_from_controller(player)
            .ok_or(GameError::MissingCharacter(player))?
            .current_weapon
            .ok_or(GameError::NoWeapon)?;
        let weapon = self
            .weapons
            .get_mut(&weapon_id)
            .ok_or(GameError::MissingEntity(weapon_id))?;
        weapon.set_show_trajectory(show);
        Ok(())
    }

    /// Predicted arc for the local player's own active weapon
    pub fn trajectory_preview(&self, player: PlayerId) -> Option<Vec<Vec3>> {
        if self.role.is_authority() {
            if self.local_player.is_some_and(|p| p != player) {
                return None;
            }
        } else if self.local_player != Some(player) {
            return None;
        }
        let character = self.get_worm_character_from_controller(player)?;
        if !character.is_my_turn() || !character.is_alive() {
            return None;
        }
        let weapon = self.weapons.get(&character.current_weapon?)?;
        weapon
            .shows_trajectory()
            .then(|| weapon.trajectory(&self.config.projectile))
    }

    // ------------------------------------------------------------------
    // Authority
    // ------------------------------------------------------------------

    /// Frame arriving from an observer's link. Repeated reliable frames are
    /// dropped.
    pub fn receive_client(&mut self, player: PlayerId, envelope: Envelope<ClientMessage>) {
        if envelope.channel == Channel::Reliable {
            let last = self.client_seqs.get(&player).copied();
            if last.is_some_and(|seq| envelope.seq <= seq) {
                tracing::trace!(%player, seq = envelope.seq, "duplicate request dropped");
                return;
            }
            self.client_seqs.insert(player, envelope.seq);
        }
        self.inbound_client.push((player, envelope.payload));
    }

    pub(super) fn process_client_messages(&mut self) {
        for (player, message) in std::mem::take(&mut self.inbound_client) {
            if let Err(e) = self.handle_client_message(player, message) {
                tracing::warn!(%player, "request rejected: {e}");
            }
        }
    }

    fn handle_client_message(&mut self, player: PlayerId, message: ClientMessage) -> Result<(), GameError> {
        if self.game_over.is_some() {
            return Err(GameError::GameOver);
        }
        tracing::trace!(%player, ?message, "client request");
        match message {
            ClientMessage::DestroyTerrain { position, size } => {
                let terrain = self.terrain.as_mut().ok_or(GameError::TerrainNotInitialized)?;
                let outcome = terrain.request_destroy_terrain_at(position, size);
                tracing::debug!(%player, ?outcome, "terrain destruction requested");
                Ok(())
            }
            ClientMessage::EndTurn => {
                let character = self
                    .get_worm_character_from_controller(player)
                    .ok_or(GameError::MissingCharacter(player))?;
                if !character.is_my_turn() {
                    return Err(GameError::NotYourTurn(player));
                }
                self.end_current_turn();
                Ok(())
            }
            ClientMessage::Fire => self.fire_for(player).map(|_| ()),
            ClientMessage::SwitchWeapon { index } => self.switch_weapon_for(player, index),
            ClientMessage::NextWeapon => {
                let index = self
                    .get_worm_character_from_controller(player)
                    .ok_or(GameError::MissingCharacter(player))?
                    .next_weapon_index()
                    .ok_or(GameError::NoWeapon)?;
                self.switch_weapon_for(player, index)
            }
            ClientMessage::PreviousWeapon => {
                let index = self
                    .get_worm_character_from_controller(player)
                    .ok_or(GameError::MissingCharacter(player))?
                    .previous_weapon_index()
                    .ok_or(GameError::NoWeapon)?;
                self.switch_weapon_for(player, index)
            }
            ClientMessage::AdjustPower { delta } => {
                let weapon_id = self
                    .get_worm_character_from_controller(player)
                    .ok_or(GameError::MissingCharacter(player))?
                    .current_weapon
                    .ok_or(GameError::NoWeapon)?;
                let weapon = self
                    .weapons
                    .get_mut(&weapon_id)
                    .ok_or(GameError::MissingEntity(weapon_id))?;
                let normalized = weapon.adjust_power(delta);
                self.publish(GameEvent::PowerChanged {
                    weapon: weapon_id,
                    normalized,
                });
                Ok(())
            }
            ClientMessage::Aim { direction } => {
                let id = self
                    .character_id_of(player)
                    .ok_or(GameError::MissingCharacter(player))?;
                let character = self
                    .characters
                    .get_mut(&id)
                    .ok_or(GameError::MissingCharacter(player))?;
                if !character.is_alive() {
                    return Err(GameError::Dead);
                }
                character.set_aim(direction);
                let (position, aim) = (character.position, character.aim());
                if let Some(weapon) = character
                    .current_weapon
                    .and_then(|w| self.weapons.get_mut(&w))
                {
                    weapon.set_muzzle(position, aim);
                }
                Ok(())
            }
            ClientMessage::Move { position } => {
                let id = self
                    .character_id_of(player)
                    .ok_or(GameError::MissingCharacter(player))?;
                self.characters
                    .get_mut(&id)
                    .ok_or(GameError::MissingCharacter(player))?
                    .try_move(position)
                    .map(|_| ())
            }
        }
    }
}
