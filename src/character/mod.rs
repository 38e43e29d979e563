//! Character Combat State
//!
//! Health, the per-turn movement budget and the weapon inventory of one
//! participant's character. Mutators that the authority owns take the
//! caller's [`NetRole`] and refuse on observers.
//!
//! ```text
//!  set_is_my_turn(true) ──► movement = max, last position = here
//!          │
//!   update_movement(pos) ──► points -= dist2d * cost   (floored at 0)
//!          │                       │
//!          │              crossed 0? arm AutoEndTurn once
//!          ▼
//!  set_is_my_turn(false) ──► cancel pending AutoEndTurn
//! ```

use bevy::math::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::CharacterConfig;
use crate::constants::MOVEMENT_POINTS_EPSILON;
use crate::error::GameError;
use crate::ids::{EntityId, PlayerId};
use crate::replication::{NetRole, RateLimiter};
use crate::tasks::{TaskHandle, TaskOp, TaskQueue};
use crate::weapon::WeaponKind;

/// Result of one damage application
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOutcome {
    pub dealt: f32,
    pub health: f32,
    pub impulse: Vec3,
    /// This hit took the character from alive to dead
    pub died: bool,
}

/// Result of one movement sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovementStep {
    pub spent: f32,
    pub remaining: f32,
    /// The budget crossed from positive to zero on this sample
    pub exhausted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub id: EntityId,
    pub player: PlayerId,
    pub name: String,
    pub position: Vec3,
    pub health: f32,
    pub movement_points: f32,
    pub is_my_turn: bool,
    pub alive: bool,
    pub available_weapons: Vec<WeaponKind>,
    pub current_weapon_index: usize,
    pub current_weapon: Option<EntityId>,
}

#[derive(Debug, Clone)]
pub struct WormCharacter {
    pub id: EntityId,
    pub player: PlayerId,
    pub name: String,
    pub position: Vec3,
    health: f32,
    movement_points: f32,
    is_my_turn: bool,
    collision_enabled: bool,
    movement_enabled: bool,
    last_position: Option<Vec3>,
    auto_end_task: Option<TaskHandle>,
    available_weapons: Vec<WeaponKind>,
    current_weapon_index: usize,
    pub current_weapon: Option<EntityId>,
    last_fire_time: Option<f64>,
    aim: Vec3,
    pub aim_limiter: RateLimiter,
    pending_impulse: Vec3,
    config: CharacterConfig,
}

impl WormCharacter {
    pub fn new(
        id: EntityId,
        player: PlayerId,
        name: impl Into<String>,
        position: Vec3,
        config: &CharacterConfig,
        aim_send_interval: u32,
    ) -> Self {
        Self {
            id,
            player,
            name: name.into(),
            position,
            health: config.max_health,
            movement_points: config.max_movement_points,
            is_my_turn: false,
            collision_enabled: true,
            movement_enabled: true,
            last_position: None,
            auto_end_task: None,
            available_weapons: Vec::new(),
            current_weapon_index: 0,
            current_weapon: None,
            last_fire_time: None,
            aim: Vec3::X,
            aim_limiter: RateLimiter::new(aim_send_interval),
            pending_impulse: Vec3::ZERO,
            config: config.clone(),
        }
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn is_my_turn(&self) -> bool {
        self.is_my_turn
    }

    pub fn movement_points(&self) -> f32 {
        self.movement_points
    }

    pub fn collision_enabled(&self) -> bool {
        self.collision_enabled
    }

    pub fn movement_enabled(&self) -> bool {
        self.movement_enabled
    }

    pub fn auto_end_pending(&self) -> bool {
        self.auto_end_task.is_some()
    }

    pub fn aim(&self) -> Vec3 {
        self.aim
    }

    pub fn set_aim(&mut self, direction: Vec3) {
        let dir = direction.normalize_or_zero();
        if dir != Vec3::ZERO {
            self.aim = dir;
        }
    }

    /// Flip the turn flag. Returns whether it changed.
    pub fn set_is_my_turn(
        &mut self,
        role: NetRole,
        value: bool,
        tasks: &mut TaskQueue,
    ) -> Result<bool, GameError> {
        if !role.is_authority() {
            return Err(GameError::NotAuthoritative("set_is_my_turn"));
        }
        let changed = self.is_my_turn != value;
        self.is_my_turn = value;
        if value {
            self.movement_points = self.config.max_movement_points;
            self.last_position = Some(self.position);
        } else {
            self.cancel_auto_end(tasks);
        }
        Ok(changed)
    }

    pub fn cancel_auto_end(&mut self, tasks: &mut TaskQueue) {
        if let Some(handle) = self.auto_end_task.take() {
            tasks.cancel(handle);
        }
    }

    /// The pending auto-end fired; clears the guard so a later turn can arm again
    pub fn auto_end_fired(&mut self) {
        self.auto_end_task = None;
    }

    pub fn apply_damage(
        &mut self,
        role: NetRole,
        amount: f32,
        direction: Vec3,
    ) -> Result<DamageOutcome, GameError> {
        if !role.is_authority() {
            return Err(GameError::NotAuthoritative("apply_damage"));
        }
        let was_alive = self.is_alive();
        let before = self.health;
        self.health = (self.health - amount.max(0.0)).max(0.0);
        let dealt = before - self.health;
        let impulse = direction.normalize_or_zero() * amount * self.config.knockback_per_damage;
        self.pending_impulse += impulse;
        let died = was_alive && !self.is_alive();
        if !self.is_alive() {
            self.collision_enabled = false;
            self.movement_enabled = false;
        }
        Ok(DamageOutcome {
            dealt,
            health: self.health,
            impulse,
            died,
        })
    }

    /// Knockback accumulated since the last call, for the host physics
    pub fn take_impulse(&mut self) -> Vec3 {
        std::mem::take(&mut self.pending_impulse)
    }

    /// Move, if allowed this turn. The horizontal step, measured from the
    /// last charged position, is cut short where the budget runs out; height
    /// is taken as requested. Returns where the character ended up.
    pub fn try_move(&mut self, position: Vec3) -> Result<Vec3, GameError> {
        if !self.is_alive() || !self.movement_enabled {
            return Err(GameError::Dead);
        }
        if !self.is_my_turn {
            return Err(GameError::NotYourTurn(self.player));
        }
        if self.movement_points <= 0.0 {
            return Err(GameError::NoMovementPoints);
        }
        let anchor = self.last_position.unwrap_or(self.position);
        let requested = Vec2::new(position.x - anchor.x, position.y - anchor.y);
        let cost = self.config.movement_cost_per_unit;
        let step = if cost > 0.0 {
            requested.clamp_length_max(self.movement_points / cost)
        } else {
            requested
        };
        if step != requested {
            tracing::debug!(
                character = %self.id,
                requested = requested.length(),
                allowed = step.length(),
                "move clamped to movement budget"
            );
        }
        self.position = Vec3::new(anchor.x + step.x, anchor.y + step.y, position.z);
        Ok(self.position)
    }

    /// Charge the distance travelled since the last sample against the
    /// budget. Crossing to zero arms one auto-end task.
    pub fn update_movement(&mut self, tasks: &mut TaskQueue, auto_end_delay: f32) -> MovementStep {
        if !self.is_my_turn || !self.is_alive() {
            return MovementStep {
                remaining: self.movement_points,
                ..Default::default()
            };
        }
        let last = self.last_position.unwrap_or(self.position);
        self.last_position = Some(self.position);
        let distance = Vec2::new(self.position.x - last.x, self.position.y - last.y).length();
        let before = self.movement_points;
        self.movement_points =
            (self.movement_points - distance * self.config.movement_cost_per_unit).max(0.0);
        if self.movement_points < MOVEMENT_POINTS_EPSILON {
            self.movement_points = 0.0;
        }

        let exhausted = before > 0.0 && self.movement_points <= 0.0;
        if exhausted && self.auto_end_task.is_none() {
            self.auto_end_task = Some(tasks.schedule(auto_end_delay, self.id, TaskOp::AutoEndTurn));
            tracing::debug!(character = %self.id, "movement exhausted, auto end armed");
        }
        MovementStep {
            spent: before - self.movement_points,
            remaining: self.movement_points,
            exhausted,
        }
    }

    // ------------------------------------------------------------------
    // Weapon inventory
    // ------------------------------------------------------------------

    pub fn available_weapons(&self) -> &[WeaponKind] {
        &self.available_weapons
    }

    pub fn current_weapon_index(&self) -> usize {
        self.current_weapon_index
    }

    /// Kind at the current index, if the inventory is not empty
    pub fn current_weapon_kind(&self) -> Option<WeaponKind> {
        self.available_weapons.get(self.current_weapon_index).copied()
    }

    pub fn set_available_weapons(&mut self, weapons: Vec<WeaponKind>) {
        self.available_weapons = weapons;
        if self.current_weapon_index >= self.available_weapons.len() {
            self.current_weapon_index = 0;
        }
    }

    /// Validate and select an inventory slot
    pub fn select_weapon(&mut self, index: usize) -> Result<WeaponKind, GameError> {
        let kind = self
            .available_weapons
            .get(index)
            .copied()
            .ok_or(GameError::InvalidWeaponIndex {
                index,
                count: self.available_weapons.len(),
            })?;
        self.current_weapon_index = index;
        Ok(kind)
    }

    pub fn next_weapon_index(&self) -> Option<usize> {
        let n = self.available_weapons.len();
        (n > 0).then(|| (self.current_weapon_index + 1) % n)
    }

    pub fn previous_weapon_index(&self) -> Option<usize> {
        let n = self.available_weapons.len();
        (n > 0).then(|| (self.current_weapon_index + n - 1) % n)
    }

    /// Turn, weapon and cooldown checks before a shot
    pub fn can_fire(&self, now: f64) -> Result<EntityId, GameError> {
        if !self.is_alive() {
            return Err(GameError::Dead);
        }
        if !self.is_my_turn {
            return Err(GameError::NotYourTurn(self.player));
        }
        let weapon = self.current_weapon.ok_or(GameError::NoWeapon)?;
        if let Some(last) = self.last_fire_time {
            let elapsed = (now - last) as f32;
            if elapsed < self.config.weapon_cooldown {
                return Err(GameError::WeaponCooldown {
                    remaining: self.config.weapon_cooldown - elapsed,
                });
            }
        }
        Ok(weapon)
    }

    pub fn record_fire(&mut self, now: f64) {
        self.last_fire_time = Some(now);
    }

    // ------------------------------------------------------------------
    // Replication
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> CharacterSnapshot {
        CharacterSnapshot {
            id: self.id,
            player: self.player,
            name: self.name.clone(),
            position: self.position,
            health: self.health,
            movement_points: self.movement_points,
            is_my_turn: self.is_my_turn,
            alive: self.is_alive(),
            available_weapons: self.available_weapons.clone(),
            current_weapon_index: self.current_weapon_index,
            current_weapon: self.current_weapon,
        }
    }

    pub fn from_snapshot(snapshot: &CharacterSnapshot, config: &CharacterConfig, aim_send_interval: u32) -> Self {
        let mut character = Self::new(
            snapshot.id,
            snapshot.player,
            snapshot.name.clone(),
            snapshot.position,
            config,
            aim_send_interval,
        );
        character.apply_snapshot(snapshot);
        character
    }

    /// Replace replicated fields wholesale
    pub fn apply_snapshot(&mut self, snapshot: &CharacterSnapshot) {
        self.name = snapshot.name.clone();
        self.position = snapshot.position;
        self.health = snapshot.health;
        self.movement_points = snapshot.movement_points;
        self.is_my_turn = snapshot.is_my_turn;
        self.collision_enabled = snapshot.alive;
        self.movement_enabled = snapshot.alive;
        self.available_weapons = snapshot.available_weapons.clone();
        self.current_weapon_index = snapshot.current_weapon_index;
        self.current_weapon = snapshot.current_weapon;
    }
}
