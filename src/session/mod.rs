//! Match Session
//!
//! One running match on one process. The authority session owns every
//! gameplay collection and decides; observer sessions hold replicas and
//! forward requests. Both step in the same fixed order:
//!
//! ```text
//!  tick(dt):  input ──► movement ──► tasks / projectiles / lod ──► flush
//! ```
//!
//! Submodules split the session by concern:
//! - `commands`: player requests and their authoritative validation
//! - `turns`: turn rotation, timers and game over
//! - `combat`: weapons, firing, projectiles and detonation
//! - `sync`: outgoing snapshots and incoming replica updates
//! - `plugin`: the Bevy bridge

mod combat;
mod commands;
pub mod plugin;
mod sync;
mod turns;

use std::collections::BTreeMap;

use bevy::math::Vec3;
use bevy::prelude::Resource;

use crate::character::WormCharacter;
use crate::config::MatchConfig;
use crate::error::GameError;
use crate::events::{EventBus, GameEvent};
use crate::ids::{EntityId, IdAllocator, PlayerId};
use crate::projectile::{Projectile, ProjectileSnapshot};
use crate::replication::{ClientMessage, NetRole, Outbox, ServerMessage, SnapshotCache};
use crate::tasks::{ScheduledTask, TaskHandle, TaskOp, TaskQueue};
use crate::terrain::DestructibleTerrain;
use crate::turn::{Participant, TurnPhase, TurnScheduler, TurnState};
use crate::weapon::Weapon;

pub use plugin::{CoreEvent, WormsCorePlugin};

/// A connected participant
#[derive(Debug, Clone, PartialEq)]
pub struct Controller {
    pub player: PlayerId,
    pub name: String,
    pub character: Option<EntityId>,
}

#[derive(Resource)]
pub struct MatchSession {
    role: NetRole,
    config: MatchConfig,
    ids: IdAllocator,
    /// Target of match-level tasks (startup, turn timers)
    mode_id: EntityId,
    tasks: TaskQueue,
    events: EventBus,
    terrain: Option<DestructibleTerrain>,
    controllers: Vec<Controller>,
    characters: BTreeMap<EntityId, WormCharacter>,
    weapons: BTreeMap<EntityId, Weapon>,
    projectiles: BTreeMap<EntityId, Projectile>,
    /// Observer-side projectile replicas
    projectile_views: BTreeMap<EntityId, ProjectileSnapshot>,
    scheduler: TurnScheduler,
    turn_state: TurnState,
    turn_timer: Option<TaskHandle>,
    outbox: Outbox<ServerMessage>,
    requests: Outbox<ClientMessage>,
    inbound_client: Vec<(PlayerId, ClientMessage)>,
    inbound_server: Vec<ServerMessage>,
    /// Highest reliable sequence applied, per sender
    server_seq: Option<u64>,
    client_seqs: BTreeMap<PlayerId, u64>,
    local_player: Option<PlayerId>,
    pending_aim: Option<Vec3>,
    sent: SnapshotCache,
    last_turn_sync: Option<TurnState>,
    terrain_announced: bool,
    tick_count: u64,
    game_over: Option<Option<PlayerId>>,
    started: bool,
}

impl MatchSession {
    fn new(role: NetRole, config: MatchConfig, local_player: Option<PlayerId>) -> Self {
        let mut ids = IdAllocator::default();
        let mode_id = ids.entity();
        let turn_state = TurnState::new(config.turn.turn_duration);
        Self {
            role,
            config,
            ids,
            mode_id,
            tasks: TaskQueue::new(),
            events: EventBus::new(),
            terrain: None,
            controllers: Vec::new(),
            characters: BTreeMap::new(),
            weapons: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            projectile_views: BTreeMap::new(),
            scheduler: TurnScheduler::new(),
            turn_state,
            turn_timer: None,
            outbox: Outbox::new(),
            requests: Outbox::new(),
            inbound_client: Vec::new(),
            inbound_server: Vec::new(),
            server_seq: None,
            client_seqs: BTreeMap::new(),
            local_player,
            pending_aim: None,
            sent: SnapshotCache::new(),
            last_turn_sync: None,
            terrain_announced: false,
            tick_count: 0,
            game_over: None,
            started: false,
        }
    }

    pub fn authority(config: MatchConfig) -> Self {
        Self::new(NetRole::Authority, config, None)
    }

    /// Replica session for `local_player`, who joined through the authority
    pub fn observer(config: MatchConfig, local_player: PlayerId) -> Self {
        Self::new(NetRole::Observer, config, Some(local_player))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn role(&self) -> NetRole {
        self.role
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn local_player(&self) -> Option<PlayerId> {
        self.local_player
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn terrain(&self) -> Option<&DestructibleTerrain> {
        self.terrain.as_ref()
    }

    pub fn terrain_mut(&mut self) -> Option<&mut DestructibleTerrain> {
        self.terrain.as_mut()
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub fn character(&self, id: EntityId) -> Option<&WormCharacter> {
        self.characters.get(&id)
    }

    pub fn characters(&self) -> impl Iterator<Item = &WormCharacter> {
        self.characters.values()
    }

    pub fn weapon(&self, id: EntityId) -> Option<&Weapon> {
        self.weapons.get(&id)
    }

    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    pub fn projectile_views(&self) -> impl Iterator<Item = &ProjectileSnapshot> {
        self.projectile_views.values()
    }

    pub fn turn_state(&self) -> &TurnState {
        &self.turn_state
    }

    pub fn scheduler(&self) -> &TurnScheduler {
        &self.scheduler
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    pub fn now(&self) -> f64 {
        self.tasks.now()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over.is_some()
    }

    /// `Some(winner)` once the match has ended
    pub fn winner(&self) -> Option<Option<PlayerId>> {
        self.game_over
    }

    /// Character currently holding the turn
    pub fn active_character(&self) -> Option<&WormCharacter> {
        self.characters.values().find(|c| c.is_my_turn())
    }

    /// Lookup primitive used throughout. Stale or unknown players yield `None`.
    pub fn get_worm_character_from_controller(&self, player: PlayerId) -> Option<&WormCharacter> {
        self.character_id_of(player)
            .and_then(|id| self.characters.get(&id))
    }

    fn character_id_of(&self, player: PlayerId) -> Option<EntityId> {
        self.controllers
            .iter()
            .find(|c| c.player == player)
            .and_then(|c| c.character)
            .or_else(|| {
                self.characters
                    .values()
                    .find(|c| c.player == player)
                    .map(|c| c.id)
            })
    }

    fn publish(&mut self, event: GameEvent) {
        self.events.publish(event);
    }

    /// Ordered view of the controllers for the turn scheduler
    pub fn roster(&self) -> Vec<Participant> {
        self.controllers
            .iter()
            .map(|c| Participant {
                player: c.player,
                name: c.name.clone(),
                character: c.character,
                alive: c
                    .character
                    .and_then(|id| self.characters.get(&id))
                    .is_some_and(|ch| ch.is_alive()),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Arm the startup timeline (authority only)
    pub fn start(&mut self) -> Result<(), GameError> {
        if !self.role.is_authority() {
            return Err(GameError::NotAuthoritative("start"));
        }
        if self.started {
            return Ok(());
        }
        self.started = true;
        let startup = self.config.startup.clone();
        self.tasks
            .schedule(startup.terrain_spawn_delay, self.mode_id, TaskOp::SpawnTerrain);
        self.tasks
            .schedule(startup.weapon_assign_delay, self.mode_id, TaskOp::AssignWeapons);
        self.tasks
            .schedule(startup.weapon_recheck_delay, self.mode_id, TaskOp::RecheckWeapons);
        self.tasks
            .schedule(startup.first_turn_delay, self.mode_id, TaskOp::StartNextTurn);
        tracing::info!("match started");
        Ok(())
    }

    /// Register a controller and spawn its character
    pub fn add_player(&mut self, name: impl Into<String>, spawn: Vec3) -> Result<PlayerId, GameError> {
        if !self.role.is_authority() {
            return Err(GameError::NotAuthoritative("add_player"));
        }
        let name = name.into();
        let player = self.ids.player();
        let character_id = self.ids.entity();
        let character = WormCharacter::new(
            character_id,
            player,
            name.clone(),
            spawn,
            &self.config.character,
            self.config.replication.aim_send_interval,
        );
        self.characters.insert(character_id, character);
        self.controllers.push(Controller {
            player,
            name: name.clone(),
            character: Some(character_id),
        });
        self.turn_state.update_roster(&self.roster());
        if self.started {
            self.tasks.schedule(
                self.config.startup.weapon_assign_delay,
                character_id,
                TaskOp::AssignWeapons,
            );
        }
        // late joiners need the full picture
        self.sent.clear();
        self.last_turn_sync = None;
        if let Some(terrain) = self.terrain.as_mut() {
            terrain.mark_dirty();
            if terrain.is_initialized() {
                self.outbox.push(ServerMessage::TerrainInitialized);
            }
        }
        tracing::info!(%player, %name, character = %character_id, "player joined");
        Ok(player)
    }

    /// Drop a controller and everything it owns
    pub fn remove_player(&mut self, player: PlayerId) -> Result<(), GameError> {
        if !self.role.is_authority() {
            return Err(GameError::NotAuthoritative("remove_player"));
        }
        let index = self
            .controllers
            .iter()
            .position(|c| c.player == player)
            .ok_or(GameError::MissingCharacter(player))?;
        let controller = self.controllers.remove(index);
        self.client_seqs.remove(&player);
        self.scheduler.participant_removed(index, self.controllers.len());

        if let Some(character_id) = controller.character {
            let was_active = self.scheduler.active_character() == Some(character_id);
            if was_active {
                self.end_current_turn();
            }
            self.destroy_character(character_id);
        }
        self.turn_state.update_roster(&self.roster());
        if let Some(i) = self.scheduler.current_index() {
            if matches!(self.scheduler.phase(), TurnPhase::Active { .. }) {
                self.turn_state.set_current_player_by_index(Some(i));
            }
        }
        tracing::info!(%player, "player left");
        Ok(())
    }

    fn destroy_character(&mut self, id: EntityId) {
        if let Some(character) = self.characters.remove(&id) {
            if let Some(weapon) = character.current_weapon {
                self.destroy_weapon(weapon);
            }
            self.tasks.cancel_target(id);
            self.sent.forget(id);
            self.outbox.push(ServerMessage::CharacterRemoved(id));
        }
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance one frame in the fixed order
    pub fn tick(&mut self, delta_seconds: f32) {
        self.tick_count += 1;

        // input
        match self.role {
            NetRole::Authority => self.process_client_messages(),
            NetRole::Observer => self.process_server_messages(),
        }

        // movement
        self.update_movement();

        // gameplay
        self.tasks.advance(delta_seconds);
        if self.role.is_authority() {
            self.run_due_tasks();
            self.step_projectiles(delta_seconds);
            self.update_turn_countdown();
            let viewpoints: Vec<Vec3> = self
                .characters
                .values()
                .filter(|c| c.is_alive())
                .map(|c| c.position)
                .collect();
            if let Some(terrain) = self.terrain.as_mut() {
                terrain.update_lod(delta_seconds, &viewpoints);
            }
        }

        // network
        self.flush();
    }

    fn update_movement(&mut self) {
        let auto_end_delay = self.config.turn.auto_end_delay;
        let authority = self.role.is_authority();
        for character in self.characters.values_mut() {
            if authority {
                character.update_movement(&mut self.tasks, auto_end_delay);
            }
            if let Some(weapon) = character
                .current_weapon
                .and_then(|id| self.weapons.get_mut(&id))
            {
                weapon.set_muzzle(character.position, character.aim());
            }
        }
    }

    fn run_due_tasks(&mut self) {
        while let Some(task) = self.tasks.pop_due() {
            self.run_task(task);
        }
    }

    fn run_task(&mut self, task: ScheduledTask) {
        tracing::trace!(op = ?task.op, target = %task.target, "task due");
        match task.op {
            TaskOp::SpawnTerrain => self.spawn_terrain(),
            TaskOp::InitializeTerrain => self.initialize_terrain(),
            TaskOp::AssignWeapons => self.assign_weapons(task.target),
            TaskOp::RecheckWeapons => self.recheck_weapons(),
            TaskOp::SpawnWeapon => self.spawn_current_weapon(task.target),
            TaskOp::FinishReload => self.finish_reload(task.target),
            TaskOp::StartNextTurn => {
                self.start_next_turn();
            }
            TaskOp::TurnTimeout => {
                self.turn_timer = None;
                tracing::info!("turn time expired");
                self.end_current_turn();
            }
            TaskOp::AutoEndTurn => self.auto_end_turn(task.target),
            TaskOp::ArmProjectileCollision => {
                if let Some(p) = self.projectiles.get_mut(&task.target) {
                    p.activate_collision();
                }
            }
            TaskOp::DetonateProjectile => {
                if let Some(position) = self.projectiles.get(&task.target).map(|p| p.position) {
                    self.detonate(task.target, position);
                }
            }
            TaskOp::CheckStuckProjectile => self.check_stuck(task.target),
            TaskOp::ExpireProjectile => {
                if self.projectiles.contains_key(&task.target) {
                    tracing::debug!(projectile = %task.target, "projectile lifespan over");
                    self.destroy_projectile(task.target);
                }
            }
        }
    }

    fn spawn_terrain(&mut self) {
        if self.terrain.is_some() {
            return;
        }
        let id = self.ids.entity();
        self.terrain = Some(DestructibleTerrain::new(id, self.role, &self.config));
        self.tasks
            .schedule(self.config.startup.terrain_init_delay, id, TaskOp::InitializeTerrain);
        tracing::debug!(terrain = %id, "terrain spawned");
    }

    fn initialize_terrain(&mut self) {
        let Some(terrain) = self.terrain.as_mut() else {
            tracing::warn!("terrain init fired without a terrain");
            return;
        };
        match terrain.initialize_terrain() {
            Ok(()) => {
                self.terrain_announced = true;
                self.publish(GameEvent::TerrainInitialized);
            }
            Err(e) => tracing::warn!("terrain init rejected: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_players(n: usize) -> (MatchSession, Vec<PlayerId>) {
        let mut session = MatchSession::authority(MatchConfig::default());
        let players = (0..n)
            .map(|i| {
                session
                    .add_player(format!("P{i}"), Vec3::new(300.0 * (i as f32 + 1.0), 0.0, 2000.0))
                    .unwrap()
            })
            .collect();
        (session, players)
    }

    fn run(session: &mut MatchSession, seconds: f32) {
        let dt = 1.0 / 60.0;
        for _ in 0..(seconds / dt).round() as usize {
            session.tick(dt);
        }
    }

    #[test]
    fn test_startup_timeline() {
        let (mut s, players) = session_with_players(2);
        s.start().unwrap();
        run(&mut s, 1.5);
        assert!(s.terrain().is_none());
        let c = s.get_worm_character_from_controller(players[0]).unwrap();
        assert_eq!(c.available_weapons().len(), 3);

        run(&mut s, 1.5);
        assert!(s.terrain().is_some_and(|t| t.is_initialized()));
        // first turn went to the first controller at 2s
        assert!(s.get_worm_character_from_controller(players[0]).unwrap().is_my_turn());
        assert!(s
            .get_worm_character_from_controller(players[0])
            .unwrap()
            .current_weapon
            .is_some());
    }

    #[test]
    fn test_observer_cannot_start_or_add() {
        let mut s = MatchSession::observer(MatchConfig::default(), PlayerId(0));
        assert!(s.start().is_err());
        assert!(s.add_player("X", Vec3::ZERO).is_err());
    }

    #[test]
    fn test_unknown_controller_is_none() {
        let (s, _) = session_with_players(1);
        assert!(s.get_worm_character_from_controller(PlayerId(99)).is_none());
    }

    #[test]
    fn test_remove_active_player_passes_turn() {
        let (mut s, players) = session_with_players(3);
        s.start().unwrap();
        run(&mut s, 2.1);
        assert_eq!(s.turn_state().current_player_name(), "P0");
        s.remove_player(players[0]).unwrap();
        assert!(s.get_worm_character_from_controller(players[0]).is_none());
        run(&mut s, 2.1);
        assert_eq!(s.turn_state().current_player_name(), "P1");
        assert_eq!(s.controllers().len(), 2);
    }
}
