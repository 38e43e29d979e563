//! Turn control on the authority: rotation, countdown, end triggers and the
//! terminal game-over transition.

use super::MatchSession;
use crate::events::GameEvent;
use crate::ids::{EntityId, PlayerId};
use crate::replication::ServerMessage;
use crate::tasks::TaskOp;
use crate::turn::{check_game_end_condition, TurnDecision};

impl MatchSession {
    /// Hand the turn to the next living participant
    pub fn start_next_turn(&mut self) -> TurnDecision {
        if !self.role.is_authority() {
            tracing::warn!("start_next_turn ignored on observer");
            return TurnDecision::NoControllers;
        }
        if let Some(winner) = self.game_over {
            return TurnDecision::GameOver { winner };
        }
        if let Some(pending) = self.tasks.pending_for(self.mode_id, TaskOp::StartNextTurn) {
            self.tasks.cancel(pending);
        }
        let roster = self.roster();
        self.turn_state.update_roster(&roster);
        let decision = self.scheduler.start_next_turn(&roster);
        match decision {
            TurnDecision::NoControllers | TurnDecision::AwaitingPlayers | TurnDecision::NoEligible => {
                tracing::debug!(?decision, "no turn to start, retrying later");
                self.schedule_next_turn();
            }
            TurnDecision::GameOver { winner } => self.enter_game_over(winner),
            TurnDecision::Started {
                index,
                player,
                character,
            } => {
                let ids: Vec<EntityId> = self.characters.keys().copied().collect();
                for id in ids {
                    self.set_turn_flag(id, id == character);
                }
                let previous_name = self.turn_state.current_player_name().to_string();
                self.turn_state.set_current_player_by_index(Some(index));
                self.turn_state.remaining_turn_time = self.config.turn.turn_duration;
                if let Some(timer) = self.turn_timer.take() {
                    self.tasks.cancel(timer);
                }
                self.turn_timer = Some(self.tasks.schedule(
                    self.config.turn.turn_duration,
                    self.mode_id,
                    TaskOp::TurnTimeout,
                ));
                tracing::info!(%player, %character, index, "turn started");
                self.publish(GameEvent::TurnStarted {
                    player,
                    character,
                    index,
                });
                let name = self.turn_state.current_player_name().to_string();
                if name != previous_name {
                    self.publish(GameEvent::CurrentPlayerChanged { name });
                }
            }
        }
        decision
    }

    /// Close the active turn and queue the next one after the grace delay.
    /// False if no turn was active.
    pub fn end_current_turn(&mut self) -> bool {
        if !self.role.is_authority() {
            tracing::warn!("end_current_turn ignored on observer");
            return false;
        }
        let Some(previous) = self.scheduler.end_current_turn() else {
            tracing::debug!("end_current_turn with no active turn");
            return false;
        };
        if let Some(timer) = self.turn_timer.take() {
            self.tasks.cancel(timer);
        }
        let player = previous.and_then(|id| self.characters.get(&id)).map(|c| c.player);
        match previous {
            Some(id) if self.characters.contains_key(&id) => self.set_turn_flag(id, false),
            _ => tracing::debug!("turn ended for a character that is gone"),
        }
        self.turn_state.remaining_turn_time = 0.0;
        tracing::info!(player = ?player, "turn ended");
        self.publish(GameEvent::TurnEnded { player });
        self.schedule_next_turn();
        true
    }

    /// At most one participant still alive
    pub fn check_game_end_condition(&self) -> bool {
        check_game_end_condition(&self.roster())
    }

    fn schedule_next_turn(&mut self) {
        if self.tasks.pending_for(self.mode_id, TaskOp::StartNextTurn).is_none() {
            self.tasks
                .schedule(self.config.turn.grace_delay, self.mode_id, TaskOp::StartNextTurn);
        }
    }

    fn set_turn_flag(&mut self, id: EntityId, value: bool) {
        let role = self.role;
        let Some(character) = self.characters.get_mut(&id) else {
            return;
        };
        match character.set_is_my_turn(role, value, &mut self.tasks) {
            Ok(true) => self.publish(GameEvent::TurnChanged {
                character: id,
                is_my_turn: value,
            }),
            Ok(false) => {}
            Err(e) => tracing::warn!(character = %id, "turn flag rejected: {e}"),
        }
    }

    pub(super) fn auto_end_turn(&mut self, character: EntityId) {
        if let Some(c) = self.characters.get_mut(&character) {
            c.auto_end_fired();
        }
        if self.scheduler.active_character() == Some(character) {
            tracing::info!(%character, "movement exhausted, ending turn");
            self.end_current_turn();
        }
    }

    /// Countdown shown to every participant
    pub(super) fn update_turn_countdown(&mut self) {
        self.turn_state.remaining_turn_time = self
            .turn_timer
            .and_then(|h| self.tasks.remaining(h))
            .unwrap_or(0.0);
    }

    /// A death or a sweep may settle the match mid-turn
    pub(super) fn after_casualties(&mut self, dead: &[EntityId]) {
        self.turn_state.update_roster(&self.roster());
        let active = self.scheduler.active_character();
        if active.is_some_and(|a| dead.contains(&a)) || self.check_game_end_condition() {
            self.end_current_turn();
        }
    }

    pub(super) fn enter_game_over(&mut self, winner: Option<PlayerId>) {
        if self.game_over.is_some() {
            return;
        }
        self.game_over = Some(winner);
        if let Some(timer) = self.turn_timer.take() {
            self.tasks.cancel(timer);
        }
        self.tasks.cancel_target(self.mode_id);
        let ids: Vec<EntityId> = self.characters.keys().copied().collect();
        for id in ids {
            self.set_turn_flag(id, false);
        }
        self.turn_state.set_current_player_by_index(None);
        self.turn_state.remaining_turn_time = 0.0;
        tracing::info!(winner = ?winner, "game over");
        self.publish(GameEvent::GameOver { winner });
        self.outbox.push(ServerMessage::GameOver { winner });
    }
}

#[cfg(test)]
mod tests {
    use bevy::math::Vec3;

    use super::*;
    use crate::config::MatchConfig;
    use crate::replication::NetRole;
    use crate::turn::TurnPhase;

    fn session(n: usize) -> (MatchSession, Vec<PlayerId>) {
        let mut s = MatchSession::authority(MatchConfig::default());
        let players = (0..n)
            .map(|i| s.add_player(format!("P{i}"), Vec3::new(400.0 * i as f32, 0.0, 1000.0)).unwrap())
            .collect();
        (s, players)
    }

    fn kill(s: &mut MatchSession, player: PlayerId) {
        let id = s.get_worm_character_from_controller(player).unwrap().id;
        s.characters
            .get_mut(&id)
            .unwrap()
            .apply_damage(NetRole::Authority, 1000.0, Vec3::Z)
            .unwrap();
    }

    #[test]
    fn test_no_controllers_retries() {
        let mut s = MatchSession::authority(MatchConfig::default());
        assert_eq!(s.start_next_turn(), TurnDecision::NoControllers);
        assert!(s.tasks.pending_for(s.mode_id, TaskOp::StartNextTurn).is_some());
    }

    #[test]
    fn test_single_player_waits_instead_of_winning() {
        let (mut s, players) = session(1);
        assert_eq!(s.start_next_turn(), TurnDecision::AwaitingPlayers);
        assert!(!s.is_game_over());
        assert!(s.tasks.pending_for(s.mode_id, TaskOp::StartNextTurn).is_some());
        assert!(s.characters().all(|c| !c.is_my_turn()));

        let second = s.add_player("P1", Vec3::new(400.0, 0.0, 1000.0)).unwrap();
        assert!(matches!(s.start_next_turn(), TurnDecision::Started { player, .. } if player == players[0]));
        assert_ne!(second, players[0]);
    }

    #[test]
    fn test_exactly_one_turn_flag() {
        let (mut s, players) = session(3);
        s.start_next_turn();
        s.end_current_turn();
        s.start_next_turn();
        let active: Vec<PlayerId> = s
            .characters()
            .filter(|c| c.is_my_turn())
            .map(|c| c.player)
            .collect();
        assert_eq!(active, vec![players[1]]);
        assert_eq!(s.turn_state().current_player_name(), "P1");
        assert_eq!(s.turn_state().remaining_turn_time, 30.0);
    }

    #[test]
    fn test_end_turn_twice_schedules_once() {
        let (mut s, _) = session(2);
        s.start_next_turn();
        assert!(s.end_current_turn());
        assert!(!s.end_current_turn());
        let pending = s
            .tasks
            .pending_for(s.mode_id, TaskOp::StartNextTurn)
            .unwrap();
        assert!((s.tasks.remaining(pending).unwrap() - 2.0).abs() < 1e-6);
        assert_eq!(s.active_character().map(|c| c.id), None);
    }

    #[test]
    fn test_dead_participant_skipped() {
        let (mut s, players) = session(4);
        s.start_next_turn();
        kill(&mut s, players[1]);
        s.end_current_turn();
        s.start_next_turn();
        assert_eq!(s.active_character().unwrap().player, players[2]);
    }

    #[test]
    fn test_game_over_when_one_left() {
        let (mut s, players) = session(3);
        s.start_next_turn();
        kill(&mut s, players[1]);
        kill(&mut s, players[2]);
        assert!(s.check_game_end_condition());
        s.end_current_turn();
        assert!(matches!(s.start_next_turn(), TurnDecision::GameOver { winner: Some(w) } if w == players[0]));
        assert!(s.is_game_over());
        assert!(matches!(s.scheduler().phase(), TurnPhase::GameOver { .. }));
        assert!(s.characters().all(|c| !c.is_my_turn()));
    }
}
