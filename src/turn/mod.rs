//! Turn Scheduler
//!
//! Server-authoritative rotation over the ordered controller roster.
//!
//! ```text
//!  Idle ──start_next_turn──► Active(i) ──end_current_turn──► Intermission
//!                               ▲                                 │
//!                               └──── start_next_turn (grace) ────┘
//!        (≤ 1 living participant once two have competed) ──► GameOver
//! ```
//!
//! Until two participants have been eligible at the same time the match has
//! not begun: a lone early joiner gets `AwaitingPlayers` and the session
//! retries, exactly as with an empty roster.
//!
//! The scheduler only decides; the session applies flags, timers and
//! notifications. Stale indices never fault: lookups go through `get`.

use serde::{Deserialize, Serialize};

use crate::constants::NO_ACTIVE_PLAYER;
use crate::ids::{EntityId, PlayerId};

/// One roster slot as the scheduler sees it
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub player: PlayerId,
    pub name: String,
    pub character: Option<EntityId>,
    /// Character present with health above zero
    pub alive: bool,
}

impl Participant {
    pub fn eligible(&self) -> bool {
        self.character.is_some() && self.alive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    Idle,
    Active { index: usize },
    Intermission,
    GameOver { winner: Option<PlayerId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDecision {
    /// Nobody registered yet; try again later
    NoControllers,
    /// Fewer than two eligible participants and the match never began
    AwaitingPlayers,
    GameOver { winner: Option<PlayerId> },
    /// Full cycle without an eligible participant
    NoEligible,
    Started {
        index: usize,
        player: PlayerId,
        character: EntityId,
    },
}

/// At most one participant still standing
pub fn check_game_end_condition(roster: &[Participant]) -> bool {
    roster.iter().filter(|p| p.eligible()).count() <= 1
}

#[derive(Debug, Clone)]
pub struct TurnScheduler {
    phase: TurnPhase,
    current_index: Option<usize>,
    active_character: Option<EntityId>,
    /// Two or more participants were eligible at some start
    contested: bool,
}

impl Default for TurnScheduler {
    fn default() -> Self {
        Self {
            phase: TurnPhase::Idle,
            current_index: None,
            active_character: None,
            contested: false,
        }
    }
}

impl TurnScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn active_character(&self) -> Option<EntityId> {
        match self.phase {
            TurnPhase::Active { .. } => self.active_character,
            _ => None,
        }
    }

    pub fn is_contested(&self) -> bool {
        self.contested
    }

    pub fn is_game_over(&self) -> bool {
        matches!(self.phase, TurnPhase::GameOver { .. })
    }

    /// Advance to the next eligible participant after the current one
    pub fn start_next_turn(&mut self, roster: &[Participant]) -> TurnDecision {
        if let TurnPhase::GameOver { winner } = self.phase {
            return TurnDecision::GameOver { winner };
        }
        if roster.is_empty() {
            return TurnDecision::NoControllers;
        }
        if check_game_end_condition(roster) {
            if !self.contested {
                return TurnDecision::AwaitingPlayers;
            }
            let winner = roster.iter().find(|p| p.eligible()).map(|p| p.player);
            self.phase = TurnPhase::GameOver { winner };
            self.active_character = None;
            return TurnDecision::GameOver { winner };
        }
        self.contested = true;

        let n = roster.len();
        let origin = self.current_index.map_or(n - 1, |i| i % n);
        for step in 1..=n {
            let index = (origin + step) % n;
            let candidate = &roster[index];
            if let (true, Some(character)) = (candidate.eligible(), candidate.character) {
                self.current_index = Some(index);
                self.active_character = Some(character);
                self.phase = TurnPhase::Active { index };
                return TurnDecision::Started {
                    index,
                    player: candidate.player,
                    character,
                };
            }
        }
        TurnDecision::NoEligible
    }

    /// Close the active turn. Returns the character that held it, or `None`
    /// when no turn was active (a second end trigger loses the race).
    pub fn end_current_turn(&mut self) -> Option<Option<EntityId>> {
        match self.phase {
            TurnPhase::Active { .. } => {
                self.phase = TurnPhase::Intermission;
                Some(self.active_character.take())
            }
            _ => None,
        }
    }

    /// Roster slot `index` went away; keep pointing at the same participant
    pub fn participant_removed(&mut self, index: usize, roster_len: usize) {
        if let Some(i) = self.current_index {
            if index < i {
                self.current_index = Some(i - 1);
            } else if index == i {
                // the successor slides into this slot and goes next
                self.current_index = i.checked_sub(1);
            }
        }
        if let TurnPhase::Active { index: active } = self.phase {
            if index < active {
                self.phase = TurnPhase::Active { index: active - 1 };
            }
        }
        self.clamp_index(roster_len);
    }

    /// Keep the rotation position when the roster shrinks below it
    pub fn clamp_index(&mut self, roster_len: usize) {
        if let Some(i) = self.current_index {
            if roster_len == 0 {
                self.current_index = None;
            } else if i >= roster_len {
                self.current_index = Some(roster_len - 1);
            }
        }
    }
}

/// Replicated turn/game state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnState {
    pub current_player_index: Option<usize>,
    pub current_player_name: String,
    pub remaining_turn_time: f32,
    pub turn_duration: f32,
    pub player_names: Vec<String>,
    pub player_alive: Vec<bool>,
}

impl TurnState {
    pub fn new(turn_duration: f32) -> Self {
        Self {
            current_player_index: None,
            current_player_name: NO_ACTIVE_PLAYER.to_string(),
            remaining_turn_time: 0.0,
            turn_duration,
            player_names: Vec::new(),
            player_alive: Vec::new(),
        }
    }

    pub fn update_roster(&mut self, roster: &[Participant]) {
        self.player_names = roster.iter().map(|p| p.name.clone()).collect();
        self.player_alive = roster.iter().map(|p| p.eligible()).collect();
        if let Some(i) = self.current_player_index {
            if i >= self.player_names.len() {
                self.set_current_player_by_index(None);
            }
        }
    }

    /// Invalid indices clear the selection instead of failing
    pub fn set_current_player_by_index(&mut self, index: Option<usize>) {
        match index.and_then(|i| self.player_names.get(i).map(|name| (i, name.clone()))) {
            Some((i, name)) => {
                self.current_player_index = Some(i);
                self.current_player_name = name;
            }
            None => {
                self.current_player_index = None;
                self.current_player_name = NO_ACTIVE_PLAYER.to_string();
            }
        }
    }

    /// Display name that tolerates an index that arrived before its name
    pub fn current_player_name(&self) -> &str {
        match self.current_player_index.and_then(|i| self.player_names.get(i)) {
            Some(name) => name,
            None if !self.current_player_name.is_empty() => &self.current_player_name,
            None => NO_ACTIVE_PLAYER,
        }
    }

    pub fn remaining_players_count(&self) -> usize {
        self.player_alive.iter().filter(|&&alive| alive).count()
    }

    /// Worth a push: anything changed besides sub-second countdown drift
    pub fn differs_for_sync(&self, other: &TurnState) -> bool {
        self.current_player_index != other.current_player_index
            || self.current_player_name != other.current_player_name
            || self.turn_duration != other.turn_duration
            || self.player_names != other.player_names
            || self.player_alive != other.player_alive
            || self.remaining_turn_time.ceil() != other.remaining_turn_time.ceil()
    }
}
