//! Identifiers shared across the core.
//!
//! Entities are addressed by plain ids instead of references so that
//! scheduled tasks and replicated snapshots can name them safely after
//! the entity is gone.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A simulated entity (character, weapon, projectile, terrain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// A connected controller (one per human or bot participant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// Monotonic id source owned by a session
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next_entity: u32,
    next_player: u32,
}

impl IdAllocator {
    pub fn entity(&mut self) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        id
    }

    pub fn player(&mut self) -> PlayerId {
        let id = PlayerId(self.next_player);
        self.next_player += 1;
        id
    }
}
