//! Gameplay rejections.
//!
//! None of these are fatal. Entry points return them so callers and tests
//! can see why a request had no effect; the session logs and moves on.

use crate::ids::{EntityId, PlayerId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("{0} requires authority")]
    NotAuthoritative(&'static str),
    #[error("Not the turn of {0}")]
    NotYourTurn(PlayerId),
    #[error("No character for {0}")]
    MissingCharacter(PlayerId),
    #[error("Entity not found: {0}")]
    MissingEntity(EntityId),
    #[error("Weapon index {index} out of range (have {count})")]
    InvalidWeaponIndex { index: usize, count: usize },
    #[error("No weapon equipped")]
    NoWeapon,
    #[error("Weapon cooling down for {remaining:.2}s")]
    WeaponCooldown { remaining: f32 },
    #[error("Out of ammo")]
    OutOfAmmo,
    #[error("Weapon is reloading")]
    Reloading,
    #[error("No movement points left")]
    NoMovementPoints,
    #[error("Character is dead")]
    Dead,
    #[error("Terrain not initialized")]
    TerrainNotInitialized,
    #[error("Game is over")]
    GameOver,
}
