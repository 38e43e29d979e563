//! State Replication
//!
//! One authority owns every mutable collection; observers hold replicas that
//! only change when a snapshot arrives. Two delivery tiers:
//! - Reliable: terrain pushes, initialization, turn state, entity snapshots,
//!   explosions. Delivered in order; may arrive more than once, so every
//!   receiver applies them idempotently.
//! - Best-effort: projectile positions and aim rotation. May be dropped and
//!   are never retried; the next update supersedes them.
//!
//! Frames are bincode-encoded [`Envelope`]s with a per-sender sequence number.

pub mod link;

use std::collections::BTreeMap;

use bevy::math::{Vec2, Vec3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::character::CharacterSnapshot;
use crate::ids::{EntityId, PlayerId};
use crate::projectile::ProjectileSnapshot;
use crate::terrain::{MeshError, TerrainSnapshot};
use crate::turn::TurnState;
use crate::weapon::WeaponSnapshot;

pub use link::{LinkConfig, LinkStats, LoopbackLink};

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("Encode error: {0}")]
    Encode(bincode::Error),
    #[error("Decode error: {0}")]
    Decode(bincode::Error),
    #[error("Checksum mismatch: expected {expected:#018x}, got {actual:#018x}")]
    ChecksumMismatch { expected: u64, actual: u64 },
    #[error("Invalid mesh: {0}")]
    InvalidMesh(#[from] MeshError),
    #[error("Wrong role for {0}")]
    WrongRole(&'static str),
}

/// Which side of the session this process is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetRole {
    Authority,
    Observer,
}

impl NetRole {
    pub fn is_authority(&self) -> bool {
        matches!(self, NetRole::Authority)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Reliable,
    BestEffort,
}

/// Messages know their own delivery tier
pub trait Routed {
    fn channel(&self) -> Channel;
}

// ============================================================================
// Messages
// ============================================================================

/// Authority → observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    TerrainState(Box<TerrainSnapshot>),
    TerrainInitialized,
    TurnState(TurnState),
    Character(CharacterSnapshot),
    CharacterRemoved(EntityId),
    Weapon(WeaponSnapshot),
    WeaponRemoved(EntityId),
    ProjectileState(ProjectileSnapshot),
    ProjectileRemoved(EntityId),
    /// Cosmetic only
    Explosion { position: Vec3, radius: f32 },
    WeaponAim { character: EntityId, direction: Vec3 },
    GameOver { winner: Option<PlayerId> },
}

impl Routed for ServerMessage {
    fn channel(&self) -> Channel {
        match self {
            ServerMessage::ProjectileState(_) | ServerMessage::WeaponAim { .. } => {
                Channel::BestEffort
            }
            _ => Channel::Reliable,
        }
    }
}

/// Observer → authority. Always re-validated, never trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Terrain-local (X, Z) rectangle
    DestroyTerrain { position: Vec2, size: Vec2 },
    EndTurn,
    Fire,
    SwitchWeapon { index: usize },
    NextWeapon,
    PreviousWeapon,
    AdjustPower { delta: f32 },
    Aim { direction: Vec3 },
    Move { position: Vec3 },
}

impl Routed for ClientMessage {
    fn channel(&self) -> Channel {
        match self {
            ClientMessage::Aim { .. } | ClientMessage::Move { .. } => Channel::BestEffort,
            _ => Channel::Reliable,
        }
    }
}

// ============================================================================
// Framing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub seq: u64,
    pub channel: Channel,
    pub payload: T,
}

impl<T: Serialize + DeserializeOwned> Envelope<T> {
    pub fn encode(&self) -> Result<Vec<u8>, ReplicationError> {
        bincode::serialize(self).map_err(ReplicationError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ReplicationError> {
        bincode::deserialize(bytes).map_err(ReplicationError::Decode)
    }
}

/// Pending sends for one network flush
#[derive(Debug, Clone)]
pub struct Outbox<T> {
    next_seq: u64,
    reliable: Vec<Envelope<T>>,
    best_effort: Vec<Envelope<T>>,
}

impl<T> Default for Outbox<T> {
    fn default() -> Self {
        Self {
            next_seq: 0,
            reliable: Vec::new(),
            best_effort: Vec::new(),
        }
    }
}

impl<T: Routed> Outbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, payload: T) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let channel = payload.channel();
        let envelope = Envelope {
            seq,
            channel,
            payload,
        };
        match channel {
            Channel::Reliable => self.reliable.push(envelope),
            Channel::BestEffort => self.best_effort.push(envelope),
        }
        seq
    }

    pub fn len(&self) -> usize {
        self.reliable.len() + self.best_effort.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything queued, reliable first, each tier in push order
    pub fn drain(&mut self) -> Vec<Envelope<T>> {
        let mut out = std::mem::take(&mut self.reliable);
        out.append(&mut self.best_effort);
        out
    }
}

// ============================================================================
// Throttling and change detection
// ============================================================================

/// Let one call in every `interval` through. Owned by the entity it throttles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiter {
    interval: u32,
    counter: u32,
}

impl RateLimiter {
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            counter: 0,
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Count one tick; true on every `interval`-th
    pub fn ready(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.interval {
            self.counter = 0;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

/// Digest of the last pushed snapshot per entity, so unchanged state is not
/// resent every tick
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    digests: BTreeMap<EntityId, u64>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `id`; true if it differs from what was last recorded
    pub fn changed<S: Serialize>(&mut self, id: EntityId, value: &S) -> bool {
        let hash = match bincode::serialize(value) {
            Ok(bytes) => digest(&bytes),
            Err(e) => {
                tracing::warn!(entity = %id, "snapshot encode failed: {e}");
                return true;
            }
        };
        self.digests.insert(id, hash) != Some(hash)
    }

    pub fn forget(&mut self, id: EntityId) {
        self.digests.remove(&id);
    }

    /// Force everything to be resent on the next flush
    pub fn clear(&mut self) {
        self.digests.clear();
    }
}

/// First 8 bytes of SHA3-256
pub fn digest(bytes: &[u8]) -> u64 {
    let hash = Sha3_256::digest(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(head)
}
