//! Worms 3D - Core Library
//!
//! Deterministic gameplay core for a turn-based 3D artillery game:
//! - Destructible terrain (rectangular slab mesh, additive modification list)
//! - Spatial sections and interior-face culling
//! - Distance-driven level of detail
//! - Server-authoritative turn scheduler
//! - Characters with movement budgets, weapons and projectiles
//! - Explosion damage with linear falloff and terrain craters
//! - Authority/observer replication over an in-process link
//! - Bevy plugin bridge for headless hosts

pub mod character;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod ids;
pub mod logging;
pub mod physics;
pub mod projectile;
pub mod replication;
pub mod session;
pub mod tasks;
pub mod terrain;
pub mod turn;
pub mod weapon;
