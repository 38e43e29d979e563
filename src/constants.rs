//! Centralized game constants for the artillery core.
//!
//! These are the defaults behind `config::MatchConfig`. Anything a match may
//! want to tune goes through the config; code should read the config, not
//! these values, except when building defaults.

// =====================================================
// Terrain
// =====================================================

/// Terrain extent along local X
pub const TERRAIN_WIDTH: f32 = 2000.0;

/// Terrain extent along local Z (up)
pub const TERRAIN_HEIGHT: f32 = 2000.0;

/// Terrain extent along local Y (front face at 0, back face at depth)
pub const TERRAIN_DEPTH: f32 = 1000.0;

/// Default grid resolution along X
pub const TERRAIN_H_RESOLUTION: u32 = 25;

/// Default grid resolution along Z
pub const TERRAIN_V_RESOLUTION: u32 = 25;

/// Resolutions below this are clamped up
pub const MIN_RESOLUTION: u32 = 2;

/// Base RGBA colour of generated terrain
pub const TERRAIN_BASE_COLOR: [u8; 4] = [75, 150, 75, 255];

/// Max per-channel colour jitter applied to each vertex
pub const TERRAIN_COLOR_JITTER: u8 = 12;

/// Default rectangle size of a modification
pub const DEFAULT_MODIFICATION_SIZE: f32 = 100.0;

/// Default radius of a circular modification
pub const DEFAULT_MODIFICATION_RADIUS: f32 = 50.0;

/// Normal assigned to vertices no triangle references anymore
pub const ORPHAN_NORMAL: [f32; 3] = [0.0, -1.0, 0.0];

/// Section cell size along X
pub const SECTION_SIZE_X: f32 = 250.0;

/// Section cell size along Z
pub const SECTION_SIZE_Y: f32 = 250.0;

// =====================================================
// Level of detail
// =====================================================

/// Observer distance beyond which the low-detail mesh is used
pub const LOD_DISTANCE_THRESHOLD: f32 = 5000.0;

/// Low-detail grid resolution along X
pub const LOD_H_RESOLUTION: u32 = 10;

/// Low-detail grid resolution along Z
pub const LOD_V_RESOLUTION: u32 = 10;

/// Seconds between LOD distance checks
pub const LOD_CHECK_INTERVAL: f32 = 1.0;

// =====================================================
// Turns
// =====================================================

/// Seconds each participant gets per turn
pub const TURN_DURATION: f32 = 30.0;

/// Delay between the end of one turn and the start of the next
pub const TURN_GRACE_DELAY: f32 = 2.0;

/// Debounce before an exhausted movement budget ends the turn
pub const AUTO_END_TURN_DELAY: f32 = 3.0;

/// Fallback display name when no participant is active
pub const NO_ACTIVE_PLAYER: &str = "no active player";

// =====================================================
// Startup timeline
// =====================================================

pub const TERRAIN_SPAWN_DELAY: f32 = 2.0;
pub const TERRAIN_INIT_DELAY: f32 = 0.5;
pub const WEAPON_ASSIGN_DELAY: f32 = 1.0;
pub const WEAPON_RECHECK_DELAY: f32 = 3.0;
pub const FIRST_TURN_DELAY: f32 = 2.0;
pub const WEAPON_SPAWN_DELAY: f32 = 0.5;

// =====================================================
// Characters
// =====================================================

pub const CHARACTER_MAX_HEALTH: f32 = 100.0;

pub const MAX_MOVEMENT_POINTS: f32 = 100.0;

/// Movement points spent per unit of horizontal distance
pub const MOVEMENT_COST_PER_UNIT: f32 = 0.1;

/// Budget left below this after a charge counts as spent
pub const MOVEMENT_POINTS_EPSILON: f32 = 1e-3;

/// Minimum seconds between two shots
pub const WEAPON_COOLDOWN: f32 = 0.5;

/// Knockback impulse per point of damage
pub const KNOCKBACK_PER_DAMAGE: f32 = 10.0;

/// Collision sphere used for characters in the headless simulation
pub const CHARACTER_RADIUS: f32 = 40.0;

// =====================================================
// Weapons
// =====================================================

pub const MIN_POWER: f32 = 1000.0;
pub const MAX_POWER: f32 = 5000.0;
pub const INITIAL_POWER: f32 = 3000.0;
pub const POWER_STEP: f32 = 100.0;

pub const MAX_AMMO: u32 = 5;
pub const RELOAD_TIME: f32 = 2.0;

/// Distance ahead of the muzzle where projectiles spawn
pub const MUZZLE_OFFSET: f32 = 100.0;

pub const TRAJECTORY_POINT_COUNT: usize = 30;
pub const TRAJECTORY_TIME_STEP: f32 = 0.1;

// =====================================================
// Projectiles
// =====================================================

pub const EXPLOSION_RADIUS: f32 = 200.0;
pub const EXPLOSION_DAMAGE: f32 = 25.0;
pub const DETONATION_DELAY: f32 = 3.0;
pub const COLLISION_ACTIVATION_DELAY: f32 = 0.2;
pub const PROJECTILE_LIFESPAN: f32 = 10.0;
pub const PROJECTILE_RADIUS: f32 = 5.0;

pub const STUCK_CHECK_INTERVAL: f32 = 0.5;
pub const STUCK_SPEED_THRESHOLD: f32 = 100.0;
pub const STUCK_HEIGHT_THRESHOLD: f32 = 100.0;

/// World gravity along -Z (cm/s^2)
pub const GRAVITY: f32 = -980.0;

// =====================================================
// Replication
// =====================================================

/// Aim rotation is sent on every Nth tick
pub const AIM_SEND_INTERVAL: u32 = 5;
