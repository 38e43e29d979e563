//! Match configuration
//!
//! All tunables of a match live in [`MatchConfig`]:
//! - Defaults come from `constants`
//! - Files may be RON (`.ron`) or JSON (`.json`); missing fields keep defaults
//! - `validate()` runs after every load, an invalid file is never applied

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::logging::TracingConfig;
use crate::weapon::WeaponKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    pub horizontal_resolution: u32,
    pub vertical_resolution: u32,
    /// Interior layers between the front and back shells
    pub internal_layers: u32,
    /// One colour per interior layer, cycled if shorter than `internal_layers`
    pub internal_layer_colors: Vec<[u8; 4]>,
    pub base_color: [u8; 4],
    pub color_jitter: u8,
    pub color_seed: u64,
    /// World-space position of the terrain's local origin
    pub origin: [f32; 3],
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            width: TERRAIN_WIDTH,
            height: TERRAIN_HEIGHT,
            depth: TERRAIN_DEPTH,
            horizontal_resolution: TERRAIN_H_RESOLUTION,
            vertical_resolution: TERRAIN_V_RESOLUTION,
            internal_layers: 0,
            internal_layer_colors: vec![[110, 80, 50, 255], [90, 60, 40, 255], [70, 70, 70, 255]],
            base_color: TERRAIN_BASE_COLOR,
            color_jitter: TERRAIN_COLOR_JITTER,
            color_seed: 42,
            origin: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionConfig {
    /// Use the section grid to narrow culling candidates
    pub enabled: bool,
    pub section_size_x: f32,
    pub section_size_y: f32,
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            section_size_x: SECTION_SIZE_X,
            section_size_y: SECTION_SIZE_Y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    pub enabled: bool,
    pub distance_threshold: f32,
    pub low_horizontal_resolution: u32,
    pub low_vertical_resolution: u32,
    pub check_interval: f32,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            distance_threshold: LOD_DISTANCE_THRESHOLD,
            low_horizontal_resolution: LOD_H_RESOLUTION,
            low_vertical_resolution: LOD_V_RESOLUTION,
            check_interval: LOD_CHECK_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub turn_duration: f32,
    pub grace_delay: f32,
    pub auto_end_delay: f32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            turn_duration: TURN_DURATION,
            grace_delay: TURN_GRACE_DELAY,
            auto_end_delay: AUTO_END_TURN_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    pub max_health: f32,
    pub max_movement_points: f32,
    pub movement_cost_per_unit: f32,
    pub weapon_cooldown: f32,
    pub knockback_per_damage: f32,
    pub collision_radius: f32,
    pub weapon_spawn_delay: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            max_health: CHARACTER_MAX_HEALTH,
            max_movement_points: MAX_MOVEMENT_POINTS,
            movement_cost_per_unit: MOVEMENT_COST_PER_UNIT,
            weapon_cooldown: WEAPON_COOLDOWN,
            knockback_per_damage: KNOCKBACK_PER_DAMAGE,
            collision_radius: CHARACTER_RADIUS,
            weapon_spawn_delay: WEAPON_SPAWN_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponConfig {
    pub min_power: f32,
    pub max_power: f32,
    pub initial_power: f32,
    pub power_step: f32,
    pub max_ammo: u32,
    pub reload_time: f32,
    pub muzzle_offset: f32,
    pub trajectory_points: usize,
    pub trajectory_time_step: f32,
    /// Weapons handed to every character, in inventory order
    pub loadout: Vec<WeaponKind>,
}

impl Default for WeaponConfig {
    fn default() -> Self {
        Self {
            min_power: MIN_POWER,
            max_power: MAX_POWER,
            initial_power: INITIAL_POWER,
            power_step: POWER_STEP,
            max_ammo: MAX_AMMO,
            reload_time: RELOAD_TIME,
            muzzle_offset: MUZZLE_OFFSET,
            trajectory_points: TRAJECTORY_POINT_COUNT,
            trajectory_time_step: TRAJECTORY_TIME_STEP,
            loadout: vec![WeaponKind::Bazooka, WeaponKind::Grenade, WeaponKind::Mortar],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileConfig {
    pub explosion_radius: f32,
    pub explosion_damage: f32,
    pub detonation_delay: f32,
    pub collision_activation_delay: f32,
    pub lifespan: f32,
    pub radius: f32,
    pub stuck_check_interval: f32,
    pub stuck_speed_threshold: f32,
    pub stuck_height_threshold: f32,
    pub gravity: f32,
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        Self {
            explosion_radius: EXPLOSION_RADIUS,
            explosion_damage: EXPLOSION_DAMAGE,
            detonation_delay: DETONATION_DELAY,
            collision_activation_delay: COLLISION_ACTIVATION_DELAY,
            lifespan: PROJECTILE_LIFESPAN,
            radius: PROJECTILE_RADIUS,
            stuck_check_interval: STUCK_CHECK_INTERVAL,
            stuck_speed_threshold: STUCK_SPEED_THRESHOLD,
            stuck_height_threshold: STUCK_HEIGHT_THRESHOLD,
            gravity: GRAVITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Aim updates are sent on every Nth tick
    pub aim_send_interval: u32,
    /// Verify mesh checksums on receipt
    pub verify_checksums: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            aim_send_interval: AIM_SEND_INTERVAL,
            verify_checksums: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    pub terrain_spawn_delay: f32,
    pub terrain_init_delay: f32,
    pub weapon_assign_delay: f32,
    pub weapon_recheck_delay: f32,
    pub first_turn_delay: f32,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            terrain_spawn_delay: TERRAIN_SPAWN_DELAY,
            terrain_init_delay: TERRAIN_INIT_DELAY,
            weapon_assign_delay: WEAPON_ASSIGN_DELAY,
            weapon_recheck_delay: WEAPON_RECHECK_DELAY,
            first_turn_delay: FIRST_TURN_DELAY,
        }
    }
}

/// Everything a match needs to know up front
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub terrain: TerrainConfig,
    pub sections: SectionConfig,
    pub lod: LodConfig,
    pub turn: TurnConfig,
    pub character: CharacterConfig,
    pub weapon: WeaponConfig,
    pub projectile: ProjectileConfig,
    pub replication: ReplicationConfig,
    pub startup: StartupConfig,
    pub logging: TracingConfig,
}

impl MatchConfig {
    /// Load from a `.ron` or `.json` file and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("ron") => Self::from_ron(&text)?,
            Some("json") => Self::from_json(&text)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        tracing::info!(path = %path.display(), "match config loaded");
        Ok(config)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.terrain;
        if t.width <= 0.0 || t.height <= 0.0 || t.depth <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "terrain dimensions must be positive, got {}x{}x{}",
                t.width, t.height, t.depth
            )));
        }
        if self.sections.section_size_x <= 0.0 || self.sections.section_size_y <= 0.0 {
            return Err(ConfigError::Invalid("section sizes must be positive".into()));
        }
        if self.turn.turn_duration <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "turn_duration must be positive, got {}",
                self.turn.turn_duration
            )));
        }
        if self.turn.grace_delay < 0.0 || self.turn.auto_end_delay < 0.0 {
            return Err(ConfigError::Invalid("turn delays cannot be negative".into()));
        }
        let w = &self.weapon;
        if w.min_power > w.max_power {
            return Err(ConfigError::Invalid(format!(
                "min_power {} exceeds max_power {}",
                w.min_power, w.max_power
            )));
        }
        if w.initial_power < w.min_power || w.initial_power > w.max_power {
            return Err(ConfigError::Invalid(format!(
                "initial_power {} outside [{}, {}]",
                w.initial_power, w.min_power, w.max_power
            )));
        }
        if w.trajectory_time_step <= 0.0 {
            return Err(ConfigError::Invalid("trajectory_time_step must be positive".into()));
        }
        let p = &self.projectile;
        if p.explosion_radius <= 0.0 || p.explosion_damage < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "explosion radius {} / damage {} out of range",
                p.explosion_radius, p.explosion_damage
            )));
        }
        if p.stuck_check_interval <= 0.0 || p.lifespan <= 0.0 {
            return Err(ConfigError::Invalid("projectile timers must be positive".into()));
        }
        if self.lod.enabled && self.lod.check_interval <= 0.0 {
            return Err(ConfigError::Invalid("lod.check_interval must be positive".into()));
        }
        if self.replication.aim_send_interval == 0 {
            return Err(ConfigError::Invalid("aim_send_interval must be at least 1".into()));
        }
        if self.character.max_health <= 0.0 || self.character.max_movement_points < 0.0 {
            return Err(ConfigError::Invalid("character stats out of range".into()));
        }
        Ok(())
    }
}
