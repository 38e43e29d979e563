use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::LodConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LodLevel {
    High,
    Low,
}

/// Periodic distance check driving the live terrain resolution
#[derive(Debug, Clone)]
pub struct LodController {
    config: LodConfig,
    high: (u32, u32),
    current: LodLevel,
    since_check: f32,
}

impl LodController {
    pub fn new(config: LodConfig, high: (u32, u32)) -> Self {
        Self {
            config,
            high,
            current: LodLevel::High,
            since_check: 0.0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn current(&self) -> LodLevel {
        self.current
    }

    pub fn set_current(&mut self, level: LodLevel) {
        self.current = level;
    }

    pub fn resolution(&self, level: LodLevel) -> (u32, u32) {
        match level {
            LodLevel::High => self.high,
            LodLevel::Low => (
                self.config.low_horizontal_resolution,
                self.config.low_vertical_resolution,
            ),
        }
    }

    /// Advance the check timer; true when a check is due
    pub fn tick(&mut self, delta_seconds: f32) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.since_check += delta_seconds;
        if self.since_check >= self.config.check_interval {
            self.since_check = 0.0;
            true
        } else {
            false
        }
    }

    /// Level wanted for the nearest observer. No observers keeps the
    /// current level.
    pub fn evaluate(&self, center: Vec3, observers: &[Vec3]) -> LodLevel {
        let nearest = observers
            .iter()
            .map(|p| p.distance(center))
            .fold(f32::INFINITY, f32::min);
        if !nearest.is_finite() {
            return self.current;
        }
        if nearest > self.config.distance_threshold {
            LodLevel::Low
        } else {
            LodLevel::High
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> LodController {
        LodController::new(
            LodConfig {
                enabled: true,
                ..Default::default()
            },
            (25, 25),
        )
    }

    #[test]
    fn test_tick_fires_once_per_interval() {
        let mut lod = controller();
        assert!(!lod.tick(0.5));
        assert!(lod.tick(0.5));
        assert!(!lod.tick(0.1));
    }

    #[test]
    fn test_disabled_never_fires() {
        let mut lod = LodController::new(LodConfig::default(), (25, 25));
        assert!(!lod.tick(10.0));
    }

    #[test]
    fn test_evaluate_by_nearest_observer() {
        let lod = controller();
        let center = Vec3::ZERO;
        assert_eq!(
            lod.evaluate(center, &[Vec3::new(6000.0, 0.0, 0.0)]),
            LodLevel::Low
        );
        assert_eq!(
            lod.evaluate(center, &[Vec3::new(6000.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0)]),
            LodLevel::High
        );
        assert_eq!(lod.evaluate(center, &[]), LodLevel::High);
    }

    #[test]
    fn test_resolution_per_level() {
        let lod = controller();
        assert_eq!(lod.resolution(LodLevel::High), (25, 25));
        assert_eq!(lod.resolution(LodLevel::Low), (10, 10));
    }
}
