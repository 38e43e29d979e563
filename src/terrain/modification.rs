use bevy::math::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MODIFICATION_RADIUS, DEFAULT_MODIFICATION_SIZE};

/// Axis-aligned rectangle in the terrain's local (X, Z) plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect2 {
    pub fn from_position_size(position: Vec2, size: Vec2) -> Self {
        Self {
            min: position,
            max: position + size,
        }
    }

    /// Inclusive on every edge
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Inclusive overlap test (touching edges intersect)
    pub fn intersects(&self, other: &Rect2) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// A region of terrain marked for excision.
///
/// Circles keep their centre and radius for replication but cull through
/// their bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainModification {
    pub position: Vec2,
    pub size: Vec2,
    pub circular: bool,
    pub center: Vec2,
    pub radius: f32,
}

impl Default for TerrainModification {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            size: Vec2::splat(DEFAULT_MODIFICATION_SIZE),
            circular: false,
            center: Vec2::ZERO,
            radius: DEFAULT_MODIFICATION_RADIUS,
        }
    }
}

impl TerrainModification {
    pub fn rectangle(position: Vec2, size: Vec2) -> Self {
        Self {
            position,
            size,
            ..Default::default()
        }
    }

    pub fn circle(center: Vec2, radius: f32) -> Self {
        Self {
            position: center - Vec2::splat(radius),
            size: Vec2::splat(radius * 2.0),
            circular: true,
            center,
            radius,
        }
    }

    pub fn bounds(&self) -> Rect2 {
        Rect2::from_position_size(self.position, self.size)
    }

    /// Whether a terrain-local vertex falls inside, using its (X, Z)
    pub fn contains_vertex(&self, vertex: Vec3) -> bool {
        self.bounds().contains(Vec2::new(vertex.x, vertex.z))
    }
}
