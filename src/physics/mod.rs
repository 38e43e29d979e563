//! Collision Queries (parry geometry through bevy_rapier3d)
//!
//! Projectiles are integrated by the session itself, so only shape queries
//! are needed here, never a rigid-body pipeline:
//! - [`TerrainCollider`]: triangle mesh over the surviving terrain triangles,
//!   rebuilt whenever the terrain revision moves
//! - [`sweep_ball`]: a projectile step against a character's hit sphere
//!
//! Segments are cast as rays with a time of impact limit of 1, so every hit
//! is reported as a fraction of the step.

use bevy::math::Vec3;
use bevy_rapier3d::parry::math::{Point, Real, Vector};
use bevy_rapier3d::parry::query::{Ray, RayCast};
use bevy_rapier3d::parry::shape::{Ball, TriMesh};

use crate::logging::TimingSpan;
use crate::terrain::TerrainMesh;

pub fn to_point(v: Vec3) -> Point<Real> {
    Point::new(v.x, v.y, v.z)
}

pub fn to_vector(v: Vec3) -> Vector<Real> {
    Vector::new(v.x, v.y, v.z)
}

fn segment_ray(from: Vec3, to: Vec3) -> Ray {
    Ray::new(to_point(from), to_vector(to - from))
}

/// Queryable copy of a terrain mesh, in terrain-local coordinates
#[derive(Default)]
pub struct TerrainCollider {
    /// `None` while the mesh has no triangles (parry rejects empty meshes)
    shape: Option<TriMesh>,
    revision: u64,
}

impl std::fmt::Debug for TerrainCollider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainCollider")
            .field("triangles", &self.triangle_count())
            .field("revision", &self.revision)
            .finish()
    }
}

impl TerrainCollider {
    /// Caller guarantees `mesh` passed validation
    pub fn build(mesh: &TerrainMesh, revision: u64) -> Self {
        if mesh.triangle_count() == 0 {
            return Self { shape: None, revision };
        }
        let _span = TimingSpan::new("terrain_collider");
        let vertices = mesh.vertices.iter().copied().map(to_point).collect();
        let indices = mesh
            .triangles
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();
        Self {
            shape: Some(TriMesh::new(vertices, indices)),
            revision,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn triangle_count(&self) -> usize {
        self.shape.as_ref().map_or(0, |shape| shape.indices().len())
    }

    /// First surface hit along `from -> to`, as (fraction, point). Both faces count.
    pub fn cast_segment(&self, from: Vec3, to: Vec3) -> Option<(f32, Vec3)> {
        let shape = self.shape.as_ref()?;
        let s = shape.cast_local_ray(&segment_ray(from, to), 1.0, false)?;
        Some((s, from + (to - from) * s))
    }
}

/// Fraction along `from -> to` where it enters the ball at `center`.
/// A step that starts inside hits at 0.
pub fn sweep_ball(from: Vec3, to: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    if radius <= 0.0 {
        return None;
    }
    Ball::new(radius).cast_local_ray(&segment_ray(from - center, to - center), 1.0, true)
}
