use bevy::math::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::constants::ORPHAN_NORMAL;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("Mesh has no vertices")]
    Empty,
    #[error("{buffer} length {actual} does not match vertex count {expected}")]
    LengthMismatch {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Triangle index count {0} is not a multiple of 3")]
    TriangleCount(usize),
    #[error("Triangle index {index} out of range ({vertices} vertices)")]
    IndexOutOfRange { index: u32, vertices: usize },
}

/// Raw geometry buffers of the destructible solid.
///
/// Vertices are never removed once generated; destruction only drops
/// triangles and recomputes normals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainMesh {
    pub vertices: Vec<Vec3>,
    /// Groups of 3, counter-clockwise
    pub triangles: Vec<u32>,
    pub uvs: Vec<Vec2>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<[u8; 4]>,
}

impl TerrainMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }

    /// Check buffer lengths and index ranges
    pub fn validate(&self) -> Result<(), MeshError> {
        let n = self.vertices.len();
        if n == 0 {
            return Err(MeshError::Empty);
        }
        for (buffer, actual) in [
            ("normals", self.normals.len()),
            ("uvs", self.uvs.len()),
            ("colors", self.colors.len()),
        ] {
            if actual != n {
                return Err(MeshError::LengthMismatch {
                    buffer,
                    expected: n,
                    actual,
                });
            }
        }
        if self.triangles.len() % 3 != 0 {
            return Err(MeshError::TriangleCount(self.triangles.len()));
        }
        if let Some(&index) = self.triangles.iter().find(|&&i| i as usize >= n) {
            return Err(MeshError::IndexOutOfRange { index, vertices: n });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Rebuild per-vertex normals from the current triangle set.
    ///
    /// Face normals are normalized before accumulation so every adjacent face
    /// counts equally. Unreferenced vertices get `ORPHAN_NORMAL`.
    pub fn recompute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertices.len()];
        for tri in self.triangles.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let (Some(&v0), Some(&v1), Some(&v2)) =
                (self.vertices.get(a), self.vertices.get(b), self.vertices.get(c))
            else {
                continue;
            };
            let face = (v1 - v0).cross(v2 - v0).normalize_or_zero();
            accum[a] += face;
            accum[b] += face;
            accum[c] += face;
        }
        let fallback = Vec3::from_array(ORPHAN_NORMAL);
        self.normals = accum
            .into_iter()
            .map(|n| {
                let normalized = n.normalize_or_zero();
                if normalized == Vec3::ZERO {
                    fallback
                } else {
                    normalized
                }
            })
            .collect();
    }

    /// Triangle `t` as three vertex positions
    pub fn triangle(&self, t: usize) -> Option<[Vec3; 3]> {
        let tri = self.triangles.get(t * 3..t * 3 + 3)?;
        Some([
            *self.vertices.get(tri[0] as usize)?,
            *self.vertices.get(tri[1] as usize)?,
            *self.vertices.get(tri[2] as usize)?,
        ])
    }

    /// Integrity hash over every buffer, carried with each full push
    pub fn checksum(&self) -> u64 {
        let mut hasher = Sha3_256::new();
        for v in &self.vertices {
            for c in v.to_array() {
                hasher.update(c.to_bits().to_le_bytes());
            }
        }
        for i in &self.triangles {
            hasher.update(i.to_le_bytes());
        }
        for uv in &self.uvs {
            hasher.update(uv.x.to_bits().to_le_bytes());
            hasher.update(uv.y.to_bits().to_le_bytes());
        }
        for n in &self.normals {
            for c in n.to_array() {
                hasher.update(c.to_bits().to_le_bytes());
            }
        }
        for color in &self.colors {
            hasher.update(color);
        }
        let result = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&result[0..8]);
        u64::from_le_bytes(bytes)
    }
}
