use super::mesh::{MeshError, TerrainMesh};

/// Flattened, engine-ready copy of the terrain buffers.
///
/// This is what a host renderer/collider consumes. It is only ever replaced
/// wholesale by a successful build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    /// RGBA in 0..=1
    pub colors: Vec<[f32; 4]>,
    pub indices: Vec<u32>,
    pub revision: u64,
}

impl RenderMesh {
    pub fn build(mesh: &TerrainMesh, revision: u64) -> Result<Self, MeshError> {
        mesh.validate()?;
        Ok(Self {
            positions: mesh.vertices.iter().map(|v| v.to_array()).collect(),
            normals: mesh.normals.iter().map(|n| n.to_array()).collect(),
            uvs: mesh.uvs.iter().map(|uv| uv.to_array()).collect(),
            colors: mesh
                .colors
                .iter()
                .map(|c| c.map(|channel| channel as f32 / 255.0))
                .collect(),
            indices: mesh.triangles.clone(),
            revision,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerrainConfig;
    use crate::terrain::generate::{generate, TerrainParams};

    #[test]
    fn test_build_from_generated_mesh() {
        let mesh = generate(&TerrainParams::from_config(&TerrainConfig::default()));
        let render = RenderMesh::build(&mesh, 3).unwrap();
        assert_eq!(render.positions.len(), mesh.vertex_count());
        assert_eq!(render.triangle_count(), mesh.triangle_count());
        assert_eq!(render.revision, 3);
        assert!(render.colors.iter().all(|c| c.iter().all(|x| (0.0..=1.0).contains(x))));
    }

    #[test]
    fn test_build_refuses_mismatched_buffers() {
        let mut mesh = generate(&TerrainParams::from_config(&TerrainConfig::default()));
        mesh.colors.truncate(10);
        assert!(matches!(
            RenderMesh::build(&mesh, 0),
            Err(MeshError::LengthMismatch { buffer: "colors", .. })
        ));
    }
}
