use bevy::math::{Vec2, Vec3};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::mesh::TerrainMesh;
use crate::config::TerrainConfig;
use crate::constants::MIN_RESOLUTION;
use crate::logging::TimingSpan;

/// Everything generation depends on. Same params, same geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainParams {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    pub horizontal_resolution: u32,
    pub vertical_resolution: u32,
    pub internal_layers: u32,
    pub internal_layer_colors: Vec<[u8; 4]>,
    pub base_color: [u8; 4],
    pub color_jitter: u8,
    pub color_seed: u64,
}

impl TerrainParams {
    pub fn from_config(config: &TerrainConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            depth: config.depth,
            horizontal_resolution: config.horizontal_resolution,
            vertical_resolution: config.vertical_resolution,
            internal_layers: config.internal_layers,
            internal_layer_colors: config.internal_layer_colors.clone(),
            base_color: config.base_color,
            color_jitter: config.color_jitter,
            color_seed: config.color_seed,
        }
    }

    pub fn with_resolution(&self, horizontal: u32, vertical: u32) -> Self {
        Self {
            horizontal_resolution: horizontal,
            vertical_resolution: vertical,
            ..self.clone()
        }
    }

    /// Resolutions after clamping to the minimum grid
    pub fn clamped_resolution(&self) -> (u32, u32) {
        (
            self.horizontal_resolution.max(MIN_RESOLUTION),
            self.vertical_resolution.max(MIN_RESOLUTION),
        )
    }

    pub fn vertices_per_face(&self) -> usize {
        let (h, v) = self.clamped_resolution();
        (h * v) as usize
    }
}

/// Build the closed solid: front and back grids, four walls, then any
/// interior layers appended after the outer shell.
pub fn generate(params: &TerrainParams) -> TerrainMesh {
    let _span = TimingSpan::new("terrain_generate");
    let (h_res, v_res) = params.clamped_resolution();
    let vpf = params.vertices_per_face() as u32;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(params.color_seed);

    let layer_count = 2 + params.internal_layers as usize;
    let mut mesh = TerrainMesh {
        vertices: Vec::with_capacity(vpf as usize * layer_count),
        uvs: Vec::with_capacity(vpf as usize * layer_count),
        colors: Vec::with_capacity(vpf as usize * layer_count),
        ..Default::default()
    };

    // Grids: front (y = 0), back (y = depth)
    for depth in [0.0, params.depth] {
        push_grid(&mut mesh, params, depth, params.base_color, &mut rng);
    }

    let idx = |x: u32, z: u32| z * h_res + x;

    // Front, outward -Y
    for z in 0..v_res - 1 {
        for x in 0..h_res - 1 {
            let cur = idx(x, z);
            let next = cur + 1;
            let up = cur + h_res;
            let up_next = up + 1;
            mesh.triangles.extend_from_slice(&[cur, next, up, next, up_next, up]);
        }
    }

    // Back, outward +Y
    for z in 0..v_res - 1 {
        for x in 0..h_res - 1 {
            let cur = vpf + idx(x, z);
            let next = cur + 1;
            let up = cur + h_res;
            let up_next = up + 1;
            mesh.triangles.extend_from_slice(&[cur, up, next, next, up, up_next]);
        }
    }

    // Bottom (z = 0) outward -Z, top (z = height) outward +Z
    let top_row = (v_res - 1) * h_res;
    for x in 0..h_res - 1 {
        let (f, f1) = (x, x + 1);
        let (b, b1) = (vpf + x, vpf + x + 1);
        mesh.triangles.extend_from_slice(&[f, b, f1, f1, b, b1]);

        let (f, f1) = (top_row + x, top_row + x + 1);
        let (b, b1) = (vpf + f, vpf + f1);
        mesh.triangles.extend_from_slice(&[f, f1, b, f1, b1, b]);
    }

    // Left (x = 0) outward -X, right (x = width) outward +X
    for z in 0..v_res - 1 {
        let (f, f1) = (idx(0, z), idx(0, z + 1));
        let (b, b1) = (vpf + f, vpf + f1);
        mesh.triangles.extend_from_slice(&[f, f1, b, f1, b1, b]);

        let (f, f1) = (idx(h_res - 1, z), idx(h_res - 1, z + 1));
        let (b, b1) = (vpf + f, vpf + f1);
        mesh.triangles.extend_from_slice(&[f, b, f1, f1, b, b1]);
    }

    if params.internal_layers > 0 {
        append_internal_layers(&mut mesh, params, &mut rng);
    }

    mesh.recompute_normals();
    debug_assert!(mesh.is_valid());
    tracing::debug!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        h_res,
        v_res,
        "terrain generated"
    );
    mesh
}

/// Interior grids evenly spaced between the shells, each facing -Y and
/// coloured from the layer palette
fn append_internal_layers(mesh: &mut TerrainMesh, params: &TerrainParams, rng: &mut Xoshiro256PlusPlus) {
    let (h_res, v_res) = params.clamped_resolution();
    let layers = params.internal_layers;
    for k in 0..layers {
        let depth = params.depth * (k + 1) as f32 / (layers + 1) as f32;
        let color = if params.internal_layer_colors.is_empty() {
            params.base_color
        } else {
            params.internal_layer_colors[k as usize % params.internal_layer_colors.len()]
        };
        let base = mesh.vertices.len() as u32;
        push_grid(mesh, params, depth, color, rng);
        for z in 0..v_res - 1 {
            for x in 0..h_res - 1 {
                let cur = base + z * h_res + x;
                let next = cur + 1;
                let up = cur + h_res;
                let up_next = up + 1;
                mesh.triangles.extend_from_slice(&[cur, next, up, next, up_next, up]);
            }
        }
    }
}

fn push_grid(
    mesh: &mut TerrainMesh,
    params: &TerrainParams,
    depth: f32,
    color: [u8; 4],
    rng: &mut Xoshiro256PlusPlus,
) {
    let (h_res, v_res) = params.clamped_resolution();
    let h_step = params.width / (h_res - 1) as f32;
    let v_step = params.height / (v_res - 1) as f32;
    for z in 0..v_res {
        for x in 0..h_res {
            mesh.vertices
                .push(Vec3::new(x as f32 * h_step, depth, z as f32 * v_step));
            mesh.uvs.push(Vec2::new(
                x as f32 / (h_res - 1) as f32,
                z as f32 / (v_res - 1) as f32,
            ));
            mesh.colors.push(jitter(color, params.color_jitter, rng));
        }
    }
}

fn jitter(color: [u8; 4], amount: u8, rng: &mut Xoshiro256PlusPlus) -> [u8; 4] {
    if amount == 0 {
        return color;
    }
    let spread = amount as i16;
    let mut out = color;
    for channel in out.iter_mut().take(3) {
        let offset: i16 = rng.gen_range(-spread..=spread);
        *channel = (*channel as i16 + offset).clamp(0, 255) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(h: u32, v: u32) -> TerrainParams {
        TerrainParams::from_config(&TerrainConfig::default()).with_resolution(h, v)
    }

    #[test]
    fn test_default_counts() {
        let mesh = generate(&params(25, 25));
        assert_eq!(mesh.vertex_count(), 2 * 25 * 25);
        // 2 faces * 24*24 quads + 4 walls * 24 quads, 2 triangles per quad
        let quads = 2 * 24 * 24 + 4 * 24;
        assert_eq!(mesh.triangle_count(), quads * 2);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_resolution_clamped_to_two() {
        let mesh = generate(&params(0, 1));
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_vertex_layout() {
        let p = params(5, 3);
        let mesh = generate(&p);
        // front grid first, back grid second
        assert_eq!(mesh.vertices[0], Vec3::ZERO);
        assert_eq!(mesh.vertices[4], Vec3::new(2000.0, 0.0, 0.0));
        assert_eq!(mesh.vertices[14], Vec3::new(2000.0, 0.0, 2000.0));
        assert_eq!(mesh.vertices[15], Vec3::new(0.0, 1000.0, 0.0));
        assert_eq!(mesh.uvs[14], Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_shell_normals_point_outward() {
        let mesh = generate(&params(4, 4));
        let center = Vec3::new(1000.0, 500.0, 1000.0);
        for t in 0..mesh.triangle_count() {
            let [a, b, c] = mesh.triangle(t).unwrap();
            let face = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(
                face.dot(centroid - center) > 0.0,
                "triangle {t} faces inward"
            );
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = generate(&params(10, 10));
        let b = generate(&params(10, 10));
        assert_eq!(a, b);
    }

    #[test]
    fn test_color_jitter_stays_near_base() {
        let p = params(6, 6);
        let mesh = generate(&p);
        for color in &mesh.colors {
            for i in 0..3 {
                let diff = (color[i] as i16 - p.base_color[i] as i16).abs();
                assert!(diff <= p.color_jitter as i16);
            }
            assert_eq!(color[3], 255);
        }
    }

    #[test]
    fn test_internal_layers_appended() {
        let mut p = params(5, 5);
        p.internal_layers = 2;
        p.color_jitter = 0;
        let mesh = generate(&p);
        let vpf = 25;
        assert_eq!(mesh.vertex_count(), 4 * vpf);
        assert!(mesh.validate().is_ok());
        // first interior layer sits a third of the way in
        assert!((mesh.vertices[2 * vpf].y - 1000.0 / 3.0).abs() < 1e-3);
        assert_eq!(mesh.colors[2 * vpf], p.internal_layer_colors[0]);
        assert_eq!(mesh.colors[3 * vpf], p.internal_layer_colors[1]);
    }
}
