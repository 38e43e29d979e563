use bevy::math::{Vec2, Vec3};

use super::mesh::TerrainMesh;
use super::modification::Rect2;

/// One cell of the (X, Z) partition
#[derive(Debug, Clone)]
pub struct TerrainSection {
    pub col: u32,
    pub row: u32,
    pub bounds: Rect2,
    /// Triangles with at least one vertex in this cell
    pub triangles: Vec<usize>,
    /// Indices into the terrain's modification list that touch this cell
    pub modifications: Vec<usize>,
}

/// Fixed-size grid over the terrain face.
///
/// A vertex belongs to exactly one cell (its floor-divided coordinates,
/// clamped to the grid), so any vertex inside a rectangle lives in one of the
/// cells `get_affected_sections` returns for it.
#[derive(Debug, Clone)]
pub struct SectionGrid {
    pub size_x: f32,
    pub size_y: f32,
    pub cols: u32,
    pub rows: u32,
    sections: Vec<TerrainSection>,
}

impl SectionGrid {
    pub fn new(width: f32, height: f32, size_x: f32, size_y: f32) -> Self {
        let cols = ((width / size_x).ceil() as u32).max(1);
        let rows = ((height / size_y).ceil() as u32).max(1);
        let mut sections = Vec::with_capacity((cols * rows) as usize);
        for row in 0..rows {
            for col in 0..cols {
                let min = Vec2::new(col as f32 * size_x, row as f32 * size_y);
                sections.push(TerrainSection {
                    col,
                    row,
                    bounds: Rect2 {
                        min,
                        max: min + Vec2::new(size_x, size_y),
                    },
                    triangles: Vec::new(),
                    modifications: Vec::new(),
                });
            }
        }
        Self {
            size_x,
            size_y,
            cols,
            rows,
            sections,
        }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section(&self, index: usize) -> Option<&TerrainSection> {
        self.sections.get(index)
    }

    fn col_of(&self, x: f32) -> u32 {
        ((x / self.size_x).floor().max(0.0) as u32).min(self.cols - 1)
    }

    fn row_of(&self, z: f32) -> u32 {
        ((z / self.size_y).floor().max(0.0) as u32).min(self.rows - 1)
    }

    /// Cell owning a terrain-local vertex
    pub fn section_of(&self, vertex: Vec3) -> usize {
        (self.row_of(vertex.z) * self.cols + self.col_of(vertex.x)) as usize
    }

    pub fn is_vertex_in_section(&self, vertex: Vec3, section: usize) -> bool {
        self.section_of(vertex) == section
    }

    /// Every cell a rectangle can reach
    pub fn get_affected_sections(&self, rect: &Rect2) -> Vec<usize> {
        let (lo, hi) = (rect.min.min(rect.max), rect.min.max(rect.max));
        let (c0, c1) = (self.col_of(lo.x), self.col_of(hi.x));
        let (r0, r1) = (self.row_of(lo.y), self.row_of(hi.y));
        let mut out = Vec::with_capacity(((c1 - c0 + 1) * (r1 - r0 + 1)) as usize);
        for row in r0..=r1 {
            for col in c0..=c1 {
                out.push((row * self.cols + col) as usize);
            }
        }
        out
    }

    /// Reassign triangles to cells after the triangle list changed
    pub fn rebuild(&mut self, mesh: &TerrainMesh) {
        for section in &mut self.sections {
            section.triangles.clear();
        }
        for (t, tri) in mesh.triangles.chunks_exact(3).enumerate() {
            let mut owners = [usize::MAX; 3];
            for (k, &i) in tri.iter().enumerate() {
                let Some(&v) = mesh.vertices.get(i as usize) else {
                    continue;
                };
                let s = self.section_of(v);
                if !owners[..k].contains(&s) {
                    self.sections[s].triangles.push(t);
                }
                owners[k] = s;
            }
        }
    }

    pub fn record_modification(&mut self, modification: usize, rect: &Rect2) {
        for s in self.get_affected_sections(rect) {
            self.sections[s].modifications.push(modification);
        }
    }

    pub fn clear_modifications(&mut self) {
        for section in &mut self.sections {
            section.modifications.clear();
        }
    }

    /// Sorted, deduplicated triangles that may touch any of `rects`
    pub fn candidate_triangles(&self, rects: &[Rect2]) -> Vec<usize> {
        let mut out = Vec::new();
        for rect in rects {
            for s in self.get_affected_sections(rect) {
                out.extend_from_slice(&self.sections[s].triangles);
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerrainConfig;
    use crate::terrain::generate::{generate, TerrainParams};

    #[test]
    fn test_grid_dimensions() {
        let grid = SectionGrid::new(2000.0, 2000.0, 250.0, 250.0);
        assert_eq!((grid.cols, grid.rows), (8, 8));
        assert_eq!(grid.len(), 64);

        let uneven = SectionGrid::new(1000.0, 300.0, 400.0, 400.0);
        assert_eq!((uneven.cols, uneven.rows), (3, 1));
    }

    #[test]
    fn test_vertex_on_far_edge_stays_in_grid() {
        let grid = SectionGrid::new(2000.0, 2000.0, 250.0, 250.0);
        let corner = Vec3::new(2000.0, 0.0, 2000.0);
        assert_eq!(grid.section_of(corner), 63);
        assert!(grid.is_vertex_in_section(corner, 63));
        assert!(!grid.is_vertex_in_section(Vec3::ZERO, 63));
    }

    #[test]
    fn test_affected_sections_of_rect() {
        let grid = SectionGrid::new(2000.0, 2000.0, 250.0, 250.0);
        let rect = Rect2::from_position_size(Vec2::new(200.0, 0.0), Vec2::new(100.0, 100.0));
        assert_eq!(grid.get_affected_sections(&rect), vec![0, 1]);

        let outside = Rect2::from_position_size(Vec2::new(-500.0, -500.0), Vec2::splat(10.0));
        assert_eq!(grid.get_affected_sections(&outside), vec![0]);
    }

    #[test]
    fn test_rebuild_assigns_every_triangle() {
        let params = TerrainParams::from_config(&TerrainConfig::default());
        let mesh = generate(&params);
        let mut grid = SectionGrid::new(2000.0, 2000.0, 250.0, 250.0);
        grid.rebuild(&mesh);

        let everything = Rect2::from_position_size(Vec2::ZERO, Vec2::splat(2000.0));
        assert_eq!(
            grid.candidate_triangles(&[everything]).len(),
            mesh.triangle_count()
        );
    }

    #[test]
    fn test_record_modification() {
        let mut grid = SectionGrid::new(1000.0, 1000.0, 500.0, 500.0);
        let rect = Rect2::from_position_size(Vec2::new(450.0, 100.0), Vec2::splat(100.0));
        grid.record_modification(7, &rect);
        assert_eq!(grid.section(0).unwrap().modifications, vec![7]);
        assert_eq!(grid.section(1).unwrap().modifications, vec![7]);
        assert!(grid.section(2).unwrap().modifications.is_empty());
    }
}
