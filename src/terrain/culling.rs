//! Triangle culling for crater incorporation.
//!
//! `cull_whole_mesh` is the reference: a triangle goes when any of its
//! vertices lies inside any of the given modifications. `cull_sectioned`
//! narrows the candidates with a [`SectionGrid`] and must leave exactly the
//! same triangles, in the same order.

use bevy::math::Vec2;

use super::mesh::TerrainMesh;
use super::modification::{Rect2, TerrainModification};
use super::sections::SectionGrid;
use crate::logging::TimingSpan;

fn triangle_hit(mesh: &TerrainMesh, tri: &[u32], rects: &[Rect2]) -> bool {
    tri.iter().any(|&i| {
        mesh.vertices
            .get(i as usize)
            .is_some_and(|v| rects.iter().any(|r| r.contains(Vec2::new(v.x, v.z))))
    })
}

/// Drop every triangle touched by `modifications`. Returns the number removed.
pub fn cull_whole_mesh(mesh: &mut TerrainMesh, modifications: &[TerrainModification]) -> usize {
    if modifications.is_empty() {
        return 0;
    }
    let _span = TimingSpan::new("cull_whole_mesh");
    let rects: Vec<Rect2> = modifications.iter().map(|m| m.bounds()).collect();
    let before = mesh.triangle_count();
    let view: &TerrainMesh = mesh;
    let survivors: Vec<u32> = view
        .triangles
        .chunks_exact(3)
        .filter(|tri| !triangle_hit(view, tri, &rects))
        .flatten()
        .copied()
        .collect();
    mesh.triangles = survivors;
    before - mesh.triangle_count()
}

/// Same result as [`cull_whole_mesh`], testing only triangles in affected
/// sections. The grid must be current for `mesh`; it is rebuilt afterwards.
pub fn cull_sectioned(
    mesh: &mut TerrainMesh,
    grid: &mut SectionGrid,
    modifications: &[TerrainModification],
) -> usize {
    if modifications.is_empty() {
        return 0;
    }
    let _span = TimingSpan::new("cull_sectioned");
    let rects: Vec<Rect2> = modifications.iter().map(|m| m.bounds()).collect();
    let mut doomed = vec![false; mesh.triangle_count()];
    let mut removed = 0;
    for t in grid.candidate_triangles(&rects) {
        let Some(tri) = mesh.triangles.get(t * 3..t * 3 + 3) else {
            continue;
        };
        if triangle_hit(mesh, tri, &rects) {
            doomed[t] = true;
            removed += 1;
        }
    }
    if removed > 0 {
        let survivors: Vec<u32> = mesh
            .triangles
            .chunks_exact(3)
            .zip(&doomed)
            .filter(|(_, gone)| !**gone)
            .flat_map(|(tri, _)| tri.iter().copied())
            .collect();
        mesh.triangles = survivors;
        grid.rebuild(mesh);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerrainConfig;
    use crate::terrain::generate::{generate, TerrainParams};

    fn default_mesh() -> TerrainMesh {
        generate(&TerrainParams::from_config(&TerrainConfig::default()))
    }

    #[test]
    fn test_corner_square_removes_touching_triangles() {
        let mut mesh = default_mesh();
        let original = mesh.clone();
        let m = TerrainModification::rectangle(Vec2::ZERO, Vec2::splat(100.0));

        let removed = cull_whole_mesh(&mut mesh, &[m]);
        assert!(removed > 0);

        // every survivor is untouched, every loser had a vertex in the square
        let inside = |i: u32| m.contains_vertex(original.vertices[i as usize]);
        let expected: Vec<u32> = original
            .triangles
            .chunks_exact(3)
            .filter(|t| !t.iter().any(|&i| inside(i)))
            .flatten()
            .copied()
            .collect();
        assert_eq!(mesh.triangles, expected);
        assert_eq!(mesh.vertices, original.vertices);
    }

    #[test]
    fn test_no_modifications_is_noop() {
        let mut mesh = default_mesh();
        let before = mesh.clone();
        assert_eq!(cull_whole_mesh(&mut mesh, &[]), 0);
        assert_eq!(mesh, before);
    }

    #[test]
    fn test_sectioned_matches_whole_mesh() {
        let mods = [
            TerrainModification::rectangle(Vec2::new(240.0, 240.0), Vec2::splat(30.0)),
            TerrainModification::circle(Vec2::new(1000.0, 1990.0), 200.0),
            TerrainModification::rectangle(Vec2::new(1900.0, -50.0), Vec2::splat(150.0)),
        ];
        let mut whole = default_mesh();
        let mut sectioned = whole.clone();
        let mut grid = SectionGrid::new(2000.0, 2000.0, 250.0, 250.0);
        grid.rebuild(&sectioned);

        let a = cull_whole_mesh(&mut whole, &mods);
        let b = cull_sectioned(&mut sectioned, &mut grid, &mods);
        assert_eq!(a, b);
        assert_eq!(whole.triangles, sectioned.triangles);
    }

    #[test]
    fn test_sectioned_grid_stays_current() {
        let mut mesh = default_mesh();
        let mut grid = SectionGrid::new(2000.0, 2000.0, 250.0, 250.0);
        grid.rebuild(&mesh);

        let first = TerrainModification::rectangle(Vec2::new(500.0, 500.0), Vec2::splat(100.0));
        let second = TerrainModification::rectangle(Vec2::new(550.0, 550.0), Vec2::splat(200.0));
        cull_sectioned(&mut mesh, &mut grid, &[first]);
        cull_sectioned(&mut mesh, &mut grid, &[second]);

        let mut reference = default_mesh();
        cull_whole_mesh(&mut reference, &[first]);
        cull_whole_mesh(&mut reference, &[second]);
        assert_eq!(mesh.triangles, reference.triangles);
    }
}
