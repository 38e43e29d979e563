//! Destructible terrain behaviour through the public API
//!
//! - Generated solid: buffer sizes, winding, checksums
//! - Rectangle and circle excision, leaving untouched triangles bit-identical
//! - Sectioned culling matches the whole-mesh pass
//! - Observer replica: accepts valid pushes, rejects stale and corrupt ones
//! - Resolution switches replay every crater

use bevy::math::{Vec2, Vec3};

use worms_core::config::MatchConfig;
use worms_core::constants::ORPHAN_NORMAL;
use worms_core::ids::EntityId;
use worms_core::replication::{NetRole, ReplicationError};
use worms_core::terrain::{
    generate, DestroyOutcome, DestructibleTerrain, LodLevel, Rect2, TerrainMesh, TerrainModification,
    TerrainParams,
};

// ============================================================
// Helpers
// ============================================================

fn authority_terrain(config: &MatchConfig) -> DestructibleTerrain {
    let mut terrain = DestructibleTerrain::new(EntityId(1), NetRole::Authority, config);
    terrain.initialize_terrain().unwrap();
    terrain
}

fn touches(mesh: &TerrainMesh, tri: &[u32], rect: &Rect2) -> bool {
    tri.iter().any(|&i| {
        let v = mesh.vertices[i as usize];
        rect.contains(Vec2::new(v.x, v.z))
    })
}

/// What culling must leave: the original triangles minus every one touched
fn expected_survivors(mesh: &TerrainMesh, rects: &[Rect2]) -> Vec<u32> {
    mesh.triangles
        .chunks_exact(3)
        .filter(|tri| !rects.iter().any(|r| touches(mesh, tri, r)))
        .flatten()
        .copied()
        .collect()
}

// ============================================================
// Generation
// ============================================================

#[test]
fn default_solid_buffer_sizes() {
    let terrain = authority_terrain(&MatchConfig::default());
    let mesh = terrain.mesh();
    assert_eq!(mesh.vertex_count(), 2 * 25 * 25);
    // two faces of 24x24 quads, four walls of 24 quads
    assert_eq!(mesh.triangle_count(), 2 * 24 * 24 * 2 + 4 * 24 * 2);
    assert_eq!(mesh.normals.len(), mesh.vertex_count());
    assert_eq!(mesh.uvs.len(), mesh.vertex_count());
    assert_eq!(mesh.colors.len(), mesh.vertex_count());
    assert!(mesh.validate().is_ok());
}

#[test]
fn front_face_points_toward_negative_y() {
    let terrain = authority_terrain(&MatchConfig::default());
    let mesh = terrain.mesh();
    let [a, b, c] = mesh.triangle(0).unwrap();
    let n = (b - a).cross(c - a).normalize();
    assert!((n - Vec3::NEG_Y).length() < 1e-5);
}

#[test]
fn generation_is_reproducible() {
    let params = TerrainParams::from_config(&MatchConfig::default().terrain);
    assert_eq!(generate(&params).checksum(), generate(&params).checksum());

    let mut other = MatchConfig::default();
    other.terrain.color_seed = 7;
    let reseeded = TerrainParams::from_config(&other.terrain);
    assert_ne!(generate(&params).checksum(), generate(&reseeded).checksum());
}

#[test]
fn internal_layers_extend_the_solid() {
    let mut config = MatchConfig::default();
    config.terrain.internal_layers = 2;
    let terrain = authority_terrain(&config);
    assert_eq!(terrain.mesh().vertex_count(), 4 * 25 * 25);
    assert!(terrain.mesh().validate().is_ok());
}

// ============================================================
// Excision
// ============================================================

#[test]
fn corner_square_removes_touched_and_keeps_the_rest() {
    let mut terrain = authority_terrain(&MatchConfig::default());
    let before = terrain.mesh().clone();
    let rect = Rect2::from_position_size(Vec2::ZERO, Vec2::splat(100.0));

    let outcome = terrain.request_destroy_terrain_at(Vec2::ZERO, Vec2::splat(100.0));
    let after = terrain.mesh();

    let expected = expected_survivors(&before, &[rect]);
    assert!(matches!(outcome, DestroyOutcome::Applied { removed } if removed == before.triangle_count() - expected.len() / 3));
    assert_eq!(after.triangles, expected);
    // geometry untouched
    assert_eq!(after.vertices, before.vertices);
    assert_eq!(after.uvs, before.uvs);
    assert_eq!(after.colors, before.colors);
    // the corner vertex is orphaned and gets the fallback normal
    assert_eq!(after.normals[0], Vec3::from_array(ORPHAN_NORMAL));
    assert!(after.normals.iter().all(|n| n.is_finite()));
}

#[test]
fn same_modification_twice_is_idempotent() {
    let mut terrain = authority_terrain(&MatchConfig::default());
    terrain.request_destroy_terrain_at(Vec2::new(500.0, 500.0), Vec2::splat(200.0));
    let once = terrain.mesh().triangles.clone();
    let revision = terrain.revision();

    let again = terrain.request_destroy_terrain_at(Vec2::new(500.0, 500.0), Vec2::splat(200.0));
    assert_eq!(again, DestroyOutcome::Redundant);
    assert_eq!(terrain.mesh().triangles, once);
    assert_eq!(terrain.revision(), revision);
    assert_eq!(terrain.modifications().len(), 1);
}

#[test]
fn circle_culls_through_its_bounding_square() {
    let mut terrain = authority_terrain(&MatchConfig::default());
    let before = terrain.mesh().clone();
    let circle = TerrainModification::circle(Vec2::new(1000.0, 1000.0), 50.0);

    let outcome = terrain.request_destroy_circle(Vec2::new(1000.0, 1000.0), 50.0);
    assert!(matches!(outcome, DestroyOutcome::Applied { removed } if removed > 0));
    assert_eq!(terrain.mesh().triangles, expected_survivors(&before, &[circle.bounds()]));
}

#[test]
fn modifications_before_init_are_queued_then_carved() {
    let config = MatchConfig::default();
    let mut terrain = DestructibleTerrain::new(EntityId(1), NetRole::Authority, &config);
    assert_eq!(
        terrain.request_destroy_terrain_at(Vec2::ZERO, Vec2::splat(300.0)),
        DestroyOutcome::Queued
    );
    terrain.initialize_terrain().unwrap();
    assert_eq!(terrain.applied_count(), 1);

    let fresh = generate(&TerrainParams::from_config(&config.terrain));
    let rect = Rect2::from_position_size(Vec2::ZERO, Vec2::splat(300.0));
    assert_eq!(terrain.mesh().triangles, expected_survivors(&fresh, &[rect]));
}

#[test]
fn sectioned_and_whole_mesh_culling_agree() {
    let mut sectioned = MatchConfig::default();
    sectioned.sections.enabled = true;
    let mut whole = MatchConfig::default();
    whole.sections.enabled = false;

    let mut a = authority_terrain(&sectioned);
    let mut b = authority_terrain(&whole);
    let craters = [
        (Vec2::new(0.0, 0.0), Vec2::splat(100.0)),
        (Vec2::new(240.0, 1700.0), Vec2::new(400.0, 300.0)),
        (Vec2::new(1900.0, 1900.0), Vec2::splat(100.0)),
        (Vec2::new(990.0, 990.0), Vec2::splat(20.0)),
    ];
    for (position, size) in craters {
        a.request_destroy_terrain_at(position, size);
        b.request_destroy_terrain_at(position, size);
        assert_eq!(a.mesh().triangles, b.mesh().triangles);
    }
    assert_eq!(a.mesh().checksum(), b.mesh().checksum());
}

#[test]
fn render_mesh_follows_revisions() {
    let mut terrain = authority_terrain(&MatchConfig::default());
    let first = terrain.render().unwrap().revision;
    terrain.request_destroy_terrain_at(Vec2::new(600.0, 600.0), Vec2::splat(150.0));
    let render = terrain.render().unwrap();
    assert!(render.revision > first);
    assert_eq!(render.triangle_count(), terrain.mesh().triangle_count());
    assert_eq!(render.positions.len(), terrain.mesh().vertex_count());
}

// ============================================================
// Replica
// ============================================================

#[test]
fn observer_accepts_push_and_rejects_replays() {
    let config = MatchConfig::default();
    let mut authority = authority_terrain(&config);
    let mut replica = DestructibleTerrain::new(EntityId(2), NetRole::Observer, &config);

    let push = authority.take_pending_push().unwrap();
    assert!(replica.receive_snapshot(push.clone()).unwrap());
    assert_eq!(replica.mesh().checksum(), authority.mesh().checksum());
    assert!(replica.is_initialized());
    // same revision again
    assert!(!replica.receive_snapshot(push).unwrap());

    // observers cannot carve locally
    assert_eq!(
        replica.request_destroy_terrain_at(Vec2::ZERO, Vec2::splat(100.0)),
        DestroyOutcome::Forwarded
    );
    assert!(replica.modifications().is_empty());
}

#[test]
fn observer_rejects_corrupt_push() {
    let config = MatchConfig::default();
    let mut authority = authority_terrain(&config);
    let mut replica = DestructibleTerrain::new(EntityId(2), NetRole::Observer, &config);

    let mut push = authority.take_pending_push().unwrap();
    push.mesh.triangles.pop();
    assert!(matches!(
        replica.receive_snapshot(push),
        Err(ReplicationError::ChecksumMismatch { .. })
    ));
    assert_eq!(replica.revision(), 0);
    assert!(replica.render().is_none());
}

// ============================================================
// Level of detail
// ============================================================

#[test]
fn lod_switch_replays_craters() {
    let mut config = MatchConfig::default();
    config.lod.enabled = true;
    let mut terrain = authority_terrain(&config);
    terrain.request_destroy_terrain_at(Vec2::new(500.0, 500.0), Vec2::splat(300.0));

    let far = terrain.center() + Vec3::new(0.0, 20_000.0, 0.0);
    assert!(terrain.update_lod(1.0, &[far]));
    assert_eq!(terrain.lod_level(), LodLevel::Low);
    assert_eq!(terrain.mesh().vertex_count(), 2 * 10 * 10);
    assert_eq!(terrain.applied_count(), 1);

    let low = generate(&terrain.params().clone());
    let rect = Rect2::from_position_size(Vec2::new(500.0, 500.0), Vec2::splat(300.0));
    assert_eq!(terrain.mesh().triangles, expected_survivors(&low, &[rect]));

    // checks only run once per interval
    assert!(!terrain.update_lod(0.5, &[terrain.center()]));
    assert!(terrain.update_lod(0.5, &[terrain.center()]));
    assert_eq!(terrain.lod_level(), LodLevel::High);
    assert_eq!(terrain.mesh().vertex_count(), 2 * 25 * 25);
}
