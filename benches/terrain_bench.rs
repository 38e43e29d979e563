use bevy::math::Vec2;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use worms_core::config::MatchConfig;
use worms_core::ids::EntityId;
use worms_core::replication::NetRole;
use worms_core::terrain::{generate, DestructibleTerrain, TerrainParams};

fn craters() -> Vec<(Vec2, Vec2)> {
    (0..8)
        .map(|i| {
            let x = 100.0 + 220.0 * i as f32;
            (Vec2::new(x, 1800.0 - 200.0 * i as f32), Vec2::splat(150.0))
        })
        .collect()
}

fn bench_generation(c: &mut Criterion) {
    let params = TerrainParams::from_config(&MatchConfig::default().terrain);
    c.bench_function("generate_25x25", |b| b.iter(|| generate(black_box(&params))));

    let dense = params.with_resolution(100, 100);
    c.bench_function("generate_100x100", |b| b.iter(|| generate(black_box(&dense))));
}

fn bench_culling(c: &mut Criterion) {
    for (name, sections) in [("carve_8_sectioned", true), ("carve_8_whole", false)] {
        let mut config = MatchConfig::default();
        config.terrain.horizontal_resolution = 100;
        config.terrain.vertical_resolution = 100;
        config.sections.enabled = sections;

        c.bench_function(name, |b| {
            b.iter(|| {
                let mut terrain = DestructibleTerrain::new(EntityId(1), NetRole::Authority, &config);
                if terrain.initialize_terrain().is_err() {
                    return;
                }
                for (position, size) in craters() {
                    black_box(terrain.request_destroy_terrain_at(position, size));
                }
            })
        });
    }
}

fn bench_checksum(c: &mut Criterion) {
    let mesh = generate(&TerrainParams::from_config(&MatchConfig::default().terrain));
    c.bench_function("mesh_checksum_25x25", |b| b.iter(|| black_box(&mesh).checksum()));
}

criterion_group!(benches, bench_generation, bench_culling, bench_checksum);
criterion_main!(benches);
