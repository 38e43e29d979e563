use bevy::math::{Vec2, Vec3};

use crate::ids::EntityId;
use crate::terrain::TerrainModification;

/// Linear falloff: full damage at the epicenter, none at or past `radius`
pub fn falloff_damage(base_damage: f32, distance: f32, radius: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    base_damage * (1.0 - (distance / radius).clamp(0.0, 1.0))
}

/// Damage owed to one character by one explosion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageApplication {
    pub target: EntityId,
    pub distance: f32,
    pub damage: f32,
    /// Unit vector away from the epicenter
    pub direction: Vec3,
}

/// Every target strictly inside `radius`, with its falloff damage.
/// A target sitting on the epicenter is pushed straight up.
pub fn resolve_explosion(
    epicenter: Vec3,
    radius: f32,
    base_damage: f32,
    targets: impl IntoIterator<Item = (EntityId, Vec3)>,
) -> Vec<DamageApplication> {
    targets
        .into_iter()
        .filter_map(|(target, position)| {
            let offset = position - epicenter;
            let distance = offset.length();
            if distance >= radius {
                return None;
            }
            let direction = offset.try_normalize().unwrap_or(Vec3::Z);
            Some(DamageApplication {
                target,
                distance,
                damage: falloff_damage(base_damage, distance, radius),
                direction,
            })
        })
        .collect()
}

/// Crater for an explosion at a terrain-local point: a `2r` square centred on
/// the impact, pushed inward so it stays inside the terrain face. On a face
/// narrower than `2r` the crater shrinks to the face along that axis.
pub fn crater_modification(local_impact: Vec3, radius: f32, width: f32, height: f32) -> TerrainModification {
    let half = Vec2::new(radius.min(width * 0.5), radius.min(height * 0.5)).max(Vec2::ZERO);
    let x = local_impact.x.clamp(half.x, (width - half.x).max(half.x));
    let z = local_impact.z.clamp(half.y, (height - half.y).max(half.y));
    TerrainModification::rectangle(Vec2::new(x, z) - half, half * 2.0)
}
