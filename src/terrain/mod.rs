//! Destructible Terrain
//!
//! The authority generates a closed solid from [`TerrainParams`], carves it
//! with [`TerrainModification`]s and pushes the full buffers to observers
//! after every change. Observers only ever replace their copy wholesale.
//!
//! ```text
//!  generate ──► cull(all modifications) ──► normals ──► render ──► push
//!                    ▲
//!  request_destroy ──┘ (authority appends; observers forward)
//! ```
//!
//! Coordinates are terrain-local: X across, Y into the depth (front face at
//! 0), Z up. Modifications live in the (X, Z) plane.

pub mod culling;
pub mod generate;
pub mod lod;
pub mod mesh;
pub mod modification;
pub mod render;
pub mod sections;

use bevy::math::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::MatchConfig;
use crate::error::GameError;
use crate::ids::EntityId;
use crate::physics::TerrainCollider;
use crate::replication::{NetRole, ReplicationError};

pub use culling::{cull_sectioned, cull_whole_mesh};
pub use generate::{generate, TerrainParams};
pub use lod::{LodController, LodLevel};
pub use mesh::{MeshError, TerrainMesh};
pub use modification::{Rect2, TerrainModification};
pub use render::RenderMesh;
pub use sections::{SectionGrid, TerrainSection};

/// Full replicated terrain state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainSnapshot {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    pub horizontal_resolution: u32,
    pub vertical_resolution: u32,
    pub mesh: TerrainMesh,
    pub valid: bool,
    pub initialized: bool,
    pub modifications: Vec<TerrainModification>,
    pub revision: u64,
    pub checksum: u64,
}

/// What happened to a destruction request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// Observer side; the caller sends it to the authority
    Forwarded,
    Applied { removed: usize },
    /// Recorded before generation; carved when the mesh is built
    Queued,
    /// Already in the list
    Redundant,
}

#[derive(Debug)]
pub struct DestructibleTerrain {
    pub id: EntityId,
    role: NetRole,
    base_params: TerrainParams,
    params: TerrainParams,
    origin: Vec3,
    mesh: TerrainMesh,
    initialized: bool,
    modifications: Vec<TerrainModification>,
    /// Modifications `[..applied]` are incorporated into `mesh`
    applied: usize,
    sections: Option<SectionGrid>,
    lod: LodController,
    render: Option<RenderMesh>,
    collider: TerrainCollider,
    revision: u64,
    verify_checksums: bool,
    pending_push: bool,
    pending_initialized: bool,
}

impl DestructibleTerrain {
    pub fn new(id: EntityId, role: NetRole, config: &MatchConfig) -> Self {
        let params = TerrainParams::from_config(&config.terrain);
        let sections = config.sections.enabled.then(|| {
            SectionGrid::new(
                params.width,
                params.height,
                config.sections.section_size_x,
                config.sections.section_size_y,
            )
        });
        let lod = LodController::new(config.lod.clone(), params.clamped_resolution());
        Self {
            id,
            role,
            base_params: params.clone(),
            params,
            origin: Vec3::from_array(config.terrain.origin),
            mesh: TerrainMesh::default(),
            initialized: false,
            modifications: Vec::new(),
            applied: 0,
            sections,
            lod,
            render: None,
            collider: TerrainCollider::default(),
            revision: 0,
            verify_checksums: config.replication.verify_checksums,
            pending_push: false,
            pending_initialized: false,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn role(&self) -> NetRole {
        self.role
    }

    pub fn mesh(&self) -> &TerrainMesh {
        &self.mesh
    }

    pub fn render(&self) -> Option<&RenderMesh> {
        self.render.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn modifications(&self) -> &[TerrainModification] {
        &self.modifications
    }

    pub fn applied_count(&self) -> usize {
        self.applied
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    pub fn width(&self) -> f32 {
        self.params.width
    }

    pub fn height(&self) -> f32 {
        self.params.height
    }

    pub fn depth(&self) -> f32 {
        self.params.depth
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn lod_level(&self) -> LodLevel {
        self.lod.current()
    }

    pub fn sections(&self) -> Option<&SectionGrid> {
        self.sections.as_ref()
    }

    pub fn world_to_local(&self, world: Vec3) -> Vec3 {
        world - self.origin
    }

    pub fn local_to_world(&self, local: Vec3) -> Vec3 {
        local + self.origin
    }

    /// Middle of the solid in world space
    pub fn center(&self) -> Vec3 {
        self.local_to_world(Vec3::new(
            self.params.width * 0.5,
            self.params.depth * 0.5,
            self.params.height * 0.5,
        ))
    }

    // ------------------------------------------------------------------
    // Authority: generation and carving
    // ------------------------------------------------------------------

    /// First build. Queues the reliable "initialized" notice.
    pub fn initialize_terrain(&mut self) -> Result<(), GameError> {
        if !self.role.is_authority() {
            return Err(GameError::NotAuthoritative("initialize_terrain"));
        }
        self.generate_terrain()?;
        self.initialized = true;
        self.pending_initialized = true;
        tracing::info!(
            vertices = self.mesh.vertex_count(),
            triangles = self.mesh.triangle_count(),
            "terrain initialized"
        );
        Ok(())
    }

    /// Rebuild from the live params and replay every recorded modification
    pub fn generate_terrain(&mut self) -> Result<(), GameError> {
        if !self.role.is_authority() {
            return Err(GameError::NotAuthoritative("generate_terrain"));
        }
        self.mesh = generate(&self.params);
        self.applied = 0;
        if let Some(grid) = self.sections.as_mut() {
            grid.rebuild(&self.mesh);
            grid.clear_modifications();
        }
        self.incorporate_pending();
        self.revision += 1;
        self.rebuild_render();
        self.pending_push = true;
        Ok(())
    }

    pub fn request_destroy_terrain_at(&mut self, position: Vec2, size: Vec2) -> DestroyOutcome {
        self.request_modification(TerrainModification::rectangle(position, size))
    }

    pub fn request_destroy_circle(&mut self, center: Vec2, radius: f32) -> DestroyOutcome {
        self.request_modification(TerrainModification::circle(center, radius))
    }

    /// Append and incorporate on the authority; report forwarding otherwise
    pub fn request_modification(&mut self, modification: TerrainModification) -> DestroyOutcome {
        if !self.role.is_authority() {
            return DestroyOutcome::Forwarded;
        }
        if self.modifications.contains(&modification) {
            tracing::debug!(?modification, "redundant terrain modification ignored");
            return DestroyOutcome::Redundant;
        }
        self.modifications.push(modification);
        tracing::info!(
            position = ?modification.position,
            size = ?modification.size,
            total = self.modifications.len(),
            "terrain modification recorded"
        );
        if !self.initialized {
            return DestroyOutcome::Queued;
        }
        match self.apply_terrain_modifications() {
            Ok(removed) => DestroyOutcome::Applied { removed },
            Err(e) => {
                tracing::warn!("terrain modification not applied: {e}");
                DestroyOutcome::Queued
            }
        }
    }

    /// Carve every not-yet-applied modification. Returns triangles removed.
    pub fn apply_terrain_modifications(&mut self) -> Result<usize, GameError> {
        if !self.role.is_authority() {
            return Err(GameError::NotAuthoritative("apply_terrain_modifications"));
        }
        if !self.initialized {
            return Err(GameError::TerrainNotInitialized);
        }
        if self.applied >= self.modifications.len() {
            return Ok(0);
        }
        let removed = self.incorporate_pending();
        self.revision += 1;
        self.rebuild_render();
        self.pending_push = true;
        tracing::debug!(
            removed,
            remaining = self.mesh.triangle_count(),
            revision = self.revision,
            "terrain modifications applied"
        );
        Ok(removed)
    }

    fn incorporate_pending(&mut self) -> usize {
        let start = self.applied;
        let fresh = &self.modifications[start..];
        if fresh.is_empty() {
            return 0;
        }
        let removed = match self.sections.as_mut() {
            Some(grid) => {
                for (offset, m) in fresh.iter().enumerate() {
                    grid.record_modification(start + offset, &m.bounds());
                }
                cull_sectioned(&mut self.mesh, grid, fresh)
            }
            None => cull_whole_mesh(&mut self.mesh, fresh),
        };
        self.mesh.recompute_normals();
        self.applied = self.modifications.len();
        removed
    }

    // ------------------------------------------------------------------
    // Level of detail
    // ------------------------------------------------------------------

    /// Periodic distance check. True if the resolution switched.
    pub fn update_lod(&mut self, delta_seconds: f32, observers: &[Vec3]) -> bool {
        if !self.role.is_authority() || !self.initialized || !self.lod.tick(delta_seconds) {
            return false;
        }
        let wanted = self.lod.evaluate(self.center(), observers);
        if wanted == self.lod.current() {
            return false;
        }
        match self.switch_resolution(wanted) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("lod switch failed: {e}");
                false
            }
        }
    }

    /// Regenerate at the level's resolution; craters are replayed by position
    pub fn switch_resolution(&mut self, level: LodLevel) -> Result<(), GameError> {
        let (h, v) = self.lod.resolution(level);
        self.params = self.base_params.with_resolution(h, v);
        self.lod.set_current(level);
        tracing::info!(?level, horizontal = h, vertical = v, "terrain resolution switched");
        self.generate_terrain()
    }

    // ------------------------------------------------------------------
    // Visuals
    // ------------------------------------------------------------------

    fn rebuild_render(&mut self) -> bool {
        match RenderMesh::build(&self.mesh, self.revision) {
            Ok(render) => {
                self.render = Some(render);
                if self.collider.revision() != self.revision {
                    self.collider = TerrainCollider::build(&self.mesh, self.revision);
                }
                true
            }
            Err(e) => {
                tracing::error!(revision = self.revision, "render mesh rejected, keeping previous: {e}");
                false
            }
        }
    }

    /// Rebuild the render mesh from the held buffers. If they are unusable
    /// the authority regenerates.
    pub fn force_visual_update(&mut self) -> bool {
        if self.mesh.is_valid() {
            return self.rebuild_render();
        }
        if self.role.is_authority() && self.initialized {
            tracing::warn!("held terrain buffers invalid, regenerating");
            return self.generate_terrain().is_ok();
        }
        false
    }

    // ------------------------------------------------------------------
    // Replication
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> TerrainSnapshot {
        let (h, v) = self.params.clamped_resolution();
        TerrainSnapshot {
            width: self.params.width,
            height: self.params.height,
            depth: self.params.depth,
            horizontal_resolution: h,
            vertical_resolution: v,
            mesh: self.mesh.clone(),
            valid: self.mesh.is_valid(),
            initialized: self.initialized,
            modifications: self.modifications.clone(),
            revision: self.revision,
            checksum: self.mesh.checksum(),
        }
    }

    /// Full state due for observers since the last call
    pub fn take_pending_push(&mut self) -> Option<TerrainSnapshot> {
        std::mem::take(&mut self.pending_push).then(|| self.snapshot())
    }

    pub fn take_initialized_notice(&mut self) -> bool {
        std::mem::take(&mut self.pending_initialized)
    }

    /// Resend current state, e.g. after a late join
    pub fn mark_dirty(&mut self) {
        if self.revision > 0 {
            self.pending_push = true;
        }
    }

    /// Observer side: replace the local copy. Returns false for stale or
    /// repeated pushes.
    pub fn receive_snapshot(&mut self, snapshot: TerrainSnapshot) -> Result<bool, ReplicationError> {
        if self.role.is_authority() {
            return Err(ReplicationError::WrongRole("receive_snapshot"));
        }
        if self.revision > 0 && snapshot.revision <= self.revision {
            tracing::debug!(
                incoming = snapshot.revision,
                held = self.revision,
                "stale terrain push ignored"
            );
            return Ok(false);
        }
        if self.verify_checksums {
            let actual = snapshot.mesh.checksum();
            if actual != snapshot.checksum {
                return Err(ReplicationError::ChecksumMismatch {
                    expected: snapshot.checksum,
                    actual,
                });
            }
        }
        if snapshot.valid {
            snapshot.mesh.validate()?;
        }

        self.params.width = snapshot.width;
        self.params.height = snapshot.height;
        self.params.depth = snapshot.depth;
        self.params.horizontal_resolution = snapshot.horizontal_resolution;
        self.params.vertical_resolution = snapshot.vertical_resolution;
        self.mesh = snapshot.mesh;
        self.initialized = snapshot.initialized;
        self.applied = snapshot.modifications.len();
        self.modifications = snapshot.modifications;
        self.revision = snapshot.revision;
        if snapshot.valid {
            self.rebuild_render();
        }
        Ok(true)
    }

    /// Observer side: the reliable initialization notice
    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn collider(&self) -> &TerrainCollider {
        &self.collider
    }

    /// First surviving triangle hit along a world-space segment
    pub fn raycast(&self, from: Vec3, to: Vec3) -> Option<(f32, Vec3)> {
        self.collider
            .cast_segment(self.world_to_local(from), self.world_to_local(to))
            .map(|(s, local)| (s, self.local_to_world(local)))
    }
}
