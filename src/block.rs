//! FarBlock data model and the sector grouping that owns it.

use std::collections::BTreeMap;

use glam::{IVec2, IVec3, Vec3};

use crate::area::VoxelArea;
use crate::constants::{BS, FMP};
use crate::mesh::MeshHandle;
use crate::types::{FarMeshLevel, FarNode};

/// Geometry parameters derived once from `(position, divs_per_mb)`.
///
/// Immutable after the block is inserted; only content, flags and meshes
/// mutate afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FarBlockParameters {
  /// Position in far-block units.
  pub p: IVec3,
  /// FarNodes per map-block per axis; `(1,1,1)` is the coarsest.
  pub divs_per_mb: IVec3,
  /// Block origin in FarNode units.
  pub dp00: IVec3,
  /// Covered FarNodes per axis.
  pub effective_size: IVec3,
  /// Covered FarNodes as an inclusive box.
  pub effective_area: VoxelArea,
  /// Stored FarNodes per axis: effective plus one padding layer per edge,
  /// carrying the neighbor voxels face extraction needs.
  pub content_size: IVec3,
  /// Stored FarNodes as an inclusive box.
  pub content_area: VoxelArea,
}

impl FarBlockParameters {
  pub fn new(p: IVec3, divs_per_mb: IVec3) -> Self {
    let dp00 = p * FMP * divs_per_mb;
    let effective_size = FMP * divs_per_mb;
    let effective_area = VoxelArea::with_size(dp00, effective_size);
    let content_size = effective_size + IVec3::splat(2);
    let content_area = VoxelArea::with_size(dp00 - IVec3::ONE, content_size);
    Self {
      p,
      divs_per_mb,
      dp00,
      effective_size,
      effective_area,
      content_size,
      content_area,
    }
  }

  /// Block center in world units (before camera rebase).
  pub fn center_world(&self) -> Vec3 {
    (self.p.as_vec3() + 0.5) * (FMP * crate::constants::MB) as f32 * BS
  }
}

/// The unit of far-terrain content and rendering.
pub struct FarBlock {
  pub params: FarBlockParameters,

  /// Empty when the server reported the block non-existent or culled.
  /// Otherwise `content.len() == params.content_area.volume()`.
  pub content: Vec<FarNode>,

  /// Server refuses to send this block; content stays empty.
  pub is_culled_by_server: bool,
  /// Server is still generating this block and will send more later.
  pub load_in_progress_on_server: bool,
  /// Fetch-advisor retry pacing; advances per suggestion pass, resets when
  /// a retry is emitted.
  pub refresh_from_server_counter: i32,

  /// Lowest detail, covers the whole block.
  pub crude_mesh: Option<MeshHandle>,
  /// Full resolution, covers the whole block.
  pub fine_mesh: Option<MeshHandle>,
  /// Map-block-sized pieces (FMP^3 when built), drawn where the near
  /// renderer occludes parts of the block.
  pub mapblock_meshes: Vec<Option<MeshHandle>>,
  /// 2x2x2-map-block pieces ((FMP/2)^3 when built).
  pub mapblock2_meshes: Vec<Option<MeshHandle>>,

  /// A mesh-build task for this block is in flight. Old meshes stay
  /// renderable meanwhile.
  pub generating_mesh: bool,
  /// Content changed since the last build was dispatched.
  pub mesh_is_outdated: bool,
  /// The last build produced zero geometry; null mesh slots are expected
  /// and must not retrigger generation.
  pub mesh_is_empty: bool,

  /// Camera-rebase origin currently applied to the meshes.
  pub current_camera_offset: IVec3,
}

impl FarBlock {
  pub fn new(p: IVec3, divs_per_mb: IVec3) -> Self {
    Self {
      params: FarBlockParameters::new(p, divs_per_mb),
      content: Vec::new(),
      is_culled_by_server: false,
      load_in_progress_on_server: false,
      refresh_from_server_counter: 0,
      crude_mesh: None,
      fine_mesh: None,
      mapblock_meshes: Vec::new(),
      mapblock2_meshes: Vec::new(),
      generating_mesh: false,
      mesh_is_outdated: false,
      mesh_is_empty: true,
      current_camera_offset: IVec3::ZERO,
    }
  }

  /// Highest level for which every required mesh slot is populated.
  pub fn current_mesh_level(&self) -> FarMeshLevel {
    if self.fine_mesh.is_some()
      && !self.mapblock_meshes.is_empty()
      && !self.mapblock2_meshes.is_empty()
    {
      return FarMeshLevel::FineAndSmall;
    }
    if self.fine_mesh.is_some() {
      return FarMeshLevel::Fine;
    }
    if self.crude_mesh.is_some() {
      return FarMeshLevel::Crude;
    }
    FarMeshLevel::None
  }

  pub fn unload_fine_mesh(&mut self) {
    self.fine_mesh = None;
  }

  pub fn unload_mapblock_meshes(&mut self) {
    self.mapblock_meshes.clear();
    self.mapblock2_meshes.clear();
  }

  /// Re-translate the meshes when the world origin moves to `camera_offset`
  /// (in node units). The small meshes only exist alongside a fine mesh,
  /// so they are translated under its guard.
  pub fn update_camera_offset(&mut self, camera_offset: IVec3) {
    if camera_offset == self.current_camera_offset {
      return;
    }
    let delta = (self.current_camera_offset - camera_offset).as_vec3() * BS;

    if let Some(m) = &self.crude_mesh {
      m.translate(delta);
    }
    if let Some(m) = &self.fine_mesh {
      m.translate(delta);
      for m in self.mapblock_meshes.iter().flatten() {
        m.translate(delta);
      }
      for m in self.mapblock2_meshes.iter().flatten() {
        m.translate(delta);
      }
    }

    self.current_camera_offset = camera_offset;
  }

  /// Meshes were just produced in un-rebased world space; mark them as at
  /// origin and apply the current rebase.
  pub fn reset_camera_offset(&mut self, camera_offset: IVec3) {
    self.current_camera_offset = IVec3::ZERO;
    self.update_camera_offset(camera_offset);
  }

  #[inline]
  pub fn index(&self, p: IVec3) -> usize {
    self.params.content_area.index(p)
  }

  /// Compact state summary for trace logging.
  pub fn describe(&self) -> String {
    format!(
      "[{:?} divs={:?} content={} culled={} loading={} generating={} outdated={} empty={} level={:?}]",
      self.params.p,
      self.params.divs_per_mb,
      self.content.len(),
      self.is_culled_by_server,
      self.load_in_progress_on_server,
      self.generating_mesh,
      self.mesh_is_outdated,
      self.mesh_is_empty,
      self.current_mesh_level(),
    )
  }
}

/// All FarBlocks sharing an `(x, z)` column. The sector exclusively owns
/// its blocks.
pub struct FarSector {
  pub p: IVec2,
  pub blocks: BTreeMap<i32, FarBlock>,
}

impl FarSector {
  pub fn new(p: IVec2) -> Self {
    Self {
      p,
      blocks: BTreeMap::new(),
    }
  }

  pub fn block(&self, y: i32) -> Option<&FarBlock> {
    self.blocks.get(&y)
  }

  pub fn block_mut(&mut self, y: i32) -> Option<&mut FarBlock> {
    self.blocks.get_mut(&y)
  }

  /// The first insertion fixes the block's `divs_per_mb`; later callers
  /// get the existing block regardless of the value they pass.
  pub fn get_or_create_block(&mut self, y: i32, divs_per_mb: IVec3) -> &mut FarBlock {
    let p3d = IVec3::new(self.p.x, y, self.p.y);
    self
      .blocks
      .entry(y)
      .or_insert_with(|| FarBlock::new(p3d, divs_per_mb))
  }
}

#[cfg(test)]
#[path = "block_test.rs"]
mod block_test;
