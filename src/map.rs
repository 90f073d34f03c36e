//! The FarMap: owner of every FarBlock, the worker, the atlas and the
//! per-frame draw scheduler.
//!
//! All methods here run on the main thread. Heavy work is posted to the
//! worker and applied back during `update()`; `render()` walks every
//! loaded block, culls by distance, picks the mesh level that avoids
//! double-drawing with the near renderer, and lazily dispatches builds for
//! whatever detail is missing.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{IVec2, IVec3, Vec3};
use tracing::{debug, info, trace};
use web_time::Instant;

use crate::area::{BlockAreaBitmap, VoxelArea};
use crate::atlas::{AtlasSnapshot, FarAtlas};
use crate::block::{FarBlock, FarBlockParameters, FarSector};
use crate::constants::{BS, FMP};
use crate::decode::FarBlockInsertTask;
use crate::fetch::FacePositionCache;
use crate::host::{
  DrawFilters, NodeDefs, RenderPass, SceneRegistrar, Settings, ShaderSource, TextureSource,
  VideoDriver,
};
use crate::mesh::MeshHandle;
use crate::meshgen::{FarBlockMeshGenerateTask, MeshBundle, ShadingConfig};
use crate::metrics::{FarMapMetrics, FrameStats};
use crate::types::{Aabb, CompressedFarBlock, FarMeshLevel, FarNode};
use crate::worker::FarMapWorker;

/// Host collaborators, handed over once at construction.
pub struct FarMapContext {
  pub settings: Arc<dyn Settings>,
  pub node_defs: Arc<dyn NodeDefs + Send + Sync>,
  pub textures: Arc<dyn TextureSource>,
  pub shaders: Arc<dyn ShaderSource>,
}

/// Settings snapshot, re-polled every `update()`.
#[derive(Clone, Copy, Debug)]
pub struct FarMapConfig {
  pub enable_shaders: bool,
  pub trilinear_filter: bool,
  pub bilinear_filter: bool,
  pub anisotropic_filter: bool,
  /// Far-terrain draw range in node units, clamped to >= 100.
  pub far_map_range: i16,
  /// Distance under which the fine mesh is preferred, in node units.
  pub fine_mesh_distance: i16,
}

impl Default for FarMapConfig {
  fn default() -> Self {
    Self {
      enable_shaders: false,
      trilinear_filter: false,
      bilinear_filter: false,
      anisotropic_filter: false,
      far_map_range: 800,
      fine_mesh_distance: 1000,
    }
  }
}

pub struct FarMap {
  ctx: FarMapContext,
  pub atlas: FarAtlas,
  atlas_snapshot: Arc<AtlasSnapshot>,
  pub config: FarMapConfig,
  pub farblock_shader_id: u32,
  pub normally_rendered_blocks: BlockAreaBitmap,
  pub current_camera_offset: IVec3,
  pub metrics: FarMapMetrics,
  visible: bool,
  pub(crate) worker: FarMapWorker,
  pub(crate) sectors: BTreeMap<(i32, i32), FarSector>,
  bounding_box: Aabb,
  pub(crate) face_positions: FacePositionCache,
  pub(crate) farblocks_exist_up_to_d: i32,
  pub(crate) exist_up_to_d_reset_counter: i32,
}

impl FarMap {
  pub fn new(ctx: FarMapContext) -> Self {
    let resolution = ctx.settings.get_s32("far_map_atlas_node_resolution");
    let mut map = Self {
      atlas: FarAtlas::new(resolution),
      atlas_snapshot: Arc::new(AtlasSnapshot::default()),
      config: FarMapConfig::default(),
      farblock_shader_id: 0,
      normally_rendered_blocks: BlockAreaBitmap::default(),
      current_camera_offset: IVec3::ZERO,
      metrics: FarMapMetrics::default(),
      visible: true,
      worker: FarMapWorker::start(),
      sectors: BTreeMap::new(),
      // Large enough that the host scene never frustum-culls the far map;
      // per-block culling happens in render().
      bounding_box: Aabb::new(
        Vec3::splat(-BS * 1_000_000.0),
        Vec3::splat(BS * 1_000_000.0),
      ),
      face_positions: FacePositionCache::new(),
      farblocks_exist_up_to_d: 0,
      exist_up_to_d_reset_counter: 0,
      ctx,
    };
    map.update_settings();
    map
  }

  // ===========================================================================
  // Container
  // ===========================================================================

  pub fn sector(&self, p: IVec2) -> Option<&FarSector> {
    self.sectors.get(&(p.x, p.y))
  }

  pub fn block(&self, p: IVec3) -> Option<&FarBlock> {
    self.sectors.get(&(p.x, p.z))?.block(p.y)
  }

  pub fn block_mut(&mut self, p: IVec3) -> Option<&mut FarBlock> {
    block_of(&mut self.sectors, p)
  }

  pub fn get_or_create_block(&mut self, p: IVec3, divs_per_mb: IVec3) -> &mut FarBlock {
    let sector = self
      .sectors
      .entry((p.x, p.z))
      .or_insert_with(|| FarSector::new(IVec2::new(p.x, p.z)));
    sector.get_or_create_block(p.y, divs_per_mb)
  }

  pub fn block_count(&self) -> usize {
    self.sectors.values().map(|s| s.blocks.len()).sum()
  }

  // ===========================================================================
  // Inserts
  // ===========================================================================

  /// Queue a server payload for background decoding.
  pub fn insert_compressed_far_block(&mut self, source: CompressedFarBlock) {
    self.metrics.tasks_added += 1;
    self.worker.add_task(Box::new(FarBlockInsertTask::new(source)));
  }

  /// Swap decoded content into the block (O(1) move). A changed
  /// `divs_per_mb` means the server upgraded the block's LOD: parameters
  /// are rebuilt and the old meshes stay up until the next build lands.
  pub fn insert_far_block(
    &mut self,
    fbp: IVec3,
    divs_per_mb: IVec3,
    content: Vec<FarNode>,
    is_partly_loaded: bool,
  ) {
    let b = self.get_or_create_block(fbp, divs_per_mb);
    if b.params.divs_per_mb != divs_per_mb {
      b.params = FarBlockParameters::new(fbp, divs_per_mb);
    }
    debug_assert_eq!(content.len(), b.params.content_area.volume());
    b.is_culled_by_server = false;
    b.load_in_progress_on_server = is_partly_loaded;
    b.mesh_is_empty = false;
    b.mesh_is_outdated = true;
    b.content = content;
    trace!(block = %b.describe(), "inserted far block content");
  }

  pub fn insert_empty_block(&mut self, fbp: IVec3) {
    debug!(position = ?fbp, "server reported far block empty");
    let b = self.get_or_create_block(fbp, IVec3::ZERO);
    b.is_culled_by_server = false;
    b.load_in_progress_on_server = false;
  }

  pub fn insert_culled_block(&mut self, fbp: IVec3) {
    debug!(position = ?fbp, "server reported far block culled");
    let b = self.get_or_create_block(fbp, IVec3::ZERO);
    b.is_culled_by_server = true;
    b.load_in_progress_on_server = false;
  }

  pub fn insert_load_in_progress_block(&mut self, fbp: IVec3) {
    debug!(position = ?fbp, "server reported far block load-in-progress");
    let b = self.get_or_create_block(fbp, IVec3::ZERO);
    b.is_culled_by_server = false;
    b.load_in_progress_on_server = true;
  }

  // ===========================================================================
  // Mesh generation plumbing
  // ===========================================================================

  /// Post a mesh-build task for the block at `fbp`. No-op while a build
  /// for it is already in flight.
  pub fn start_generating_block_mesh(&mut self, fbp: IVec3, level: FarMeshLevel) {
    let Some(b) = block_of(&mut self.sectors, fbp) else {
      return;
    };
    start_mesh_build(
      &self.worker,
      &self.ctx,
      &self.atlas_snapshot,
      self.config.enable_shaders,
      &mut self.metrics,
      b,
      level,
    );
  }

  /// Main-thread half of a finished build: move the produced meshes into
  /// the live block, dropping whatever it held before.
  pub fn insert_generated_block_mesh(&mut self, fbp: IVec3, bundle: MeshBundle) {
    let offset = self.current_camera_offset;
    let faces = bundle.crude_faces + bundle.fine_faces + bundle.small_faces;
    let Some(b) = block_of(&mut self.sectors, fbp) else {
      return;
    };
    b.generating_mesh = false;
    b.crude_mesh = bundle.crude.map(MeshHandle::new);
    b.fine_mesh = bundle.fine.map(MeshHandle::new);
    b.mesh_is_empty = b.crude_mesh.is_none() && b.fine_mesh.is_none();
    b.mapblock_meshes = bundle.mapblock.into_iter().map(|m| m.map(MeshHandle::new)).collect();
    b.mapblock2_meshes = bundle
      .mapblock2
      .into_iter()
      .map(|m| m.map(MeshHandle::new))
      .collect();
    b.reset_camera_offset(offset);

    self.metrics.meshes_generated += 1;
    self.metrics.faces_per_mesh.push(faces as u64);
  }

  // ===========================================================================
  // Frame driving
  // ===========================================================================

  /// Per-frame main-thread tick: poll settings, resolve the shader once,
  /// drain the worker's sync queue.
  pub fn update(&mut self) {
    self.update_settings();

    if self.farblock_shader_id == 0 && self.config.enable_shaders {
      // One static shader covers every far block face.
      self.farblock_shader_id = self.ctx.shaders.shader("nodes_shader");
      info!(shader_id = self.farblock_shader_id, "resolved far block shader");
    }

    loop {
      let Some(task) = self.worker.try_pop_synced() else {
        break;
      };
      task.sync(self);
      self.metrics.tasks_finished += 1;
    }
    self.metrics.tasks_dropped = self.worker.dropped_tasks();
  }

  fn update_settings(&mut self) {
    let s = Arc::clone(&self.ctx.settings);
    self.config.enable_shaders = s.get_bool("enable_shaders");
    self.config.trilinear_filter = s.get_bool("trilinear_filter");
    self.config.bilinear_filter = s.get_bool("bilinear_filter");
    self.config.anisotropic_filter = s.get_bool("anisotropic_filter");
    self.config.far_map_range = s.get_s16("far_map_range").max(100);
    let fine = s.get_s16("far_map_fine_distance");
    self.config.fine_mesh_distance = if fine < 1 { 1000 } else { fine };
  }

  /// Apply a new world-origin rebase (in node units): every mesh is
  /// translated in place by the delta.
  pub fn update_camera_offset(&mut self, camera_offset: IVec3) {
    if camera_offset == self.current_camera_offset {
      return;
    }
    self.current_camera_offset = camera_offset;
    for sector in self.sectors.values_mut() {
      for b in sector.blocks.values_mut() {
        b.update_camera_offset(camera_offset);
      }
    }
  }

  /// The near renderer's per-frame report of the map-blocks it drew;
  /// consulted during render to avoid double-drawing.
  pub fn report_normally_rendered_blocks(&mut self, bitmap: BlockAreaBitmap) {
    self.normally_rendered_blocks = bitmap;
  }

  /// Register every known voxel's face textures and bake the atlas.
  /// Call after the client has received all node definitions.
  pub fn create_atlas(&mut self, driver: &mut dyn VideoDriver) {
    let defs = Arc::clone(&self.ctx.node_defs);

    let mut num_nodes: u32 = 0;
    while num_nodes <= u16::MAX as u32 {
      let f = defs.get(num_nodes as u16);
      if f.name.is_empty() || f.name == "unknown" {
        break;
      }
      num_nodes += 1;
    }

    self.atlas.prepare_for_nodes(num_nodes as usize);

    for id in 0..num_nodes as u16 {
      let f = defs.get(id);
      if f.tile_top.is_empty() {
        continue;
      }
      let top = f.tile_top.clone();
      let bottom = if f.tile_bottom.is_empty() { top.clone() } else { f.tile_bottom.clone() };
      let side = if f.tile_side.is_empty() { top.clone() } else { f.tile_side.clone() };
      trace!(id, name = %f.name, %top, %bottom, %side, "adding node to far atlas");
      self.atlas.add_node(id, &top, &bottom, &side, f.is_liquid());
    }

    info!(nodes = num_nodes, "baking far map atlas");
    self.atlas.refresh_textures(&*self.ctx.textures, driver);
    self.atlas_snapshot = Arc::new(self.atlas.snapshot());
  }

  // ===========================================================================
  // Scene node surface
  // ===========================================================================

  pub fn set_visible(&mut self, visible: bool) {
    self.visible = visible;
  }

  pub fn is_visible(&self) -> bool {
    self.visible
  }

  pub fn on_register_scene_node(&self, registrar: &mut dyn SceneRegistrar) {
    if self.visible {
      registrar.register_for_rendering(RenderPass::Solid);
    }
  }

  pub fn bounding_box(&self) -> Aabb {
    self.bounding_box
  }

  /// Draw scheduler: one pass over every loaded block.
  ///
  /// `camera_pos` is the camera's position in rebased scene units.
  pub fn render(&mut self, driver: &mut dyn VideoDriver, camera_pos: Vec3) {
    let start = Instant::now();
    self.metrics.frame = FrameStats::default();

    let filters = DrawFilters {
      trilinear: self.config.trilinear_filter,
      bilinear: self.config.bilinear_filter,
      anisotropic: self.config.anisotropic_filter,
    };
    let camera_world = camera_pos + self.current_camera_offset.as_vec3() * BS;

    for sector in self.sectors.values_mut() {
      self.metrics.frame.total_farblocks += sector.blocks.len();
      for b in sector.blocks.values_mut() {
        render_block(
          b,
          driver,
          &filters,
          camera_world,
          &self.normally_rendered_blocks,
          &self.config,
          &self.worker,
          &self.ctx,
          &self.atlas_snapshot,
          &mut self.metrics,
        );
      }
    }

    self.metrics.frame.render_time_us = start.elapsed().as_micros() as u64;
  }
}

pub(crate) fn block_of(
  sectors: &mut BTreeMap<(i32, i32), FarSector>,
  p: IVec3,
) -> Option<&mut FarBlock> {
  sectors.get_mut(&(p.x, p.z))?.block_mut(p.y)
}

/// Flag the block, snapshot it and hand the build to the worker.
fn start_mesh_build(
  worker: &FarMapWorker,
  ctx: &FarMapContext,
  atlas: &Arc<AtlasSnapshot>,
  enable_shaders: bool,
  metrics: &mut FarMapMetrics,
  b: &mut FarBlock,
  level: FarMeshLevel,
) {
  if b.generating_mesh {
    return;
  }
  b.generating_mesh = true;
  b.mesh_is_outdated = false;
  trace!(block = %b.describe(), ?level, "starting far block mesh build");

  let task = FarBlockMeshGenerateTask::new(
    b,
    level,
    Arc::clone(atlas),
    Arc::clone(&ctx.node_defs),
    ShadingConfig { enable_shaders },
  );
  worker.add_task(Box::new(task));
  metrics.tasks_added += 1;
}

/// Per-block render decision, mirroring the per-frame traversal order:
/// cull, choose level, draw, then demand or evict meshes.
fn render_block(
  b: &mut FarBlock,
  driver: &mut dyn VideoDriver,
  filters: &DrawFilters,
  camera_world: Vec3,
  nrb: &BlockAreaBitmap,
  config: &FarMapConfig,
  worker: &FarMapWorker,
  ctx: &FarMapContext,
  atlas: &Arc<AtlasSnapshot>,
  metrics: &mut FarMapMetrics,
) {
  if b.mesh_is_empty && !b.mesh_is_outdated {
    return;
  }

  // Distance culling keeps the number of generated meshes bounded; meshes
  // use nasty amounts of memory.
  let d = (camera_world - b.params.center_world()).length();
  if d > config.far_map_range as f32 * BS {
    return;
  }

  let fb_origin_mb = b.params.p * FMP;
  let local_mb_area = VoxelArea::with_size(IVec3::ZERO, IVec3::splat(FMP));
  let area_in_mapblocks = VoxelArea::with_size(fb_origin_mb, IVec3::splat(FMP));

  // If any contained map-block is drawn by the near renderer, the whole
  // mesh cannot be used and the block is drawn in pieces instead.
  let mut being_normally_rendered = false;
  if nrb.touches(&area_in_mapblocks) {
    'scan: for z in 0..FMP {
      for y in 0..FMP {
        for x in 0..FMP {
          if nrb.get(fb_origin_mb + IVec3::new(x, y, z)) {
            being_normally_rendered = true;
            break 'scan;
          }
        }
      }
    }
  }

  let mut level_wanted = if being_normally_rendered {
    FarMeshLevel::FineAndSmall
  } else {
    FarMeshLevel::Crude
  };

  let mut render_in_pieces = being_normally_rendered;
  let mut avoid_crude = false;
  if render_in_pieces && b.current_mesh_level() < FarMeshLevel::FineAndSmall {
    // The pieces aren't built yet. Drawing the crude mesh now would only
    // blink away next frame, so draw nothing until the pieces land.
    render_in_pieces = false;
    avoid_crude = true;
  }

  if render_in_pieces {
    let half = FMP / 2;
    let pieces2_area = VoxelArea::with_size(IVec3::ZERO, IVec3::splat(half));
    for z in 0..half {
      for y in 0..half {
        for x in 0..half {
          let mp2 = IVec3::new(x, y, z);
          let mp1 = fb_origin_mb + mp2 * 2;

          let mut any_covered = false;
          for dz in 0..2 {
            for dy in 0..2 {
              for dx in 0..2 {
                if nrb.get(mp1 + IVec3::new(dx, dy, dz)) {
                  any_covered = true;
                }
              }
            }
          }

          if !any_covered {
            let mi = pieces2_area.index(mp2);
            if let Some(Some(mesh)) = b.mapblock2_meshes.get(mi) {
              driver.draw_mesh(mesh, filters);
              metrics.frame.rendered_mapblock2_parts += 1;
            }
          } else {
            for dz in 0..2 {
              for dy in 0..2 {
                for dx in 0..2 {
                  let mp = mp1 + IVec3::new(dx, dy, dz);
                  if nrb.get(mp) {
                    continue;
                  }
                  let mi = local_mb_area.index(mp - fb_origin_mb);
                  if let Some(Some(mesh)) = b.mapblock_meshes.get(mi) {
                    driver.draw_mesh(mesh, filters);
                    metrics.frame.rendered_mapblock_parts += 1;
                  }
                }
              }
            }
          }
        }
      }
    }
  } else {
    let fine_mesh_wanted = d < config.fine_mesh_distance as f32 * BS;

    if let Some(fine) = b.fine_mesh.as_ref().filter(|_| fine_mesh_wanted) {
      driver.draw_mesh(fine, filters);
      metrics.frame.rendered_farblocks += 1;
    } else if let Some(crude) = b.crude_mesh.as_ref().filter(|_| !avoid_crude) {
      driver.draw_mesh(crude, filters);
      metrics.frame.rendered_crudes += 1;
    }

    if fine_mesh_wanted && level_wanted <= FarMeshLevel::Crude {
      level_wanted = FarMeshLevel::Fine;
    }
  }

  if b.generating_mesh {
    // Let the in-flight build land first; at most one per block.
  } else if b.current_mesh_level() < level_wanted || b.mesh_is_outdated {
    start_mesh_build(worker, ctx, atlas, config.enable_shaders, metrics, b, level_wanted);
  } else if b.current_mesh_level() > level_wanted {
    // Reclaim RAM from detail nothing needs anymore.
    if level_wanted < FarMeshLevel::FineAndSmall {
      b.unload_mapblock_meshes();
    }
    if level_wanted < FarMeshLevel::Fine {
      b.unload_fine_mesh();
    }
  }
}

#[cfg(test)]
#[path = "map_test.rs"]
mod map_test;
