//! Mesh generation: face extraction over padded voxel buffers, at three
//! levels of detail.
//!
//! A build task snapshots its FarBlock by value so the worker never races
//! the main thread. Each LOD pass constructs a *generation area* plus a
//! *content buffer* extended by one FarNode on every face, then runs
//! [`extract_faces`]: for every cell, compare solidness against the +X/+Y/
//! +Z neighbors and emit a quad facing the less solid side, lit by the
//! voxel the face looks into. Faces whose voxel has no atlas segment are
//! skipped entirely, which is also how unknown space stays invisible.

use std::sync::Arc;

use glam::{IVec3, Vec2, Vec3};

use crate::area::VoxelArea;
use crate::atlas::AtlasSnapshot;
use crate::block::{FarBlock, FarBlockParameters};
use crate::constants::{decode_light, BS, CONTENT_AIR, CONTENT_IGNORE, DAYNIGHT_RATIO, FMP, MB};
use crate::host::NodeDefs;
use crate::map::FarMap;
use crate::mesh::{FarMesh, FarVertex, MeshCollector, MeshHint};
use crate::types::{FarMeshLevel, FarNode};
use crate::worker::FarMapTask;

/// Lighting options captured when the build is dispatched.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShadingConfig {
  /// With shaders the vertex color carries the raw day/night pair and the
  /// shader blends at render time; without, the builder pre-blends here.
  pub enable_shaders: bool,
}

/// Everything `extract_faces` needs besides the voxel buffer.
struct MeshGenContext<'a> {
  defs: &'a dyn NodeDefs,
  atlas: &'a AtlasSnapshot,
  shading: ShadingConfig,
}

/// Meshes produced by one build, plus face counts for the profiler.
#[derive(Default)]
pub struct MeshBundle {
  pub crude: Option<FarMesh>,
  pub fine: Option<FarMesh>,
  pub mapblock: Vec<Option<FarMesh>>,
  pub mapblock2: Vec<Option<FarMesh>>,
  pub crude_faces: usize,
  pub fine_faces: usize,
  pub small_faces: usize,
}

const V: fn(i32, i32, i32) -> IVec3 = IVec3::new;

/// Corner directions of the quad facing `dir`, wound counter-clockwise as
/// seen from outside.
fn face_vertex_dirs(dir: IVec3) -> [IVec3; 4] {
  match (dir.x, dir.y, dir.z) {
    (0, 0, 1) => [V(-1, -1, 1), V(1, -1, 1), V(1, 1, 1), V(-1, 1, 1)],
    (0, 0, -1) => [V(1, -1, -1), V(-1, -1, -1), V(-1, 1, -1), V(1, 1, -1)],
    (0, 1, 0) => [V(1, 1, -1), V(-1, 1, -1), V(-1, 1, 1), V(1, 1, 1)],
    (0, -1, 0) => [V(1, -1, 1), V(-1, -1, 1), V(-1, -1, -1), V(1, -1, -1)],
    (1, 0, 0) => [V(1, -1, 1), V(1, -1, -1), V(1, 1, -1), V(1, 1, 1)],
    (-1, 0, 0) => [V(-1, -1, -1), V(-1, -1, 1), V(-1, 1, 1), V(-1, 1, -1)],
    _ => unreachable!("not an axis direction: {dir:?}"),
  }
}

/// Emit one face of `n` at cell `p` toward `dir`, lit by the decoded
/// day/night pair of the voxel the face looks into (`n2`) when known.
/// Returns false when the voxel has no usable atlas segment.
fn add_face(
  collector: &mut MeshCollector,
  n: FarNode,
  p: IVec3,
  n2: FarNode,
  dir: IVec3,
  divs_per_mb: IVec3,
  ctx: &MeshGenContext,
) -> bool {
  let face = if dir.y == 1 {
    0
  } else if dir.y == -1 {
    1
  } else {
    2
  };
  let crude = divs_per_mb.x == 1;
  let Some(cache) = ctx.atlas.node(n.id, face, crude) else {
    return false;
  };
  let Some(texture) = cache.texture else {
    return false;
  };

  // World-unit size of one cell at this LOD.
  let scale = Vec3::new(
    MB as f32 / divs_per_mb.x as f32,
    MB as f32 / divs_per_mb.y as f32,
    MB as f32 / divs_per_mb.z as f32,
  );
  let center = (p.as_vec3() + 0.5) * scale * BS;
  let normal = dir.as_vec3();

  let selected_light = if n2.id != CONTENT_IGNORE { n2.light } else { n.light };
  let day = decode_light(selected_light & 0x0f);
  let night = decode_light((selected_light & 0xf0) >> 4);
  let color = if ctx.shading.enable_shaders {
    // day | night << 8 in the diffuse channel, light-source bit zero.
    [day, night, 0, 255]
  } else {
    let c = ((day as u32 * DAYNIGHT_RATIO + night as u32 * (1000 - DAYNIGHT_RATIO)) / 1000) as u8;
    [c, c, c, 255]
  };

  let uvs = [
    Vec2::new(cache.coord1.x, cache.coord1.y),
    Vec2::new(cache.coord0.x, cache.coord1.y),
    Vec2::new(cache.coord0.x, cache.coord0.y),
    Vec2::new(cache.coord1.x, cache.coord0.y),
  ];
  let dirs = face_vertex_dirs(dir);

  let mut vertices = [FarVertex {
    position: Vec3::ZERO,
    normal,
    color,
    uv: Vec2::ZERO,
  }; 4];
  for i in 0..4 {
    vertices[i].position = center + dirs[i].as_vec3() * scale * (BS / 2.0);
    vertices[i].uv = uvs[i];
  }
  collector.append_quad(texture, &vertices);
  true
}

/// Walk `gen_area` (plus a minus-one rim) and emit faces between every
/// cell and its +X/+Y/+Z neighbors wherever solidness differs. The buffer
/// must extend one cell past the generation area on every face.
fn extract_faces(
  collector: &mut MeshCollector,
  data: &[FarNode],
  data_area: &VoxelArea,
  gen_area: &VoxelArea,
  divs_per_mb: IVec3,
  ctx: &MeshGenContext,
) -> usize {
  debug_assert!(data_area.min.cmple(gen_area.min - IVec3::ONE).all());
  debug_assert!(data_area.max.cmpge(gen_area.max + IVec3::ONE).all());

  let (sx, sy, sz) = data_area.strides();
  let mut faces = 0usize;

  for z in (gen_area.min.z - 1)..=gen_area.max.z {
    for y in (gen_area.min.y - 1)..=gen_area.max.y {
      for x in (gen_area.min.x - 1)..=gen_area.max.x {
        let p000 = IVec3::new(x, y, z);
        let i000 = data_area.index(p000);
        let n000 = data[i000];
        let n100 = data[i000 + sx];
        let n010 = data[i000 + sy];
        let n001 = data[i000 + sz];
        let s000 = ctx.defs.get(n000.id).mesh_solidness();
        let s100 = ctx.defs.get(n100.id).mesh_solidness();
        let s010 = ctx.defs.get(n010.id).mesh_solidness();
        let s001 = ctx.defs.get(n001.id).mesh_solidness();

        if s000 > s001 {
          faces += add_face(collector, n000, p000, n001, V(0, 0, 1), divs_per_mb, ctx) as usize;
        } else if s000 < s001 {
          let p001 = p000 + V(0, 0, 1);
          faces += add_face(collector, n001, p001, n000, V(0, 0, -1), divs_per_mb, ctx) as usize;
        }
        if s000 > s010 {
          faces += add_face(collector, n000, p000, n010, V(0, 1, 0), divs_per_mb, ctx) as usize;
        } else if s000 < s010 {
          let p010 = p000 + V(0, 1, 0);
          faces += add_face(collector, n010, p010, n000, V(0, -1, 0), divs_per_mb, ctx) as usize;
        }
        if s000 > s100 {
          faces += add_face(collector, n000, p000, n100, V(1, 0, 0), divs_per_mb, ctx) as usize;
        } else if s000 < s100 {
          let p100 = p000 + V(1, 0, 0);
          faces += add_face(collector, n100, p100, n000, V(-1, 0, 0), divs_per_mb, ctx) as usize;
        }
      }
    }
  }
  faces
}

/// Worker task that builds all meshes one FarBlock needs at `level`.
pub struct FarBlockMeshGenerateTask {
  params: FarBlockParameters,
  content: Vec<FarNode>,
  level: FarMeshLevel,
  atlas: Arc<AtlasSnapshot>,
  defs: Arc<dyn NodeDefs + Send + Sync>,
  shading: ShadingConfig,
  bundle: MeshBundle,
}

impl FarBlockMeshGenerateTask {
  /// Snapshot `block` for off-thread building. Mesh slots are not copied;
  /// the live block keeps its old meshes until sync replaces them.
  pub fn new(
    block: &FarBlock,
    level: FarMeshLevel,
    atlas: Arc<AtlasSnapshot>,
    defs: Arc<dyn NodeDefs + Send + Sync>,
    shading: ShadingConfig,
  ) -> Self {
    Self {
      params: block.params,
      content: block.content.clone(),
      level,
      atlas,
      defs,
      shading,
      bundle: MeshBundle::default(),
    }
  }

  fn build(&mut self) {
    if self.content.is_empty() || self.params.content_area.is_empty() {
      return;
    }
    let ctx = MeshGenContext {
      defs: &*self.defs,
      atlas: &self.atlas,
      shading: self.shading,
    };

    let (crude, crude_faces) = build_crude_pass(&self.params, &self.content, &ctx);
    self.bundle.crude = crude;
    self.bundle.crude_faces = crude_faces;

    if self.level >= FarMeshLevel::Fine {
      let (fine, fine_faces) = build_fine_pass(&self.params, &self.content, &ctx);
      self.bundle.fine = fine;
      self.bundle.fine_faces = fine_faces;
    }
    if self.level >= FarMeshLevel::FineAndSmall {
      let (mapblock, f1) = build_piece_pass(&self.params, &self.content, 1, &ctx);
      let (mapblock2, f2) = build_piece_pass(&self.params, &self.content, 2, &ctx);
      self.bundle.mapblock = mapblock;
      self.bundle.mapblock2 = mapblock2;
      self.bundle.small_faces = f1 + f2;
    }
  }
}

/// Crude pass: a FMP^3 lattice in map-block units, one representative
/// voxel per map-block found by walking each column from the top down to
/// the first non-air sample.
fn build_crude_pass(
  params: &FarBlockParameters,
  content: &[FarNode],
  ctx: &MeshGenContext,
) -> (Option<FarMesh>, usize) {
  let divs = params.divs_per_mb;
  let gen_area = VoxelArea::with_size(params.p * FMP, IVec3::splat(FMP));
  let buf_area = VoxelArea::new(gen_area.min - IVec3::ONE, gen_area.max + IVec3::ONE);
  let mut buf = vec![FarNode::IGNORE; buf_area.volume()];

  for z in buf_area.min.z..=buf_area.max.z {
    for y in buf_area.min.y..=buf_area.max.y {
      for x in buf_area.min.x..=buf_area.max.x {
        let p = IVec3::new(x, y, z);
        let mut n = FarNode::IGNORE;
        let mut source_p = IVec3::new(
          p.x * divs.x + divs.x / 2,
          p.y * divs.y + divs.y - 1,
          p.z * divs.z + divs.z / 2,
        );
        if params.content_area.contains(source_p) {
          let column_floor = p.y * divs.y;
          while source_p.y >= column_floor {
            n = content[params.content_area.index(source_p)];
            if n.id != CONTENT_IGNORE && n.id != CONTENT_AIR {
              break;
            }
            source_p.y -= 1;
          }
        }
        let i = buf_area.index(p);
        buf[i] = if gen_area.contains(p) {
          n
        } else if n.id != CONTENT_IGNORE {
          // Outside the generation area only the light survives, in air.
          FarNode::air(n.light)
        } else {
          FarNode::IGNORE
        };
      }
    }
  }

  let mut collector = MeshCollector::new();
  let faces = extract_faces(&mut collector, &buf, &buf_area, &gen_area, IVec3::ONE, ctx);
  (collector.into_mesh(MeshHint::Static), faces)
}

/// Fine pass: full resolution over the block's own padded content.
fn build_fine_pass(
  params: &FarBlockParameters,
  content: &[FarNode],
  ctx: &MeshGenContext,
) -> (Option<FarMesh>, usize) {
  let mut collector = MeshCollector::new();
  let faces = extract_faces(
    &mut collector,
    content,
    &params.content_area,
    &params.effective_area,
    params.divs_per_mb,
    ctx,
  );
  (collector.into_mesh(MeshHint::Static), faces)
}

/// Sub-meshes covering `span`^3 map-blocks each. Not GPU-static: these
/// churn with the near renderer's movement and would exhaust VBO limits.
fn build_piece_pass(
  params: &FarBlockParameters,
  content: &[FarNode],
  span: i32,
  ctx: &MeshGenContext,
) -> (Vec<Option<FarMesh>>, usize) {
  let divs = params.divs_per_mb;
  let cells = FMP / span;
  let pieces_area = VoxelArea::with_size(IVec3::ZERO, IVec3::splat(cells));
  let mut meshes: Vec<Option<FarMesh>> = vec![None; pieces_area.volume()];
  let mut total_faces = 0usize;
  let mut buf = Vec::new();

  for z in 0..cells {
    for y in 0..cells {
      for x in 0..cells {
        let mp = IVec3::new(x, y, z);
        let gen_area = VoxelArea::with_size(params.dp00 + divs * mp * span, divs * span);
        let buf_area = VoxelArea::new(gen_area.min - IVec3::ONE, gen_area.max + IVec3::ONE);
        buf.clear();
        buf.resize(buf_area.volume(), FarNode::IGNORE);

        for pz in buf_area.min.z..=buf_area.max.z {
          for py in buf_area.min.y..=buf_area.max.y {
            for px in buf_area.min.x..=buf_area.max.x {
              let p = IVec3::new(px, py, pz);
              let i = buf_area.index(p);
              buf[i] = if gen_area.contains(p) {
                content[params.content_area.index(p)]
              } else if params.content_area.contains(p) {
                let n = content[params.content_area.index(p)];
                if n.id != CONTENT_IGNORE {
                  FarNode::air(n.light)
                } else {
                  FarNode::IGNORE
                }
              } else {
                FarNode::IGNORE
              };
            }
          }
        }

        let mut collector = MeshCollector::new();
        let faces = extract_faces(&mut collector, &buf, &buf_area, &gen_area, divs, ctx);
        total_faces += faces;
        meshes[pieces_area.index(mp)] = collector.into_mesh(MeshHint::Transient);
      }
    }
  }
  (meshes, total_faces)
}

impl FarMapTask for FarBlockMeshGenerateTask {
  fn in_thread(&mut self) {
    self.build();
  }

  fn sync(self: Box<Self>, map: &mut FarMap) {
    let this = *self;
    map.insert_generated_block_mesh(this.params.p, this.bundle);
  }
}

#[cfg(test)]
#[path = "meshgen_test.rs"]
mod meshgen_test;
