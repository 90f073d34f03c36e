//! Texture atlas packer for far-terrain faces.
//!
//! Every `(voxel id, face, lod)` combination maps to a *segment* on one of
//! a small number of atlas pages. References are stable for the process
//! lifetime: a page never reflows after a segment has been issued, so the
//! UV rectangle a caller cached stays valid even when `refresh_textures`
//! re-bakes the pixels underneath it.
//!
//! Baking happens on the main thread. Because distant terrain cannot
//! afford per-face dynamic shading, directional shading is baked into the
//! segments themselves: side faces are pre-darkened, liquid faces get an
//! extra darkening so water stays legible at range, and the crude LOD runs
//! a stronger pixelation filter to suppress shimmer.

use std::collections::HashMap;

use glam::Vec2;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::host::{TextureHandle, TextureSource, VideoDriver};

/// Atlas id 0 means "no segment".
pub const ATLAS_UNDEFINED: usize = 0;

/// Simulated-distance parameters baked into a segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SegmentLod {
  /// Pixelation divisor; 4 for fine segments, 16 for crude ones.
  pub level: u8,
  /// Top faces keep full brightness when shadows are baked.
  pub top_face: bool,
  /// Bake directional shading into the pixels.
  pub bake_shadows: bool,
  /// Extra darkening for liquids.
  pub darken_like_liquid: bool,
}

/// Value-identity description of one segment. Submitting an equal
/// definition twice returns the same reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AtlasSegmentDefinition {
  pub image_name: String,
  /// Sprite-sheet subdivision of the source image.
  pub total_segments: (u32, u32),
  /// Which sprite-sheet cell to use.
  pub select_segment: (u32, u32),
  /// Pixel size of the baked segment.
  pub target_size: (u32, u32),
  pub lod: SegmentLod,
}

/// Stable handle to a packed segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AtlasSegmentReference {
  /// 0 = undefined atlas.
  pub atlas_id: usize,
  pub segment_id: usize,
}

/// Resolved render data for a segment: the page texture and the UV
/// rectangle. `texture` is `None` when the source image was missing at
/// bake time; the mesh builder emits no faces for such segments.
#[derive(Clone, Copy, Debug)]
pub struct AtlasSegmentCache {
  pub texture: Option<TextureHandle>,
  pub coord0: Vec2,
  pub coord1: Vec2,
}

struct AtlasPage {
  segment_resolution: (u32, u32),
  grid: (u32, u32),
  definitions: Vec<AtlasSegmentDefinition>,
  image: RgbaImage,
  caches: Vec<AtlasSegmentCache>,
}

impl AtlasPage {
  fn new(segment_resolution: (u32, u32), grid: (u32, u32)) -> Self {
    let w = segment_resolution.0 * grid.0;
    let h = segment_resolution.1 * grid.1;
    Self {
      segment_resolution,
      grid,
      definitions: Vec::new(),
      image: RgbaImage::new(w, h),
      caches: Vec::new(),
    }
  }

  fn capacity(&self) -> usize {
    (self.grid.0 * self.grid.1) as usize
  }

  fn is_full(&self) -> bool {
    self.definitions.len() >= self.capacity()
  }

  /// Grid cell of segment `i` and its UV rectangle on this page.
  fn segment_rect(&self, i: usize) -> ((u32, u32), Vec2, Vec2) {
    let cx = i as u32 % self.grid.0;
    let cy = i as u32 / self.grid.0;
    let (pw, ph) = (self.image.width() as f32, self.image.height() as f32);
    let coord0 = Vec2::new(
      (cx * self.segment_resolution.0) as f32 / pw,
      (cy * self.segment_resolution.1) as f32 / ph,
    );
    let coord1 = coord0
      + Vec2::new(
        self.segment_resolution.0 as f32 / pw,
        self.segment_resolution.1 as f32 / ph,
      );
    ((cx, cy), coord0, coord1)
  }
}

/// Owns the atlas pages and the definition-to-reference index.
pub struct AtlasRegistry {
  name: String,
  pages: Vec<AtlasPage>,
  by_definition: HashMap<AtlasSegmentDefinition, AtlasSegmentReference>,
  planned_grid: (u32, u32),
}

impl AtlasRegistry {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      pages: Vec::new(),
      by_definition: HashMap::new(),
      planned_grid: (8, 8),
    }
  }

  /// Pre-size pages for an upcoming batch of `num_segments` segments of
  /// `segment_size` pixels each.
  pub fn prepare_for_segments(&mut self, num_segments: usize, segment_size: (u32, u32)) {
    let side = (num_segments as f64).sqrt().ceil().max(1.0) as u32;
    self.planned_grid = (side, (num_segments as u32).div_ceil(side).max(1));
    info!(
      atlas = %self.name,
      num_segments,
      segment_w = segment_size.0,
      segment_h = segment_size.1,
      "preparing atlas pages"
    );
  }

  /// Deduplicating insert: equal definitions resolve to the same reference
  /// and do not grow the atlas.
  pub fn find_or_add_segment(&mut self, def: &AtlasSegmentDefinition) -> AtlasSegmentReference {
    if let Some(existing) = self.by_definition.get(def) {
      return *existing;
    }
    let r = self.add_segment(def.clone());
    self.by_definition.insert(def.clone(), r);
    r
  }

  fn add_segment(&mut self, def: AtlasSegmentDefinition) -> AtlasSegmentReference {
    let page_index = match self
      .pages
      .iter()
      .position(|p| p.segment_resolution == def.target_size && !p.is_full())
    {
      Some(i) => i,
      None => {
        self.pages.push(AtlasPage::new(def.target_size, self.planned_grid));
        self.pages.len() - 1
      }
    };
    let page = &mut self.pages[page_index];
    let segment_id = page.definitions.len();
    let (_, coord0, coord1) = page.segment_rect(segment_id);
    page.definitions.push(def);
    page.caches.push(AtlasSegmentCache {
      texture: None,
      coord0,
      coord1,
    });
    AtlasSegmentReference {
      atlas_id: page_index + 1,
      segment_id,
    }
  }

  /// Re-bake every page and upload the results. Must run on the main
  /// thread between frames; previously issued references keep resolving to
  /// the same regions.
  pub fn refresh_textures(&mut self, textures: &dyn TextureSource, driver: &mut dyn VideoDriver) {
    for (page_index, page) in self.pages.iter_mut().enumerate() {
      let mut baked = vec![false; page.definitions.len()];
      for (i, def) in page.definitions.iter().enumerate() {
        match bake_segment(def, page.segment_resolution, textures) {
          Some(segment) => {
            let ((cx, cy), _, _) = page.segment_rect(i);
            imageops::replace(
              &mut page.image,
              &segment,
              (cx * page.segment_resolution.0) as i64,
              (cy * page.segment_resolution.1) as i64,
            );
            baked[i] = true;
          }
          None => {
            warn!(
              atlas = %self.name,
              image = %def.image_name,
              "source texture missing, segment stays null"
            );
          }
        }
      }
      let texture = driver.upload_texture(&page.image);
      for (i, cache) in page.caches.iter_mut().enumerate() {
        cache.texture = if baked[i] { Some(texture) } else { None };
      }
      debug!(
        atlas = %self.name,
        page = page_index,
        segments = page.definitions.len(),
        "baked atlas page"
      );
    }
  }

  pub fn get(&self, r: &AtlasSegmentReference) -> Option<&AtlasSegmentCache> {
    if r.atlas_id == ATLAS_UNDEFINED {
      return None;
    }
    self.pages.get(r.atlas_id - 1)?.caches.get(r.segment_id)
  }

  pub fn page_count(&self) -> usize {
    self.pages.len()
  }

  pub fn segment_count(&self) -> usize {
    self.pages.iter().map(|p| p.definitions.len()).sum()
  }
}

/// Bake one segment image: sprite-sheet select, LOD pixelation, shading.
fn bake_segment(
  def: &AtlasSegmentDefinition,
  resolution: (u32, u32),
  textures: &dyn TextureSource,
) -> Option<RgbaImage> {
  let src = textures.image(&def.image_name)?;

  let (tx, ty) = (def.total_segments.0.max(1), def.total_segments.1.max(1));
  let cell_w = (src.width() / tx).max(1);
  let cell_h = (src.height() / ty).max(1);
  let cropped = imageops::crop_imm(
    &src,
    def.select_segment.0.min(tx - 1) * cell_w,
    def.select_segment.1.min(ty - 1) * cell_h,
    cell_w,
    cell_h,
  )
  .to_image();

  // Simulate distance: collapse detail at the LOD divisor, then blow back
  // up without interpolation.
  let lod = def.lod.level.max(1) as u32;
  let small = imageops::resize(
    &cropped,
    (resolution.0 / lod).max(1),
    (resolution.1 / lod).max(1),
    FilterType::Triangle,
  );
  let mut out = imageops::resize(&small, resolution.0, resolution.1, FilterType::Nearest);

  let mut shade = 1.0f32;
  if def.lod.bake_shadows && !def.lod.top_face {
    shade *= 0.67;
  }
  if def.lod.darken_like_liquid {
    shade *= 0.6;
  }
  if shade < 1.0 {
    for pixel in out.pixels_mut() {
      for c in &mut pixel.0[..3] {
        *c = (*c as f32 * shade) as u8;
      }
    }
  }
  Some(out)
}

/// Per-voxel segment references: three faces at two LODs.
#[derive(Clone, Copy, Debug, Default)]
struct NodeSegRefs {
  /// top, bottom, side
  refs: [AtlasSegmentReference; 3],
  crude_refs: [AtlasSegmentReference; 3],
}

/// The far map's front-end over the registry: voxel-id keyed lookup of
/// baked face segments.
pub struct FarAtlas {
  pub registry: AtlasRegistry,
  node_segrefs: Vec<NodeSegRefs>,
  mapnode_resolution: i32,
}

impl FarAtlas {
  pub fn new(mapnode_resolution: i32) -> Self {
    Self {
      registry: AtlasRegistry::new("far-map"),
      node_segrefs: Vec::new(),
      mapnode_resolution: mapnode_resolution.max(1),
    }
  }

  fn segment_size(&self) -> (u32, u32) {
    let s = (self.mapnode_resolution * 4) as u32;
    (s, s)
  }

  /// Hint that up to `num_nodes` voxel ids, each contributing six face
  /// segments, will be added.
  pub fn prepare_for_nodes(&mut self, num_nodes: usize) {
    self.registry.prepare_for_segments(num_nodes * 6, self.segment_size());
  }

  pub fn add_texture(
    &mut self,
    name: &str,
    is_top: bool,
    crude: bool,
    is_liquid: bool,
  ) -> AtlasSegmentReference {
    let def = AtlasSegmentDefinition {
      image_name: name.to_string(),
      total_segments: (1, 1),
      select_segment: (0, 0),
      target_size: self.segment_size(),
      lod: SegmentLod {
        level: if crude { 16 } else { 4 },
        // Liquid surfaces read as tops regardless of the face they ended
        // up on, and always carry the water darkening.
        top_face: is_liquid || is_top,
        bake_shadows: true,
        darken_like_liquid: is_liquid,
      },
    };
    self.registry.find_or_add_segment(&def)
  }

  /// Register all six face segments of a voxel id.
  pub fn add_node(&mut self, id: u16, top: &str, bottom: &str, side: &str, is_liquid: bool) {
    let nsr = NodeSegRefs {
      refs: [
        self.add_texture(top, true, false, is_liquid),
        self.add_texture(bottom, false, false, is_liquid),
        self.add_texture(side, false, false, is_liquid),
      ],
      crude_refs: [
        self.add_texture(top, true, true, is_liquid),
        self.add_texture(bottom, false, true, is_liquid),
        self.add_texture(side, false, true, is_liquid),
      ],
    };
    if self.node_segrefs.len() < id as usize + 1 {
      self.node_segrefs.resize(id as usize + 1, NodeSegRefs::default());
    }
    self.node_segrefs[id as usize] = nsr;
  }

  pub fn refresh_textures(&mut self, textures: &dyn TextureSource, driver: &mut dyn VideoDriver) {
    self.registry.refresh_textures(textures, driver);
  }

  /// Cached segment for `(id, face, lod)`; face 0 = top, 1 = bottom,
  /// 2 = side. O(1), no locks.
  pub fn get_node(&self, id: u16, face: u8, crude: bool) -> Option<&AtlasSegmentCache> {
    debug_assert!(face < 3);
    let nsr = self.node_segrefs.get(id as usize)?;
    let r = if crude {
      &nsr.crude_refs[face as usize]
    } else {
      &nsr.refs[face as usize]
    };
    self.registry.get(r)
  }

  /// Immutable copy of every node's resolved segments, for lock-free reads
  /// from the mesh worker.
  pub fn snapshot(&self) -> AtlasSnapshot {
    let nodes = (0..self.node_segrefs.len())
      .map(|id| {
        let id = id as u16;
        [
          self.get_node(id, 0, false).copied(),
          self.get_node(id, 1, false).copied(),
          self.get_node(id, 2, false).copied(),
          self.get_node(id, 0, true).copied(),
          self.get_node(id, 1, true).copied(),
          self.get_node(id, 2, true).copied(),
        ]
      })
      .collect();
    AtlasSnapshot { nodes }
  }
}

/// Frozen view of the atlas a mesh-build task carries across threads.
#[derive(Default)]
pub struct AtlasSnapshot {
  nodes: Vec<[Option<AtlasSegmentCache>; 6]>,
}

impl AtlasSnapshot {
  pub fn node(&self, id: u16, face: u8, crude: bool) -> Option<&AtlasSegmentCache> {
    debug_assert!(face < 3);
    let slot = face as usize + if crude { 3 } else { 0 };
    self.nodes.get(id as usize)?[slot].as_ref()
  }
}

#[cfg(test)]
#[path = "atlas_test.rs"]
mod atlas_test;
