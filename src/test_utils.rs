//! Shared fixtures for unit and scenario tests.

use std::collections::HashMap;
use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::constants::CONTENT_AIR;
use crate::host::{
  DrawFilters, DrawType, NodeDefs, NodeFeatures, SceneRegistrar, Settings, ShaderSource,
  RenderPass, TextureHandle, TextureSource, VideoDriver,
};
use crate::mesh::MeshHandle;

/// Well-known test voxel ids.
pub const STONE: u16 = 0;
pub const WATER: u16 = 1;

/// In-memory settings store keyed by string.
#[derive(Clone)]
pub struct TestSettings {
  values: HashMap<String, String>,
}

impl TestSettings {
  pub fn new() -> Self {
    let mut values = HashMap::new();
    values.insert("far_map_range".into(), "800".into());
    values.insert("far_map_atlas_node_resolution".into(), "4".into());
    Self { values }
  }

  pub fn with(mut self, key: &str, value: &str) -> Self {
    self.values.insert(key.into(), value.into());
    self
  }
}

impl Settings for TestSettings {
  fn get_bool(&self, key: &str) -> bool {
    self.values.get(key).map(|v| v == "true").unwrap_or(false)
  }

  fn get_s16(&self, key: &str) -> i16 {
    self.values.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
  }

  fn get_s32(&self, key: &str) -> i32 {
    self.values.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
  }
}

/// Sparse node definition registry; unregistered ids resolve to the
/// default (unknown, solidness 2) record.
pub struct TestNodeDefs {
  features: HashMap<u16, NodeFeatures>,
  unknown: NodeFeatures,
}

impl TestNodeDefs {
  /// Stone, water and air, which is enough for every scenario.
  pub fn new() -> Self {
    let mut features = HashMap::new();
    features.insert(
      STONE,
      NodeFeatures {
        name: "stone".into(),
        solidness: 2,
        visual_solidness: 0,
        drawtype: DrawType::Normal,
        tile_top: "stone.png".into(),
        tile_bottom: "stone.png".into(),
        tile_side: "stone.png".into(),
      },
    );
    features.insert(
      WATER,
      NodeFeatures {
        name: "water".into(),
        solidness: 1,
        visual_solidness: 0,
        drawtype: DrawType::Liquid,
        tile_top: "water.png".into(),
        tile_bottom: "water.png".into(),
        tile_side: "water.png".into(),
      },
    );
    features.insert(
      CONTENT_AIR,
      NodeFeatures {
        name: "air".into(),
        solidness: 0,
        visual_solidness: 0,
        drawtype: DrawType::Airlike,
        tile_top: String::new(),
        tile_bottom: String::new(),
        tile_side: String::new(),
      },
    );
    Self {
      features,
      unknown: NodeFeatures::default(),
    }
  }
}

impl NodeDefs for TestNodeDefs {
  fn get(&self, id: u16) -> &NodeFeatures {
    self.features.get(&id).unwrap_or(&self.unknown)
  }
}

/// Named solid-color source images.
pub struct TestTextures {
  images: HashMap<String, RgbaImage>,
}

impl TestTextures {
  pub fn new() -> Self {
    let mut images = HashMap::new();
    images.insert("stone.png".into(), solid_image(16, [128, 128, 128, 255]));
    images.insert("water.png".into(), solid_image(16, [30, 80, 200, 255]));
    Self { images }
  }

  pub fn without(mut self, name: &str) -> Self {
    self.images.remove(name);
    self
  }
}

impl TextureSource for TestTextures {
  fn image(&self, name: &str) -> Option<RgbaImage> {
    self.images.get(name).cloned()
  }
}

pub fn solid_image(size: u32, rgba: [u8; 4]) -> RgbaImage {
  RgbaImage::from_pixel(size, size, Rgba(rgba))
}

pub struct TestShaders;

impl ShaderSource for TestShaders {
  fn shader(&self, _name: &str) -> u32 {
    1
  }
}

/// Records every upload and draw so tests can assert on what hit the GPU.
#[derive(Default)]
pub struct RecordingDriver {
  next_texture: u64,
  pub uploads: usize,
  pub draws: Vec<DrawRecord>,
}

pub struct DrawRecord {
  pub triangles: usize,
  pub filters: DrawFilters,
}

impl RecordingDriver {
  pub fn new() -> Self {
    Self {
      next_texture: 1,
      ..Default::default()
    }
  }

  pub fn drawn_triangles(&self) -> usize {
    self.draws.iter().map(|d| d.triangles).sum()
  }

  pub fn clear_frame(&mut self) {
    self.draws.clear();
  }
}

impl VideoDriver for RecordingDriver {
  fn upload_texture(&mut self, _image: &RgbaImage) -> TextureHandle {
    let handle = TextureHandle::new(self.next_texture);
    self.next_texture += 1;
    self.uploads += 1;
    handle
  }

  fn draw_mesh(&mut self, mesh: &MeshHandle, filters: &DrawFilters) {
    self.draws.push(DrawRecord {
      triangles: mesh.triangle_count(),
      filters: *filters,
    });
  }
}

/// Captures scene registration calls.
#[derive(Default)]
pub struct RecordingRegistrar {
  pub passes: Vec<RenderPass>,
}

impl SceneRegistrar for RecordingRegistrar {
  fn register_for_rendering(&mut self, pass: RenderPass) {
    self.passes.push(pass);
  }
}

/// Standard context wiring for map-level tests.
pub fn test_context() -> crate::map::FarMapContext {
  crate::map::FarMapContext {
    settings: Arc::new(TestSettings::new()),
    node_defs: Arc::new(TestNodeDefs::new()),
    textures: Arc::new(TestTextures::new()),
    shaders: Arc::new(TestShaders),
  }
}

/// Context with explicit settings.
pub fn test_context_with(settings: TestSettings) -> crate::map::FarMapContext {
  crate::map::FarMapContext {
    settings: Arc::new(settings),
    node_defs: Arc::new(TestNodeDefs::new()),
    textures: Arc::new(TestTextures::new()),
    shaders: Arc::new(TestShaders),
  }
}

/// Deflate an `(id, light)` lattice in wire order (z-outer, y, x-inner).
pub fn deflate_nodes(nodes: &[(u16, u8)]) -> Vec<u8> {
  use flate2::write::ZlibEncoder;
  use flate2::Compression;
  use std::io::Write;

  let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
  for (id, light) in nodes {
    enc.write_all(&id.to_le_bytes()).unwrap();
    enc.write_all(&[*light]).unwrap();
  }
  enc.finish().unwrap()
}
