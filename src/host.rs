//! Interfaces the embedding client provides to the far map.
//!
//! The core never reaches for process-wide state: settings, voxel metadata,
//! texture images, shaders and the video driver all arrive as trait objects
//! in a [`FarMapContext`](crate::map::FarMapContext) at construction time.
//! Only [`NodeDefs`] crosses into the worker thread and therefore requires
//! `Send + Sync`; everything else is main-thread only.

use image::RgbaImage;

use crate::mesh::MeshHandle;

/// String-keyed, case-sensitive configuration reads.
///
/// Polled every `update()`; changes take effect next frame. Keys consulted:
/// `enable_shaders`, `trilinear_filter`, `bilinear_filter`,
/// `anisotropic_filter` (bool); `far_map_range`, `far_map_fine_distance`
/// (s16); `far_map_atlas_node_resolution` (s32).
pub trait Settings {
  fn get_bool(&self, key: &str) -> bool;
  fn get_s16(&self, key: &str) -> i16;
  fn get_s32(&self, key: &str) -> i32;
}

/// How a voxel is drawn; only the coarse class matters out here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DrawType {
  #[default]
  Normal,
  Airlike,
  Liquid,
  FlowingLiquid,
  Nodebox,
  Mesh,
  Other,
}

/// Metadata for one voxel id, as supplied by the game object model.
#[derive(Clone, Debug)]
pub struct NodeFeatures {
  /// Empty name terminates the id walk in `create_atlas`.
  pub name: String,
  pub solidness: u8,
  pub visual_solidness: u8,
  pub drawtype: DrawType,
  /// Face texture names: top, bottom, side. Empty top means the voxel has
  /// no far-map representation at all.
  pub tile_top: String,
  pub tile_bottom: String,
  pub tile_side: String,
}

impl Default for NodeFeatures {
  /// The record returned for unknown ids. Solidness 2 makes unloaded space
  /// seal geometry instead of leaking boundary faces into it.
  fn default() -> Self {
    Self {
      name: String::new(),
      solidness: 2,
      visual_solidness: 0,
      drawtype: DrawType::Normal,
      tile_top: String::new(),
      tile_bottom: String::new(),
      tile_side: String::new(),
    }
  }
}

impl NodeFeatures {
  /// Solidness used for face-pair visibility ordering: explicit solidness
  /// when non-zero, 1 for shaped-but-solid drawtypes, else the visual
  /// solidness.
  pub fn mesh_solidness(&self) -> u8 {
    if self.solidness != 0 {
      return self.solidness;
    }
    match self.drawtype {
      DrawType::Nodebox | DrawType::Mesh | DrawType::Liquid | DrawType::FlowingLiquid => 1,
      _ => self.visual_solidness,
    }
  }

  pub fn is_liquid(&self) -> bool {
    matches!(self.drawtype, DrawType::Liquid | DrawType::FlowingLiquid)
  }
}

/// Voxel-id metadata lookup. Shared with the mesh worker, so implementors
/// must be immutable once handed over.
pub trait NodeDefs {
  /// Must return a default (unknown) record for out-of-range ids rather
  /// than panic.
  fn get(&self, id: u16) -> &NodeFeatures;
}

/// Source images for atlas baking, by name. `None` degrades to a null
/// segment: the mesh builder emits no faces for it.
pub trait TextureSource {
  fn image(&self, name: &str) -> Option<RgbaImage>;
}

/// Shader program lookup; resolved once when shaders are enabled.
pub trait ShaderSource {
  fn shader(&self, name: &str) -> u32;
}

/// Opaque GPU texture id issued by the video driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(u64);

impl TextureHandle {
  pub fn new(raw: u64) -> Self {
    Self(raw)
  }

  pub fn raw(&self) -> u64 {
    self.0
  }
}

/// Texture filtering flags forwarded with every draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawFilters {
  pub trilinear: bool,
  pub bilinear: bool,
  pub anisotropic: bool,
}

/// The slice of the video driver the far map needs.
///
/// Main-thread only. `draw_mesh` receives a shared handle; the driver may
/// keep a clone for the duration of the frame.
pub trait VideoDriver {
  fn upload_texture(&mut self, image: &RgbaImage) -> TextureHandle;
  fn draw_mesh(&mut self, mesh: &MeshHandle, filters: &DrawFilters);
}

/// Scene render passes the host supports registering into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderPass {
  Solid,
  Transparent,
}

/// Callback surface for scene-graph registration.
pub trait SceneRegistrar {
  fn register_for_rendering(&mut self, pass: RenderPass);
}
