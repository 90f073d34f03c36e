//! far_map - client-side far-terrain renderer core for a voxel sandbox.
//!
//! Given server-sent, low-resolution snapshots of voxel regions far from
//! the viewer, this crate stores them, meshes them on a single background
//! worker at several levels of detail, packs their face textures into
//! shared atlas pages, and schedules per-frame drawing so the far terrain
//! never overlaps what the near renderer already draws.
//!
//! # Architecture
//!
//! ```text
//! server payload ──► decode task ──► FarMap insert ──► mesh-build task
//!      ▲                (worker)        (main)            (worker)
//!      │                                                     │
//! fetch advisor ◄── draw scheduler ◄── FarBlock meshes ◄── sync queue
//! ```
//!
//! The main thread runs a cooperative loop: `update()` drains finished
//! worker tasks and applies them, `render()` walks every loaded FarBlock,
//! culls by distance, picks a mesh level that avoids double-drawing with
//! the near renderer, and lazily posts build tasks for missing detail.
//! The worker never touches the map, the scene graph or the GPU; it works
//! on owned task snapshots and hands results back through a FIFO queue.
//!
//! # Example
//!
//! ```ignore
//! use far_map::{FarMap, FarMapContext};
//!
//! let mut map = FarMap::new(FarMapContext {
//!     settings, node_defs, textures, shaders,
//! });
//! map.create_atlas(&mut driver);
//!
//! // Each frame:
//! map.update();
//! for p in map.suggest_far_blocks_to_fetch(camera_node_pos) {
//!     network.request_far_block(p);
//! }
//! map.render(&mut driver, camera_scene_pos);
//! ```

pub mod area;
pub mod atlas;
pub mod block;
pub mod constants;
pub mod decode;
pub mod fetch;
pub mod host;
pub mod map;
pub mod mesh;
pub mod meshgen;
pub mod metrics;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use area::{BlockAreaBitmap, VoxelArea};
pub use atlas::{AtlasSegmentCache, AtlasSegmentDefinition, AtlasSegmentReference, FarAtlas};
pub use block::{FarBlock, FarBlockParameters, FarSector};
pub use constants::{BS, CONTENT_AIR, CONTENT_IGNORE, FMP, MB};
pub use host::{
  DrawFilters, DrawType, NodeDefs, NodeFeatures, RenderPass, SceneRegistrar, Settings,
  ShaderSource, TextureHandle, TextureSource, VideoDriver,
};
pub use map::{FarMap, FarMapConfig, FarMapContext};
pub use mesh::{FarMesh, FarVertex, MeshHandle, MeshHint};
pub use metrics::{FarMapMetrics, FrameStats};
pub use types::{Aabb, CompressedFarBlock, FarBlockStatus, FarMeshLevel, FarNode};
