//! CPU-side mesh model.
//!
//! The worker builds [`FarMesh`] values; the main thread wraps them in
//! [`MeshHandle`]s when publishing into a FarBlock. A handle is the unit of
//! shared ownership: the block holds one per populated slot, the draw loop
//! and driver take transient clones, and the GPU copy is released when the
//! last clone drops.

use std::sync::{Arc, Mutex};

use glam::{Vec2, Vec3};
use smallvec::SmallVec;

use crate::host::TextureHandle;

/// One far-terrain vertex. The diffuse channel carries the decoded
/// day/night light pair (red = day, green = night, blue = light-source
/// bit, alpha fixed 255); shaders reconstruct the day/night blend at
/// render time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FarVertex {
  pub position: Vec3,
  pub normal: Vec3,
  pub color: [u8; 4],
  pub uv: Vec2,
}

/// Whether the driver should keep a long-lived GPU buffer for the mesh.
///
/// Whole-block meshes are static; the per-mapblock pieces churn too fast
/// and would exhaust VBO limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshHint {
  Static,
  Transient,
}

/// Geometry sharing a single texture.
#[derive(Clone, Debug)]
pub struct MeshBuffer {
  pub texture: TextureHandle,
  pub vertices: Vec<FarVertex>,
  pub indices: Vec<u32>,
}

/// A renderable mesh: one buffer per atlas texture touched.
#[derive(Clone, Debug)]
pub struct FarMesh {
  pub buffers: Vec<MeshBuffer>,
  pub hint: MeshHint,
}

impl FarMesh {
  pub fn is_empty(&self) -> bool {
    self.buffers.iter().all(|b| b.vertices.is_empty())
  }

  pub fn triangle_count(&self) -> usize {
    self.buffers.iter().map(|b| b.indices.len() / 3).sum()
  }

  /// Move every vertex by `delta` (camera-rebase translation).
  pub fn translate(&mut self, delta: Vec3) {
    for buf in &mut self.buffers {
      for v in &mut buf.vertices {
        v.position += delta;
      }
    }
  }
}

/// Shared-ownership handle to a mesh. Mutation (translation) happens only
/// on the main thread; the lock is uncontended in practice.
#[derive(Clone, Debug)]
pub struct MeshHandle(Arc<Mutex<FarMesh>>);

impl MeshHandle {
  pub fn new(mesh: FarMesh) -> Self {
    Self(Arc::new(Mutex::new(mesh)))
  }

  pub fn translate(&self, delta: Vec3) {
    self.0.lock().expect("mesh lock poisoned").translate(delta);
  }

  pub fn triangle_count(&self) -> usize {
    self.0.lock().expect("mesh lock poisoned").triangle_count()
  }

  /// Run `f` against the mesh data (used by drivers to read buffers).
  pub fn with<R>(&self, f: impl FnOnce(&FarMesh) -> R) -> R {
    f(&self.0.lock().expect("mesh lock poisoned"))
  }
}

/// Accumulates emitted quads grouped by texture. A mesh touches at most a
/// handful of atlas pages, so the buffer list stays inline.
#[derive(Default)]
pub struct MeshCollector {
  buffers: SmallVec<[MeshBuffer; 4]>,
}

impl MeshCollector {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append one quad (two triangles, winding 0-1-2 2-3-0).
  pub fn append_quad(&mut self, texture: TextureHandle, vertices: &[FarVertex; 4]) {
    let index = match self.buffers.iter().position(|b| b.texture == texture) {
      Some(i) => i,
      None => {
        self.buffers.push(MeshBuffer {
          texture,
          vertices: Vec::new(),
          indices: Vec::new(),
        });
        self.buffers.len() - 1
      }
    };
    let buf = &mut self.buffers[index];
    let base = buf.vertices.len() as u32;
    buf.vertices.extend_from_slice(vertices);
    buf
      .indices
      .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
  }

  pub fn is_empty(&self) -> bool {
    self.buffers.is_empty()
  }

  pub fn quad_count(&self) -> usize {
    self.buffers.iter().map(|b| b.indices.len() / 6).sum()
  }

  /// Build the final mesh, or `None` if nothing was collected.
  pub fn into_mesh(self, hint: MeshHint) -> Option<FarMesh> {
    if self.is_empty() {
      return None;
    }
    Some(FarMesh {
      buffers: self.buffers.into_vec(),
      hint,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn quad(at: f32) -> [FarVertex; 4] {
    let v = |x: f32, z: f32| FarVertex {
      position: Vec3::new(x, at, z),
      normal: Vec3::Y,
      color: [255, 255, 0, 255],
      uv: Vec2::ZERO,
    };
    [v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)]
  }

  #[test]
  fn collector_groups_by_texture() {
    let mut c = MeshCollector::new();
    let t0 = TextureHandle::new(1);
    let t1 = TextureHandle::new(2);
    c.append_quad(t0, &quad(0.0));
    c.append_quad(t1, &quad(1.0));
    c.append_quad(t0, &quad(2.0));

    let mesh = c.into_mesh(MeshHint::Static).unwrap();
    assert_eq!(mesh.buffers.len(), 2);
    assert_eq!(mesh.triangle_count(), 6);

    let b0 = mesh.buffers.iter().find(|b| b.texture == t0).unwrap();
    assert_eq!(b0.vertices.len(), 8);
    assert_eq!(&b0.indices[..6], &[0, 1, 2, 2, 3, 0]);
    assert_eq!(&b0.indices[6..], &[4, 5, 6, 6, 7, 4]);
  }

  #[test]
  fn empty_collector_yields_no_mesh() {
    assert!(MeshCollector::new().into_mesh(MeshHint::Static).is_none());
  }

  #[test]
  fn translate_moves_all_vertices() {
    let mut c = MeshCollector::new();
    c.append_quad(TextureHandle::new(1), &quad(0.0));
    let handle = MeshHandle::new(c.into_mesh(MeshHint::Static).unwrap());

    handle.translate(Vec3::new(-100.0, 0.0, 0.0));
    handle.with(|m| {
      for v in &m.buffers[0].vertices {
        assert!((v.position.x - (-100.0)).abs() <= 1.0);
      }
    });
  }
}
