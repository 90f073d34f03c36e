use glam::Vec2;

use super::*;
use crate::mesh::{FarMesh, FarVertex, MeshBuffer, MeshHint};
use crate::host::TextureHandle;

fn handle_with_vertex_at(p: Vec3) -> MeshHandle {
  MeshHandle::new(FarMesh {
    buffers: vec![MeshBuffer {
      texture: TextureHandle::new(1),
      vertices: vec![FarVertex {
        position: p,
        normal: Vec3::Y,
        color: [255, 255, 0, 255],
        uv: Vec2::ZERO,
      }],
      indices: vec![],
    }],
    hint: MeshHint::Static,
  })
}

fn vertex_x(h: &MeshHandle) -> f32 {
  h.with(|m| m.buffers[0].vertices[0].position.x)
}

#[test]
fn parameters_derive_padded_areas() {
  let p = FarBlockParameters::new(IVec3::new(2, -1, 3), IVec3::new(4, 4, 4));

  assert_eq!(p.dp00, IVec3::new(2 * 8 * 4, -1 * 8 * 4, 3 * 8 * 4));
  assert_eq!(p.effective_size, IVec3::splat(32));
  assert_eq!(p.content_size, IVec3::splat(34));
  assert_eq!(p.content_area.volume(), 34 * 34 * 34);

  // Effective area sits inside the content area with a one-voxel margin on
  // every face.
  assert_eq!(p.effective_area.min, p.content_area.min + IVec3::ONE);
  assert_eq!(p.effective_area.max, p.content_area.max - IVec3::ONE);
}

#[test]
fn nonuniform_divs_per_axis() {
  let p = FarBlockParameters::new(IVec3::ZERO, IVec3::new(1, 2, 4));
  assert_eq!(p.effective_size, IVec3::new(8, 16, 32));
  assert_eq!(p.content_size, IVec3::new(10, 18, 34));
}

#[test]
fn mesh_level_reflects_populated_slots() {
  let mut b = FarBlock::new(IVec3::ZERO, IVec3::ONE);
  assert_eq!(b.current_mesh_level(), FarMeshLevel::None);

  b.crude_mesh = Some(handle_with_vertex_at(Vec3::ZERO));
  assert_eq!(b.current_mesh_level(), FarMeshLevel::Crude);

  b.fine_mesh = Some(handle_with_vertex_at(Vec3::ZERO));
  assert_eq!(b.current_mesh_level(), FarMeshLevel::Fine);

  b.mapblock_meshes = vec![None; (FMP * FMP * FMP) as usize];
  b.mapblock2_meshes = vec![None; (FMP * FMP * FMP / 8) as usize];
  assert_eq!(b.current_mesh_level(), FarMeshLevel::FineAndSmall);

  b.unload_mapblock_meshes();
  assert_eq!(b.current_mesh_level(), FarMeshLevel::Fine);
  b.unload_fine_mesh();
  assert_eq!(b.current_mesh_level(), FarMeshLevel::Crude);
}

#[test]
fn new_block_is_stub() {
  let b = FarBlock::new(IVec3::ZERO, IVec3::ZERO);
  assert!(b.content.is_empty());
  assert!(b.mesh_is_empty);
  assert!(!b.generating_mesh);
  assert!(!b.mesh_is_outdated);
}

#[test]
fn camera_offset_translates_meshes() {
  let mut b = FarBlock::new(IVec3::ZERO, IVec3::ONE);
  b.crude_mesh = Some(handle_with_vertex_at(Vec3::new(50.0, 0.0, 0.0)));
  b.fine_mesh = Some(handle_with_vertex_at(Vec3::new(50.0, 0.0, 0.0)));

  b.update_camera_offset(IVec3::new(100, 0, 0));
  assert_eq!(b.current_camera_offset, IVec3::new(100, 0, 0));
  // Moved by (0 - 100) * BS on x.
  let moved = 50.0 - 100.0 * BS;
  assert_eq!(vertex_x(b.crude_mesh.as_ref().unwrap()), moved);
  assert_eq!(vertex_x(b.fine_mesh.as_ref().unwrap()), moved);

  // Same offset again is a no-op.
  b.update_camera_offset(IVec3::new(100, 0, 0));
  assert_eq!(vertex_x(b.crude_mesh.as_ref().unwrap()), moved);
}

#[test]
fn crude_mesh_translates_without_fine() {
  let mut b = FarBlock::new(IVec3::ZERO, IVec3::ONE);
  b.crude_mesh = Some(handle_with_vertex_at(Vec3::ZERO));
  b.update_camera_offset(IVec3::new(0, 10, 0));
  let y = b
    .crude_mesh
    .as_ref()
    .unwrap()
    .with(|m| m.buffers[0].vertices[0].position.y);
  assert_eq!(y, -10.0 * BS);
}

#[test]
fn reset_offset_reapplies_from_origin() {
  let mut b = FarBlock::new(IVec3::ZERO, IVec3::ONE);
  b.current_camera_offset = IVec3::new(7, 7, 7);
  b.crude_mesh = Some(handle_with_vertex_at(Vec3::ZERO));

  b.reset_camera_offset(IVec3::new(3, 0, 0));
  assert_eq!(b.current_camera_offset, IVec3::new(3, 0, 0));
  assert_eq!(vertex_x(b.crude_mesh.as_ref().unwrap()), -3.0 * BS);
}

#[test]
fn sector_get_or_create_fixes_divs() {
  let mut s = FarSector::new(IVec2::new(4, -2));
  let b = s.get_or_create_block(7, IVec3::splat(2));
  assert_eq!(b.params.p, IVec3::new(4, 7, -2));
  assert_eq!(b.params.divs_per_mb, IVec3::splat(2));

  // A second caller with different divs gets the existing block.
  let b2 = s.get_or_create_block(7, IVec3::splat(8));
  assert_eq!(b2.params.divs_per_mb, IVec3::splat(2));
  assert_eq!(s.blocks.len(), 1);

  assert!(s.block(7).is_some());
  assert!(s.block(8).is_none());
}
