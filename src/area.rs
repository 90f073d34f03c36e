//! Inclusive integer boxes and the map-block occupancy bitmap.
//!
//! `VoxelArea` is the lattice workhorse of the crate: FarBlock content
//! buffers, mesh generation areas and the near-renderer bitmap all address
//! cells through it. Linear indexing is x-fastest, then y, then z, which
//! matches the order payloads are decoded in.

use glam::IVec3;

/// An inclusive axis-aligned box on an integer lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoxelArea {
  pub min: IVec3,
  pub max: IVec3,
}

impl Default for VoxelArea {
  /// The empty area: contains nothing, volume zero.
  fn default() -> Self {
    Self {
      min: IVec3::ZERO,
      max: IVec3::splat(-1),
    }
  }
}

impl VoxelArea {
  pub fn new(min: IVec3, max: IVec3) -> Self {
    Self { min, max }
  }

  /// Area starting at `min` spanning `size` cells per axis.
  pub fn with_size(min: IVec3, size: IVec3) -> Self {
    Self {
      min,
      max: min + size - IVec3::ONE,
    }
  }

  /// Cells per axis; zero on any axis makes the area empty.
  pub fn extent(&self) -> IVec3 {
    (self.max - self.min + IVec3::ONE).max(IVec3::ZERO)
  }

  pub fn volume(&self) -> usize {
    let e = self.extent();
    e.x as usize * e.y as usize * e.z as usize
  }

  pub fn is_empty(&self) -> bool {
    self.volume() == 0
  }

  pub fn contains(&self, p: IVec3) -> bool {
    p.cmpge(self.min).all() && p.cmple(self.max).all()
  }

  pub fn intersects(&self, other: &VoxelArea) -> bool {
    self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
  }

  /// Linear index of `p`, which must be inside the area.
  #[inline]
  pub fn index(&self, p: IVec3) -> usize {
    debug_assert!(self.contains(p), "{:?} outside {:?}", p, self);
    let e = self.extent();
    let d = p - self.min;
    (d.z as usize * e.y as usize + d.y as usize) * e.x as usize + d.x as usize
  }

  /// Index strides along (+x, +y, +z) for neighbor stepping without
  /// recomputing the full index.
  #[inline]
  pub fn strides(&self) -> (usize, usize, usize) {
    let e = self.extent();
    (1, e.x as usize, e.x as usize * e.y as usize)
  }
}

/// Sparse boolean map over map-block coordinates.
///
/// The near renderer reports the set of map-blocks it drew this frame as
/// one of these; coordinates outside the covered area read as `false`.
#[derive(Clone, Debug, Default)]
pub struct BlockAreaBitmap {
  pub area: VoxelArea,
  bits: Vec<bool>,
}

impl BlockAreaBitmap {
  /// All-false bitmap covering `area`.
  pub fn new(area: VoxelArea) -> Self {
    Self {
      bits: vec![false; area.volume()],
      area,
    }
  }

  pub fn get(&self, p: IVec3) -> bool {
    if !self.area.contains(p) {
      return false;
    }
    self.bits[self.area.index(p)]
  }

  pub fn set(&mut self, p: IVec3, value: bool) {
    if self.area.contains(p) {
      let i = self.area.index(p);
      self.bits[i] = value;
    }
  }

  /// True if any set bit could fall inside `area`.
  pub fn touches(&self, area: &VoxelArea) -> bool {
    !self.area.is_empty() && self.area.intersects(area)
  }
}

#[cfg(test)]
#[path = "area_test.rs"]
mod area_test;
