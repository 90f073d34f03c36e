//! Core far-map data types: voxel samples, mesh detail levels and the
//! server payload envelope.

use glam::{IVec3, Vec3};

use crate::constants::{CONTENT_AIR, CONTENT_IGNORE};

/// A coarse voxel sample inside a FarBlock.
///
/// `light` packs day-light in the low nibble and night-light in the high
/// nibble. FarNodes are immutable once stored in a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FarNode {
  pub id: u16,
  pub light: u8,
}

impl FarNode {
  /// Unknown / not-loaded space with no light information.
  pub const IGNORE: FarNode = FarNode {
    id: CONTENT_IGNORE,
    light: 0,
  };

  pub fn new(id: u16, light: u8) -> Self {
    Self { id, light }
  }

  /// Air carrying the light of a neighboring sample.
  pub fn air(light: u8) -> Self {
    Self {
      id: CONTENT_AIR,
      light,
    }
  }

  #[inline]
  pub fn light_day(&self) -> u8 {
    self.light & 0x0f
  }

  #[inline]
  pub fn light_night(&self) -> u8 {
    (self.light & 0xf0) >> 4
  }
}

/// Mesh detail held by a FarBlock, strictly ordered.
///
/// `current_mesh_level()` reports the highest level for which every
/// required mesh slot is populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FarMeshLevel {
  None,
  Crude,
  Fine,
  FineAndSmall,
}

/// Load status the server attached to a FarBlock payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FarBlockStatus {
  FullyLoaded,
  PartlyLoaded,
  Empty,
  Culled,
  LoadInProgress,
}

impl FarBlockStatus {
  pub fn from_u8(v: u8) -> Option<Self> {
    match v {
      0 => Some(Self::FullyLoaded),
      1 => Some(Self::PartlyLoaded),
      2 => Some(Self::Empty),
      3 => Some(Self::Culled),
      4 => Some(Self::LoadInProgress),
      _ => None,
    }
  }

  /// True for the two statuses that carry voxel data.
  pub fn is_loaded(&self) -> bool {
    matches!(self, Self::FullyLoaded | Self::PartlyLoaded)
  }
}

/// Error decoding the fixed payload header.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
  #[error("payload truncated: need {needed} bytes, got {got}")]
  Truncated { needed: usize, got: usize },
  #[error("unknown far block status {0}")]
  UnknownStatus(u8),
}

/// A FarBlock payload as delivered by the network layer.
///
/// For the two loaded statuses, `blob` is a zlib deflate stream whose
/// inflated content is `effective_size.x * y * z` tuples of
/// `(id: u16 LE, light: u8)`, iterated z-outer, y-middle, x-inner.
#[derive(Clone, Debug)]
pub struct CompressedFarBlock {
  /// Position in far-block units.
  pub position: IVec3,
  pub status: FarBlockStatus,
  /// Reserved.
  pub flags: u8,
  /// Per-axis FarNode subdivisions of one map-block.
  pub divs_per_mb: IVec3,
  pub blob: Vec<u8>,
}

impl CompressedFarBlock {
  /// Header layout: position i16x3, status u8, flags u8, divs i16x3,
  /// little-endian throughout; the rest of the frame is the blob.
  pub const HEADER_LEN: usize = 3 * 2 + 1 + 1 + 3 * 2;

  /// Decode a raw frame into the payload struct. Framing (length prefixes,
  /// packet ids) is the transport's business and must already be stripped.
  pub fn parse(data: &[u8]) -> Result<Self, WireError> {
    if data.len() < Self::HEADER_LEN {
      return Err(WireError::Truncated {
        needed: Self::HEADER_LEN,
        got: data.len(),
      });
    }
    let i16_at = |i: usize| i16::from_le_bytes([data[i], data[i + 1]]) as i32;
    let status_byte = data[6];
    let status =
      FarBlockStatus::from_u8(status_byte).ok_or(WireError::UnknownStatus(status_byte))?;
    Ok(Self {
      position: IVec3::new(i16_at(0), i16_at(2), i16_at(4)),
      status,
      flags: data[7],
      divs_per_mb: IVec3::new(i16_at(8), i16_at(10), i16_at(12)),
      blob: data[Self::HEADER_LEN..].to_vec(),
    })
  }
}

/// Axis-aligned world-space box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
  pub min: Vec3,
  pub max: Vec3,
}

impl Aabb {
  pub fn new(min: Vec3, max: Vec3) -> Self {
    Self { min, max }
  }
}
