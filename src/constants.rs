//! Lattice constants shared by every far-map subsystem.
//!
//! Three nested integer lattices are used throughout and must never be
//! confused:
//!
//! ```text
//! node       smallest voxel, edge length BS in world space
//! map-block  cube of MB^3 nodes, the unit the near renderer works in
//! far-block  cube of FMP^3 map-blocks, the unit this crate works in
//! ```
//!
//! A FarBlock stores `divs_per_mb` FarNodes per map-block axis, so one
//! FarNode covers `MB / divs_per_mb` nodes. `divs_per_mb = (1,1,1)` is the
//! coarsest representation (one sample per map-block).

use glam::IVec3;

/// Map-block edge length in nodes.
pub const MB: i32 = 16;

/// Far-block edge length in map-blocks.
pub const FMP: i32 = 8;

/// World-space edge length of a single node.
pub const BS: f32 = 10.0;

/// Content id for air.
pub const CONTENT_AIR: u16 = 126;

/// Content id for unknown / not-loaded space.
///
/// The node definition lookup for this id reports solidness 2 so that
/// unloaded space seals geometry instead of leaking boundary faces.
pub const CONTENT_IGNORE: u16 = 127;

/// Both light nibbles at maximum (day 15, night 15).
pub const FULL_LIGHT: u8 = 0xff;

/// Day/night blend numerator used when shaders are disabled; 1000 selects
/// pure daylight.
pub const DAYNIGHT_RATIO: u32 = 1000;

/// 4-bit light value to 8-bit brightness.
///
/// The table approximates the perceptual light curve the server bakes
/// against; values above 14 saturate.
const LIGHT_DECODE_TABLE: [u8; 15] = [
  8, 11, 14, 18, 22, 29, 37, 47, 60, 76, 97, 123, 157, 200, 255,
];

/// Expand a 4-bit light nibble to an 8-bit brightness value.
#[inline]
pub fn decode_light(nibble: u8) -> u8 {
  let i = (nibble & 0x0f) as usize;
  if i >= LIGHT_DECODE_TABLE.len() {
    255
  } else {
    LIGHT_DECODE_TABLE[i]
  }
}

/// Coordinate of the container of size `size` that `p` falls into
/// (floor division per axis).
#[inline]
pub fn container_pos(p: IVec3, size: i32) -> IVec3 {
  IVec3::new(
    p.x.div_euclid(size),
    p.y.div_euclid(size),
    p.z.div_euclid(size),
  )
}
