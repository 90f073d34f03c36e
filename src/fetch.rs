//! Fetch advisor: which FarBlocks should the client request next.
//!
//! Candidates are visited in face-distance shells around the camera's
//! containing far-block, starting at the distance everything is already
//! known to be loaded up to. Suggestions are paced by the worker's queue
//! length so background decoding never falls behind the network.

use std::collections::HashMap;

use glam::IVec3;
use tracing::{debug, trace};

use crate::constants::{container_pos, BS, FMP, MB};
use crate::map::{block_of, FarMap};

/// Upper bound on in-flight worker tasks; above this the advisor suggests
/// nothing.
pub const MAX_QUEUE_LENGTH: usize = 50;

/// Every fifth pass over a block still loading on the server triggers a
/// re-request.
const REFRESH_RETRY_INTERVAL: i32 = 5;

/// How many advisor calls between full rescans of the near shells;
/// catches blocks missed after teleports.
const EXIST_RESET_INTERVAL: i32 = 10;

/// Shell offsets at a given Chebyshev face-distance, cached per distance.
pub(crate) struct FacePositionCache {
  cache: HashMap<i32, Vec<IVec3>>,
}

impl FacePositionCache {
  pub fn new() -> Self {
    Self {
      cache: HashMap::new(),
    }
  }

  pub fn get(&mut self, d: i32) -> &[IVec3] {
    self.cache.entry(d).or_insert_with(|| face_positions(d))
  }
}

/// All offsets whose Chebyshev norm equals `d` (the shell of the cube of
/// radius `d`).
fn face_positions(d: i32) -> Vec<IVec3> {
  if d == 0 {
    return vec![IVec3::ZERO];
  }
  let mut out = Vec::new();
  for x in -d..=d {
    for y in -d..=d {
      for z in -d..=d {
        if x.abs().max(y.abs()).max(z.abs()) == d {
          out.push(IVec3::new(x, y, z));
        }
      }
    }
  }
  out
}

fn fetch_distance_farblocks(far_map_range: i16) -> i32 {
  (far_map_range as f32 / MB as f32 / FMP as f32).ceil() as i32
}

impl FarMap {
  /// Suggest up to `MAX_QUEUE_LENGTH - queue_length` far-block coordinates
  /// to request from the server, nearest shells first. `camera_p` is in
  /// node units.
  pub fn suggest_far_blocks_to_fetch(&mut self, camera_p: IVec3) -> Vec<IVec3> {
    let queue_length = self.worker.queue_length().max(0) as usize;
    if queue_length >= MAX_QUEUE_LENGTH {
      return Vec::new();
    }
    let wanted = MAX_QUEUE_LENGTH - queue_length;

    let center_mb = container_pos(camera_p, MB);
    let center_fb = container_pos(center_mb, FMP);
    let fetch_distance = fetch_distance_farblocks(self.config.far_map_range);

    // Skip the shells that are known fully loaded, except on the periodic
    // rescan.
    let mut start_d = self.farblocks_exist_up_to_d;
    self.exist_up_to_d_reset_counter += 1;
    if self.exist_up_to_d_reset_counter >= EXIST_RESET_INTERVAL {
      self.exist_up_to_d_reset_counter = 0;
      start_d = 0;
    }
    self.farblocks_exist_up_to_d = -1;
    if start_d < 0 {
      start_d = 0;
    }

    let mut suggested = Vec::new();
    'shells: for d in start_d..=fetch_distance {
      for offset in self.face_positions.get(d) {
        let p = center_fb + *offset;
        match block_of(&mut self.sectors, p) {
          Some(b) => {
            if !b.load_in_progress_on_server {
              continue; // Exists and was received fully loaded.
            }
            b.refresh_from_server_counter += 1;
            if b.refresh_from_server_counter < REFRESH_RETRY_INTERVAL {
              continue;
            }
            debug!(position = ?p, "block still loading on server, re-requesting");
            b.refresh_from_server_counter = 0;
          }
          None => {
            trace!(position = ?p, "block unfetched, requesting");
          }
        }
        if self.farblocks_exist_up_to_d == -1 {
          self.farblocks_exist_up_to_d = d - 1;
        }
        suggested.push(p);
        if suggested.len() >= wanted {
          break 'shells;
        }
      }
    }

    debug!(count = suggested.len(), "suggested far blocks to fetch");
    suggested
  }

  /// The configured far range in far-block units; zero while hidden.
  pub fn suggest_autosend_farblocks_radius(&self) -> i16 {
    if !self.is_visible() {
      return 0;
    }
    fetch_distance_farblocks(self.config.far_map_range) as i16
  }

  /// A fog distance just inside the far range, masking the visible edge.
  /// Short ranges mean a struggling machine, so fog hugs tighter there.
  pub fn suggest_fog_distance(&self) -> f32 {
    let range = self.config.far_map_range as i32;
    if range < 150 {
      (range - MB * FMP / 4) as f32 * BS
    } else {
      (range - MB * FMP / 2) as f32 * BS
    }
  }
}

#[cfg(test)]
#[path = "fetch_test.rs"]
mod fetch_test;
