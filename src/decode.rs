//! Decode task: turns a server payload into FarBlock content.
//!
//! The expensive part (zlib inflate plus the lattice copy) runs on the
//! worker; the main-thread sync dispatches into the map by payload status.
//! A malformed payload discards the decoded result and leaves the block a
//! stub, so the fetch advisor re-requests it on a later pass.

use std::io::Read;

use flate2::read::ZlibDecoder;
use tracing::{debug, warn};

use crate::block::FarBlockParameters;
use crate::constants::FULL_LIGHT;
use crate::map::FarMap;
use crate::types::{CompressedFarBlock, FarBlockStatus, FarNode};
use crate::worker::FarMapTask;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
  #[error("zlib inflate failed: {0}")]
  Inflate(#[from] std::io::Error),
  #[error("inflated payload too short: expected {expected} bytes, got {got}")]
  WrongSize { expected: usize, got: usize },
}

/// Decoded voxel data ready to be swapped into a FarBlock.
struct DecodedContent {
  params: FarBlockParameters,
  content: Vec<FarNode>,
}

/// Worker task that inflates and unpacks one payload.
pub struct FarBlockInsertTask {
  source: CompressedFarBlock,
  result: Option<DecodedContent>,
  failed: bool,
}

impl FarBlockInsertTask {
  pub fn new(source: CompressedFarBlock) -> Self {
    Self {
      source,
      result: None,
      failed: false,
    }
  }
}

/// Inflate the blob and lay the samples out in the padded content buffer.
///
/// The wire lattice is iterated z-outer, y-middle, x-inner over
/// `effective_size`; padding cells stay IGNORE with fully-lit light.
fn decode_content(source: &CompressedFarBlock) -> Result<DecodedContent, DecodeError> {
  let params = FarBlockParameters::new(source.position, source.divs_per_mb);

  let mut raw = Vec::new();
  ZlibDecoder::new(source.blob.as_slice()).read_to_end(&mut raw)?;

  let cells = params.effective_area.volume();
  let expected = cells * 3;
  if raw.len() < expected {
    return Err(DecodeError::WrongSize {
      expected,
      got: raw.len(),
    });
  }
  if raw.len() > expected {
    debug!(
      position = ?source.position,
      extra = raw.len() - expected,
      "far block payload carries trailing bytes"
    );
  }

  let mut content = vec![
    FarNode {
      id: crate::constants::CONTENT_IGNORE,
      light: FULL_LIGHT,
    };
    params.content_area.volume()
  ];

  let mut cursor = 0usize;
  for z in 0..params.effective_size.z {
    for y in 0..params.effective_size.y {
      for x in 0..params.effective_size.x {
        let id = u16::from_le_bytes([raw[cursor], raw[cursor + 1]]);
        let light = raw[cursor + 2];
        cursor += 3;
        let dp1 = params.dp00 + glam::IVec3::new(x, y, z);
        content[params.content_area.index(dp1)] = FarNode { id, light };
      }
    }
  }

  Ok(DecodedContent { params, content })
}

impl FarMapTask for FarBlockInsertTask {
  fn in_thread(&mut self) {
    if !self.source.status.is_loaded() {
      return;
    }
    match decode_content(&self.source) {
      Ok(decoded) => self.result = Some(decoded),
      Err(err) => {
        warn!(
          position = ?self.source.position,
          error = %err,
          "discarding malformed far block payload"
        );
        self.failed = true;
      }
    }
  }

  fn sync(self: Box<Self>, map: &mut FarMap) {
    let this = *self;
    match this.source.status {
      FarBlockStatus::FullyLoaded | FarBlockStatus::PartlyLoaded => {
        if this.failed {
          map.metrics.decode_failures += 1;
          return;
        }
        let Some(decoded) = this.result else { return };
        let partly_loaded = this.source.status == FarBlockStatus::PartlyLoaded;
        map.insert_far_block(
          decoded.params.p,
          decoded.params.divs_per_mb,
          decoded.content,
          partly_loaded,
        );
      }
      FarBlockStatus::Empty => map.insert_empty_block(this.source.position),
      FarBlockStatus::Culled => map.insert_culled_block(this.source.position),
      FarBlockStatus::LoadInProgress => {
        map.insert_load_in_progress_block(this.source.position)
      }
    }
  }
}

#[cfg(test)]
#[path = "decode_test.rs"]
mod decode_test;
