use glam::IVec3;

use super::*;
use crate::constants::{CONTENT_AIR, CONTENT_IGNORE};
use crate::test_utils::deflate_nodes;

fn loaded_payload(position: IVec3, divs: IVec3, nodes: &[(u16, u8)]) -> CompressedFarBlock {
  CompressedFarBlock {
    position,
    status: FarBlockStatus::FullyLoaded,
    flags: 0,
    divs_per_mb: divs,
    blob: deflate_nodes(nodes),
  }
}

#[test]
fn decode_fills_effective_cells_in_wire_order() {
  let divs = IVec3::ONE;
  let params = FarBlockParameters::new(IVec3::ZERO, divs);
  let cells = params.effective_area.volume();

  // Tag every cell with its wire index so ordering mistakes show up.
  let nodes: Vec<(u16, u8)> = (0..cells).map(|i| (i as u16, (i % 256) as u8)).collect();
  let payload = loaded_payload(IVec3::ZERO, divs, &nodes);

  let decoded = decode_content(&payload).unwrap();
  assert_eq!(decoded.content.len(), params.content_area.volume());

  // Wire order is z-outer, y-middle, x-inner over the effective lattice.
  let mut wire_index = 0u16;
  for z in 0..params.effective_size.z {
    for y in 0..params.effective_size.y {
      for x in 0..params.effective_size.x {
        let p = params.dp00 + IVec3::new(x, y, z);
        let n = decoded.content[params.content_area.index(p)];
        assert_eq!(n.id, wire_index);
        wire_index += 1;
      }
    }
  }
}

#[test]
fn decode_leaves_padding_ignore_and_fully_lit() {
  let divs = IVec3::ONE;
  let params = FarBlockParameters::new(IVec3::new(1, 0, -1), divs);
  let cells = params.effective_area.volume();
  let nodes = vec![(CONTENT_AIR, 0u8); cells];
  let payload = loaded_payload(IVec3::new(1, 0, -1), divs, &nodes);

  let decoded = decode_content(&payload).unwrap();

  let edge = params.content_area.min;
  let n = decoded.content[params.content_area.index(edge)];
  assert_eq!(n.id, CONTENT_IGNORE);
  assert_eq!(n.light, FULL_LIGHT);

  let inside = params.effective_area.min;
  assert_eq!(decoded.content[params.content_area.index(inside)].id, CONTENT_AIR);
}

#[test]
fn truncated_blob_is_rejected() {
  let divs = IVec3::ONE;
  let params = FarBlockParameters::new(IVec3::ZERO, divs);
  let cells = params.effective_area.volume();
  let nodes = vec![(0u16, 0u8); cells - 1];
  let payload = loaded_payload(IVec3::ZERO, divs, &nodes);

  assert!(matches!(
    decode_content(&payload),
    Err(DecodeError::WrongSize { .. })
  ));
}

#[test]
fn garbage_blob_is_rejected() {
  let payload = CompressedFarBlock {
    position: IVec3::ZERO,
    status: FarBlockStatus::FullyLoaded,
    flags: 0,
    divs_per_mb: IVec3::ONE,
    blob: vec![0xde, 0xad, 0xbe, 0xef],
  };
  assert!(matches!(
    decode_content(&payload),
    Err(DecodeError::Inflate(_))
  ));
}

#[test]
fn malformed_payload_marks_task_failed() {
  let mut task = FarBlockInsertTask::new(CompressedFarBlock {
    position: IVec3::ZERO,
    status: FarBlockStatus::FullyLoaded,
    flags: 0,
    divs_per_mb: IVec3::ONE,
    blob: vec![1, 2, 3],
  });
  task.in_thread();
  assert!(task.failed);
  assert!(task.result.is_none());
}

#[test]
fn stub_statuses_skip_decoding() {
  let mut task = FarBlockInsertTask::new(CompressedFarBlock {
    position: IVec3::ZERO,
    status: FarBlockStatus::Culled,
    flags: 0,
    divs_per_mb: IVec3::ZERO,
    blob: Vec::new(),
  });
  task.in_thread();
  assert!(!task.failed);
  assert!(task.result.is_none());
}
