//! Counters the host's profiler can read off the far map.

use std::collections::VecDeque;

/// Rolling window over recent values, for cheap averages.
#[derive(Clone, Debug)]
pub struct RollingAverage {
  window: VecDeque<u64>,
  capacity: usize,
}

impl RollingAverage {
  pub fn new(capacity: usize) -> Self {
    Self {
      window: VecDeque::with_capacity(capacity),
      capacity,
    }
  }

  pub fn push(&mut self, value: u64) {
    if self.window.len() >= self.capacity {
      self.window.pop_front();
    }
    self.window.push_back(value);
  }

  pub fn average(&self) -> f64 {
    if self.window.is_empty() {
      return 0.0;
    }
    self.window.iter().sum::<u64>() as f64 / self.window.len() as f64
  }

  pub fn len(&self) -> usize {
    self.window.len()
  }

  pub fn is_empty(&self) -> bool {
    self.window.is_empty()
  }
}

/// Per-frame render statistics, rebuilt by every `render()` call.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
  pub total_farblocks: usize,
  /// Whole fine meshes drawn.
  pub rendered_farblocks: usize,
  /// Crude meshes drawn.
  pub rendered_crudes: usize,
  /// Map-block piece meshes drawn.
  pub rendered_mapblock_parts: usize,
  /// 2x2x2 piece meshes drawn.
  pub rendered_mapblock2_parts: usize,
  pub render_time_us: u64,
}

/// Aggregated far-map activity counters.
#[derive(Clone, Debug)]
pub struct FarMapMetrics {
  pub tasks_added: u64,
  pub tasks_finished: u64,
  /// Tasks whose worker phase panicked and were discarded.
  pub tasks_dropped: u64,
  pub decode_failures: u64,
  pub meshes_generated: u64,
  pub faces_per_mesh: RollingAverage,
  pub frame: FrameStats,
}

impl Default for FarMapMetrics {
  fn default() -> Self {
    Self {
      tasks_added: 0,
      tasks_finished: 0,
      tasks_dropped: 0,
      decode_failures: 0,
      meshes_generated: 0,
      faces_per_mesh: RollingAverage::new(128),
      frame: FrameStats::default(),
    }
  }
}
