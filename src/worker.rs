//! The far map's single background worker and its two task queues.
//!
//! Tasks flow main -> worker through the `in` queue and back through the
//! `sync` queue, strictly FIFO in both directions. A task runs its heavy
//! phase (`in_thread`) on the worker with no access to the map, the scene
//! graph or the GPU, then its short `sync` phase on the main thread where
//! it applies results to the live [`FarMap`]. Tasks are consumed by
//! `sync`; tasks still queued at shutdown are dropped without it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{trace, warn};

use crate::map::FarMap;

/// How long the worker sleeps on an empty queue before re-checking the
/// stop flag; bounds shutdown latency.
const POP_TIMEOUT: Duration = Duration::from_millis(250);

/// A unit of background work.
///
/// Between `add_task` and the moment the task lands in the sync queue only
/// the worker touches it; afterwards only the main thread does. There is
/// no shared mutable state inside a task.
pub trait FarMapTask: Send {
  /// Heavy phase, runs on the worker thread.
  fn in_thread(&mut self);

  /// Result application, runs on the main thread during `update()`.
  fn sync(self: Box<Self>, map: &mut FarMap);
}

/// Handle to the worker thread plus both queue endpoints.
pub struct FarMapWorker {
  in_tx: Sender<Box<dyn FarMapTask>>,
  sync_rx: Receiver<Box<dyn FarMapTask>>,
  in_len: Arc<AtomicI32>,
  dropped: Arc<AtomicU64>,
  stop: Arc<AtomicBool>,
  join: Option<thread::JoinHandle<()>>,
}

impl FarMapWorker {
  /// Spawn the worker. Failure to start the thread is fatal to the host
  /// application by design.
  pub fn start() -> Self {
    let (in_tx, in_rx) = unbounded::<Box<dyn FarMapTask>>();
    let (sync_tx, sync_rx) = unbounded::<Box<dyn FarMapTask>>();
    let in_len = Arc::new(AtomicI32::new(0));
    let dropped = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    let thread_len = Arc::clone(&in_len);
    let thread_dropped = Arc::clone(&dropped);
    let thread_stop = Arc::clone(&stop);
    let join = thread::Builder::new()
      .name("far-map-worker".into())
      .spawn(move || {
        worker_loop(in_rx, sync_tx, thread_len, thread_dropped, thread_stop);
      })
      .expect("failed to start far map worker thread");

    Self {
      in_tx,
      sync_rx,
      in_len,
      dropped,
      stop,
      join: Some(join),
    }
  }

  /// Queue a task for the worker. The length counter covers tasks queued
  /// or currently executing; the fetch advisor paces against it.
  pub fn add_task(&self, task: Box<dyn FarMapTask>) {
    self.in_len.fetch_add(1, Ordering::Relaxed);
    if self.in_tx.send(task).is_err() {
      self.in_len.fetch_sub(1, Ordering::Relaxed);
      warn!("far map worker is gone, task discarded");
    }
  }

  pub fn queue_length(&self) -> i32 {
    self.in_len.load(Ordering::Relaxed)
  }

  /// Tasks whose in-thread phase panicked and were discarded.
  pub fn dropped_tasks(&self) -> u64 {
    self.dropped.load(Ordering::Relaxed)
  }

  /// Non-blocking pop from the sync queue; the main thread drains this
  /// each frame.
  pub fn try_pop_synced(&self) -> Option<Box<dyn FarMapTask>> {
    self.sync_rx.try_recv().ok()
  }
}

impl Drop for FarMapWorker {
  fn drop(&mut self) {
    self.stop.store(true, Ordering::Relaxed);
    if let Some(join) = self.join.take() {
      let _ = join.join();
    }
    // Channel teardown drops any remaining tasks without running sync.
  }
}

fn worker_loop(
  in_rx: Receiver<Box<dyn FarMapTask>>,
  sync_tx: Sender<Box<dyn FarMapTask>>,
  in_len: Arc<AtomicI32>,
  dropped: Arc<AtomicU64>,
  stop: Arc<AtomicBool>,
) {
  loop {
    if stop.load(Ordering::Relaxed) {
      break;
    }
    let mut task = match in_rx.recv_timeout(POP_TIMEOUT) {
      Ok(task) => task,
      Err(RecvTimeoutError::Timeout) => continue,
      Err(RecvTimeoutError::Disconnected) => break,
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| task.in_thread()));
    in_len.fetch_sub(1, Ordering::Relaxed);
    match outcome {
      Ok(()) => {
        trace!("far map task finished in thread");
        if sync_tx.send(task).is_err() {
          break;
        }
      }
      Err(_) => {
        dropped.fetch_add(1, Ordering::Relaxed);
        warn!("far map task panicked and was dropped");
      }
    }
  }
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
