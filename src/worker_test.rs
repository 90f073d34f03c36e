use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;

/// Appends its tag to a shared log from the worker thread; optionally
/// sleeps or panics first.
struct ProbeTask {
  tag: usize,
  log: Arc<Mutex<Vec<usize>>>,
  sleep: Duration,
  panic: bool,
}

impl ProbeTask {
  fn new(tag: usize, log: &Arc<Mutex<Vec<usize>>>) -> Box<Self> {
    Box::new(Self {
      tag,
      log: Arc::clone(log),
      sleep: Duration::ZERO,
      panic: false,
    })
  }
}

impl FarMapTask for ProbeTask {
  fn in_thread(&mut self) {
    if !self.sleep.is_zero() {
      std::thread::sleep(self.sleep);
    }
    if self.panic {
      panic!("probe task failure");
    }
    self.log.lock().unwrap().push(self.tag);
  }

  fn sync(self: Box<Self>, _map: &mut FarMap) {}
}

/// Counts drops and whether sync ever ran.
struct LifecycleTask {
  drops: Arc<AtomicUsize>,
  syncs: Arc<AtomicUsize>,
}

impl Drop for LifecycleTask {
  fn drop(&mut self) {
    self.drops.fetch_add(1, Ordering::SeqCst);
  }
}

impl FarMapTask for LifecycleTask {
  fn in_thread(&mut self) {
    std::thread::sleep(Duration::from_millis(50));
  }

  fn sync(self: Box<Self>, _map: &mut FarMap) {
    self.syncs.fetch_add(1, Ordering::SeqCst);
  }
}

fn wait_for<F: Fn() -> bool>(cond: F) {
  for _ in 0..2000 {
    if cond() {
      return;
    }
    std::thread::sleep(Duration::from_millis(1));
  }
  panic!("condition not reached in time");
}

#[test]
fn tasks_run_fifo() {
  let worker = FarMapWorker::start();
  let log = Arc::new(Mutex::new(Vec::new()));

  for tag in 0..8 {
    worker.add_task(ProbeTask::new(tag, &log));
  }
  wait_for(|| log.lock().unwrap().len() == 8);
  assert_eq!(*log.lock().unwrap(), (0..8).collect::<Vec<_>>());

  // Finished tasks come back through the sync queue, also FIFO.
  let mut popped = 0;
  for _ in 0..2000 {
    if worker.try_pop_synced().is_some() {
      popped += 1;
    }
    if popped == 8 {
      break;
    }
    std::thread::sleep(Duration::from_millis(1));
  }
  assert_eq!(popped, 8);
  assert!(worker.try_pop_synced().is_none());
}

#[test]
fn queue_length_tracks_unfinished_work() {
  let worker = FarMapWorker::start();
  let log = Arc::new(Mutex::new(Vec::new()));

  let mut slow = ProbeTask::new(0, &log);
  slow.sleep = Duration::from_millis(150);
  worker.add_task(slow);
  for tag in 1..5 {
    worker.add_task(ProbeTask::new(tag, &log));
  }

  // The slow task keeps the counter up while it executes.
  assert!(worker.queue_length() >= 4);
  wait_for(|| worker.queue_length() == 0);
  wait_for(|| log.lock().unwrap().len() == 5);
}

#[test]
fn panicking_task_is_dropped_and_counted() {
  let worker = FarMapWorker::start();
  let log = Arc::new(Mutex::new(Vec::new()));

  let mut bad = ProbeTask::new(0, &log);
  bad.panic = true;
  worker.add_task(bad);
  worker.add_task(ProbeTask::new(1, &log));

  // The worker survives and keeps serving the queue.
  wait_for(|| log.lock().unwrap().len() == 1);
  assert_eq!(worker.dropped_tasks(), 1);
  assert_eq!(*log.lock().unwrap(), vec![1]);

  // Only the surviving task reaches the sync queue.
  wait_for(|| worker.try_pop_synced().is_some());
  assert!(worker.try_pop_synced().is_none());
}

#[test]
fn shutdown_drops_pending_tasks_without_sync() {
  let drops = Arc::new(AtomicUsize::new(0));
  let syncs = Arc::new(AtomicUsize::new(0));

  {
    let worker = FarMapWorker::start();
    for _ in 0..6 {
      worker.add_task(Box::new(LifecycleTask {
        drops: Arc::clone(&drops),
        syncs: Arc::clone(&syncs),
      }));
    }
    // Drop the worker while most tasks are still queued.
  }

  assert_eq!(drops.load(Ordering::SeqCst), 6);
  assert_eq!(syncs.load(Ordering::SeqCst), 0);
}
