use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Unbounded FIFO of encoded records waiting for one partition's next flush.
///
/// The lock is only held to push a chunk or to swap the whole queue out,
/// never across I/O.
#[derive(Default)]
pub(crate) struct PartitionQueue {
  chunks: Mutex<VecDeque<Vec<u8>>>,
  queued_bytes: AtomicUsize,
  /// Consecutive sweeps that found the queue empty.
  idle_sweeps: AtomicU32,
}

/// Empty sweeps after which a partition's queue is dropped from the map.
pub(crate) const IDLE_SWEEPS_BEFORE_EVICTION: u32 = 8;

/// The contents of a queue taken by a flush.
pub(crate) struct DrainedBatch {
  pub buffer: Vec<u8>,
  pub records: usize,
}

impl PartitionQueue {
  pub fn push(&self, chunk: Vec<u8>) {
    let len = chunk.len();
    let mut chunks = self.chunks.lock();
    chunks.push_back(chunk);
    self.queued_bytes.fetch_add(len, Ordering::AcqRel);
    self.idle_sweeps.store(0, Ordering::Relaxed);
  }

  pub fn is_empty(&self) -> bool {
    self.chunks.lock().is_empty()
  }

  pub fn queued_bytes(&self) -> usize {
    self.queued_bytes.load(Ordering::Acquire)
  }

  /// Takes everything queued so far and concatenates it in enqueue order.
  /// Chunks pushed after the swap stay queued for the next cycle.
  pub fn drain(&self) -> Option<DrainedBatch> {
    let chunks = {
      let mut guard = self.chunks.lock();
      let chunks = std::mem::take(&mut *guard);
      let total: usize = chunks.iter().map(Vec::len).sum();
      self.queued_bytes.fetch_sub(total, Ordering::AcqRel);
      chunks
    };
    if chunks.is_empty() {
      return None;
    }

    let total: usize = chunks.iter().map(Vec::len).sum();
    let mut buffer = Vec::with_capacity(total);
    for chunk in &chunks {
      buffer.extend_from_slice(chunk);
    }

    Some(DrainedBatch {
      buffer,
      records: chunks.len(),
    })
  }
}

/// A thread-safe map of partition identifier to queue.
///
/// Partitions are discovered as routers name them. A queue that stays empty
/// for [`IDLE_SWEEPS_BEFORE_EVICTION`] sweeps is dropped and recreated on the
/// next record, so the map tracks recently active partitions only.
#[derive(Default)]
pub(crate) struct PartitionMap {
  inner: RwLock<HashMap<String, Arc<PartitionQueue>>>,
}

impl PartitionMap {
  pub fn get(&self, id: &str) -> Option<Arc<PartitionQueue>> {
    self.inner.read().get(id).cloned()
  }

  /// Gets the queue for `id`, creating it if it doesn't exist.
  ///
  /// Double-checked so the common case only takes the read lock.
  pub fn get_or_create(&self, id: &str) -> Arc<PartitionQueue> {
    {
      let map = self.inner.read();
      if let Some(queue) = map.get(id) {
        return queue.clone();
      }
    }

    let mut map = self.inner.write();
    map
      .entry(id.to_string())
      .or_insert_with(|| Arc::new(PartitionQueue::default()))
      .clone()
  }

  /// Partitions that currently have queued data.
  pub fn pending(&self) -> Vec<(String, Arc<PartitionQueue>)> {
    let map = self.inner.read();
    map
      .iter()
      .filter(|(_, q)| !q.is_empty())
      .map(|(id, q)| (id.clone(), q.clone()))
      .collect()
  }

  /// Ages empty queues and drops those idle for `max_idle` sweeps.
  ///
  /// A queue someone still holds is kept: a producer may be about to push
  /// into it. Every handle is taken under the map lock, so a count of one
  /// under the write lock means no one can reach the queue any more.
  pub fn sweep(&self, max_idle: u32) -> usize {
    let mut map = self.inner.write();
    let before = map.len();
    map.retain(|_, queue| {
      if !queue.is_empty() {
        return true;
      }
      let idle = queue.idle_sweeps.fetch_add(1, Ordering::Relaxed) + 1;
      idle < max_idle || Arc::strong_count(queue) > 1
    });
    before - map.len()
  }

  pub fn len(&self) -> usize {
    self.inner.read().len()
  }

  pub fn queued_bytes(&self) -> usize {
    self.inner.read().values().map(|q| q.queued_bytes()).sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_drain_concatenates_in_order() {
    let queue = PartitionQueue::default();
    queue.push(b"ab".to_vec());
    queue.push(b"c".to_vec());
    queue.push(b"def".to_vec());
    assert_eq!(queue.queued_bytes(), 6);

    let batch = queue.drain().unwrap();
    assert_eq!(batch.buffer, b"abcdef");
    assert_eq!(batch.records, 3);
    assert!(queue.is_empty());
    assert_eq!(queue.queued_bytes(), 0);
    assert!(queue.drain().is_none());
  }

  #[test]
  fn test_map_reuses_queues() {
    let map = PartitionMap::default();
    let a1 = map.get_or_create("a.log");
    let a2 = map.get_or_create("a.log");
    assert!(Arc::ptr_eq(&a1, &a2));
    map.get_or_create("b.log");
    assert_eq!(map.len(), 2);
  }

  #[test]
  fn test_pending_skips_empty() {
    let map = PartitionMap::default();
    map.get_or_create("idle.log");
    map.get_or_create("busy.log").push(vec![1, 2, 3]);

    let pending = map.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].0, "busy.log");
    assert_eq!(map.queued_bytes(), 3);
  }

  #[test]
  fn test_sweep_evicts_idle_queues() {
    let map = PartitionMap::default();
    map.get_or_create("idle.log");
    map.get_or_create("busy.log").push(vec![1]);

    for _ in 0..2 {
      assert_eq!(map.sweep(3), 0);
    }
    assert_eq!(map.sweep(3), 1);
    assert!(map.get("idle.log").is_none());
    assert!(map.get("busy.log").is_some());
  }

  #[test]
  fn test_sweep_keeps_held_and_refreshed_queues() {
    let map = PartitionMap::default();
    let held = map.get_or_create("held.log");
    let refreshed = map.get_or_create("refreshed.log");

    assert_eq!(map.sweep(2), 0);
    refreshed.push(vec![1]);
    refreshed.drain();
    drop(refreshed);

    // The push restarted the idle count; the outstanding handle pins the other queue.
    assert_eq!(map.sweep(2), 0);
    assert_eq!(map.len(), 2);

    // A push through a handle taken before the sweep is not lost.
    held.push(vec![7]);
    drop(held);
    assert_eq!(map.sweep(2), 1);
    assert_eq!(map.get("held.log").unwrap().drain().unwrap().buffer, vec![7]);
  }
}
