use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters of a [`PartitionedSink`](super::PartitionedSink).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
  /// Records routed to a partition and queued.
  pub records_enqueued: u64,
  /// Records every router declined.
  pub records_declined: u64,
  /// Records dropped by an encoding failure, router fault or invalid partition.
  pub records_undeliverable: u64,
  pub records_written: u64,
  /// Records lost with a batch whose write failed.
  pub records_lost: u64,
  pub bytes_written: u64,
  pub batches_written: u64,
  pub batches_lost: u64,
  /// Completed flush cycles, including ones that found nothing to write.
  pub flush_cycles: u64,
  /// Highest number of flush cycles observed running at the same time.
  pub max_concurrent_cycles: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
  pub records_enqueued: AtomicU64,
  pub records_declined: AtomicU64,
  pub records_undeliverable: AtomicU64,
  pub records_written: AtomicU64,
  pub records_lost: AtomicU64,
  pub bytes_written: AtomicU64,
  pub batches_written: AtomicU64,
  pub batches_lost: AtomicU64,
  flush_cycles: AtomicU64,
  active_cycles: AtomicU64,
  max_concurrent_cycles: AtomicU64,
}

impl Counters {
  #[inline]
  pub fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
  }

  /// Marks a flush cycle as running until the guard is dropped.
  pub fn enter_cycle(&self) -> CycleGuard<'_> {
    let active = self.active_cycles.fetch_add(1, Ordering::AcqRel) + 1;
    self.max_concurrent_cycles.fetch_max(active, Ordering::AcqRel);
    CycleGuard { counters: self }
  }

  pub fn snapshot(&self) -> SinkStats {
    SinkStats {
      records_enqueued: self.records_enqueued.load(Ordering::Relaxed),
      records_declined: self.records_declined.load(Ordering::Relaxed),
      records_undeliverable: self.records_undeliverable.load(Ordering::Relaxed),
      records_written: self.records_written.load(Ordering::Relaxed),
      records_lost: self.records_lost.load(Ordering::Relaxed),
      bytes_written: self.bytes_written.load(Ordering::Relaxed),
      batches_written: self.batches_written.load(Ordering::Relaxed),
      batches_lost: self.batches_lost.load(Ordering::Relaxed),
      flush_cycles: self.flush_cycles.load(Ordering::Acquire),
      max_concurrent_cycles: self.max_concurrent_cycles.load(Ordering::Acquire),
    }
  }
}

pub(crate) struct CycleGuard<'a> {
  counters: &'a Counters,
}

impl Drop for CycleGuard<'_> {
  fn drop(&mut self) {
    self.counters.active_cycles.fetch_sub(1, Ordering::AcqRel);
    self.counters.flush_cycles.fetch_add(1, Ordering::AcqRel);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cycle_guard_tracks_overlap() {
    let counters = Counters::default();
    {
      let _a = counters.enter_cycle();
      let _b = counters.enter_cycle();
    }
    let _c = counters.enter_cycle();

    let stats = counters.snapshot();
    assert_eq!(stats.max_concurrent_cycles, 2);
    assert_eq!(stats.flush_cycles, 2);
  }
}
