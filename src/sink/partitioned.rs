use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::config::{SinkOptions, SyncMode};
use crate::error::{Error, Result};
use crate::frame::encode_record;
use crate::record::LogRecord;
use crate::sink::queue::{PartitionMap, PartitionQueue, IDLE_SWEEPS_BEFORE_EVICTION};
use crate::sink::router::Router;
use crate::sink::stats::{Counters, SinkStats};
use crate::sink::Sink;
use crate::util;

// Values of the schedule word.
const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;

enum Signal {
  Flush,
  Shutdown,
}

/// A partition batch that reached its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionWrite {
  pub partition: String,
  pub records: usize,
  pub bytes: usize,
}

/// A partition batch that was dropped because its write failed.
#[derive(Debug)]
pub struct PartitionFailure {
  pub partition: String,
  pub records: usize,
  pub bytes: usize,
  pub error: Error,
}

/// Outcome of one flush cycle. Partitions with nothing queued do not appear.
#[derive(Debug, Default)]
pub struct FlushReport {
  pub written: Vec<PartitionWrite>,
  pub failed: Vec<PartitionFailure>,
}

impl FlushReport {
  /// True if no batch was lost.
  pub fn is_clean(&self) -> bool {
    self.failed.is_empty()
  }

  pub fn is_empty(&self) -> bool {
    self.written.is_empty() && self.failed.is_empty()
  }

  pub fn records_written(&self) -> usize {
    self.written.iter().map(|w| w.records).sum()
  }

  pub fn bytes_written(&self) -> usize {
    self.written.iter().map(|w| w.bytes).sum()
  }
}

enum PartitionOutcome {
  Skipped,
  Written(PartitionWrite),
  Failed(PartitionFailure),
}

struct SinkState {
  options: SinkOptions,
  router: Box<dyn Router>,
  partitions: PartitionMap,
  /// IDLE or SCHEDULED. Only ever moved to SCHEDULED by a successful CAS.
  schedule: AtomicU8,
  closed: AtomicBool,
  /// Producers between their closed check and their push.
  in_flight: AtomicUsize,
  /// Serializes flush cycles. Producers never take it.
  cycle_lock: Mutex<()>,
  counters: Counters,
}

/// Holds one `in_flight` slot for the lifetime of an enqueue.
struct Admission<'a>(&'a AtomicUsize);

impl Drop for Admission<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

impl SinkState {
  /// Registers a producer, or `None` once the sink is closed.
  ///
  /// The slot is taken before `closed` is read and `close` publishes `closed`
  /// before it waits for the count to reach zero, so every admitted record
  /// is queued before the final cycle drains.
  fn admit(&self) -> Option<Admission<'_>> {
    self.in_flight.fetch_add(1, Ordering::SeqCst);
    let admission = Admission(&self.in_flight);
    if self.closed.load(Ordering::SeqCst) {
      return None;
    }
    Some(admission)
  }

  fn route(&self, record: &LogRecord, encoded: &[u8]) -> Result<Option<String>> {
    match panic::catch_unwind(AssertUnwindSafe(|| self.router.partition(record, encoded))) {
      Ok(routed) => routed,
      Err(_) => Err(Error::Validation("router panicked".into())),
    }
  }

  /// Drains every non-empty partition and appends each batch to its file,
  /// then forgets partitions that have been idle for a while.
  fn run_cycle(&self) -> FlushReport {
    let _cycle = self.cycle_lock.lock();
    let _running = self.counters.enter_cycle();

    let report = self.drain_pending();
    let evicted = self.partitions.sweep(IDLE_SWEEPS_BEFORE_EVICTION);
    if evicted > 0 {
      debug!(target: "ironlog", "Evicted {} idle partitions", evicted);
    }
    report
  }

  fn drain_pending(&self) -> FlushReport {
    let pending = self.partitions.pending();
    let mut report = FlushReport::default();
    if pending.is_empty() {
      return report;
    }

    for group in pending.chunks(self.options.max_parallel_flushes.max(1)) {
      let outcomes: Vec<PartitionOutcome> = if group.len() == 1 {
        vec![self.flush_partition(&group[0].0, &group[0].1)]
      } else {
        thread::scope(|s| {
          let handles: Vec<_> = group
            .iter()
            .map(|(id, queue)| s.spawn(move || self.flush_partition(id, queue)))
            .collect();

          handles
            .into_iter()
            .zip(group)
            .map(|(handle, (id, _))| {
              handle.join().unwrap_or_else(|_| {
                PartitionOutcome::Failed(PartitionFailure {
                  partition: id.clone(),
                  records: 0,
                  bytes: 0,
                  error: Error::Io(std::io::Error::other("partition flush panicked")),
                })
              })
            })
            .collect()
        })
      };

      for outcome in outcomes {
        match outcome {
          PartitionOutcome::Skipped => {}
          PartitionOutcome::Written(w) => {
            Counters::bump(&self.counters.batches_written, 1);
            Counters::bump(&self.counters.records_written, w.records as u64);
            Counters::bump(&self.counters.bytes_written, w.bytes as u64);
            report.written.push(w);
          }
          PartitionOutcome::Failed(f) => {
            Counters::bump(&self.counters.batches_lost, 1);
            Counters::bump(&self.counters.records_lost, f.records as u64);
            report.failed.push(f);
          }
        }
      }
    }

    debug!(
      target: "ironlog",
      "Flush cycle finished: {} partitions written ({} bytes), {} failed",
      report.written.len(),
      report.bytes_written(),
      report.failed.len()
    );
    report
  }

  fn flush_partition(&self, id: &str, queue: &PartitionQueue) -> PartitionOutcome {
    let batch = match queue.drain() {
      Some(batch) => batch,
      None => return PartitionOutcome::Skipped,
    };

    let result = util::partition_path(&self.options.root_path, id).and_then(|path| self.append(&path, &batch.buffer));

    match result {
      Ok(()) => PartitionOutcome::Written(PartitionWrite {
        partition: id.to_string(),
        records: batch.records,
        bytes: batch.buffer.len(),
      }),
      Err(e) => {
        error!(
          target: "ironlog",
          "Failed to flush partition. Batch dropped. Partition: {}, Records: {}, Error: {}",
          id,
          batch.records,
          e
        );
        PartitionOutcome::Failed(PartitionFailure {
          partition: id.to_string(),
          records: batch.records,
          bytes: batch.buffer.len(),
          error: e,
        })
      }
    }
  }

  /// Appends `buffer` with a single write. The handle is released afterwards
  /// so other processes can read or rotate the file between cycles.
  fn append(&self, path: &Path, buffer: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
      if !parent.exists() {
        fs::create_dir_all(parent)?;
      }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(buffer)?;

    if self.options.sync_mode == SyncMode::Strict {
      file.sync_data()?;
    }
    Ok(())
  }
}

fn run_worker(state: Arc<SinkState>, signals: Receiver<Signal>) {
  while let Ok(signal) = signals.recv() {
    match signal {
      Signal::Flush => {
        // Let the burst accumulate. Shutdown cuts the wait short; close()
        // runs the final cycle itself.
        match signals.recv_timeout(state.options.flush_delay) {
          Err(RecvTimeoutError::Timeout) | Ok(Signal::Flush) => {}
          Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }
        // Reopen scheduling before draining so records arriving during the
        // cycle schedule the next one.
        state.schedule.store(IDLE, Ordering::Release);
        state.run_cycle();
      }
      Signal::Shutdown => break,
    }
  }
}

/// A sink that routes encoded records to files and appends them in debounced batches.
///
/// Producers never wait on flushing: [`log`](Sink::log) encodes, routes,
/// queues and returns. One background worker performs the flush cycles, so
/// at most one cycle runs at a time. Within a partition, bytes reach the file
/// in the order they were enqueued; across partitions there is no ordering.
///
/// A failed write loses that partition's batch for the cycle and is reported
/// through `tracing`, [`stats`](Self::stats) and the cycle's [`FlushReport`];
/// other partitions are unaffected and nothing is retried.
///
/// Dropping the sink is equivalent to calling [`close`](Self::close).
pub struct PartitionedSink {
  inner: Arc<SinkState>,
  signals: Sender<Signal>,
  worker: Mutex<Option<JoinHandle<()>>>,
}

impl PartitionedSink {
  /// Creates the sink and starts its flush worker.
  ///
  /// # Errors
  ///
  /// `Error::Config` if `max_parallel_flushes` is zero, `Error::Io` if the
  /// root directory cannot be created or the worker thread cannot start.
  pub fn new(options: SinkOptions, router: impl Router + 'static) -> Result<Self> {
    if options.max_parallel_flushes == 0 {
      return Err(Error::Config("max_parallel_flushes must be greater than zero".into()));
    }
    fs::create_dir_all(&options.root_path)?;

    let inner = Arc::new(SinkState {
      options,
      router: Box::new(router),
      partitions: PartitionMap::default(),
      schedule: AtomicU8::new(IDLE),
      closed: AtomicBool::new(false),
      in_flight: AtomicUsize::new(0),
      cycle_lock: Mutex::new(()),
      counters: Counters::default(),
    });

    let (tx, rx) = mpsc::channel();
    let worker_state = inner.clone();
    let handle = thread::Builder::new()
      .name("ironlog-flush".into())
      .spawn(move || run_worker(worker_state, rx))?;

    Ok(Self {
      inner,
      signals: tx,
      worker: Mutex::new(Some(handle)),
    })
  }

  /// Routes a record whose encoding the caller already has and queues it.
  ///
  /// Returns `false` if the sink is closed, every router declined, or the
  /// router faulted, panicked or named an invalid partition. A `true` return
  /// means the record will be in the final cycle of [`close`](Self::close)
  /// at the latest.
  pub fn enqueue(&self, record: &LogRecord, encoded: Vec<u8>) -> bool {
    let _admission = match self.inner.admit() {
      Some(admission) => admission,
      None => return false,
    };

    let id = match self.inner.route(record, &encoded) {
      Ok(Some(id)) => id,
      Ok(None) => {
        Counters::bump(&self.inner.counters.records_declined, 1);
        return false;
      }
      Err(e) => {
        warn!(target: "ironlog", "Router failed; record dropped. Sources: {}, Error: {}", record.source_path(), e);
        Counters::bump(&self.inner.counters.records_undeliverable, 1);
        return false;
      }
    };

    let queue = match self.inner.partitions.get(&id) {
      Some(queue) => queue,
      None => match util::sanitize_partition_id(&id) {
        Ok(safe) => self.inner.partitions.get_or_create(&safe),
        Err(e) => {
          warn!(target: "ironlog", "Router named an invalid partition; record dropped. Error: {}", e);
          Counters::bump(&self.inner.counters.records_undeliverable, 1);
          return false;
        }
      },
    };

    queue.push(encoded);
    Counters::bump(&self.inner.counters.records_enqueued, 1);
    self.schedule_flush();
    true
  }

  /// Wakes the worker unless a flush is already scheduled.
  fn schedule_flush(&self) {
    if self
      .inner
      .schedule
      .compare_exchange(IDLE, SCHEDULED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
      && self.signals.send(Signal::Flush).is_err()
    {
      // Worker already gone; close() will drain what is queued.
      self.inner.schedule.store(IDLE, Ordering::Release);
    }
  }

  /// Runs a flush cycle on the calling thread, without waiting for the debounce delay.
  pub fn flush(&self) -> FlushReport {
    self.inner.run_cycle()
  }

  /// Stops accepting records, stops the worker and drains every queue.
  ///
  /// Returns the report of the final cycle; calling it again returns an
  /// empty report. Producers already past the closed check finish queuing
  /// before the final cycle starts, so every accepted record is drained.
  pub fn close(&self) -> FlushReport {
    if self.inner.closed.swap(true, Ordering::SeqCst) {
      return FlushReport::default();
    }
    while self.inner.in_flight.load(Ordering::SeqCst) != 0 {
      thread::yield_now();
    }

    let _ = self.signals.send(Signal::Shutdown);
    if let Some(handle) = self.worker.lock().take() {
      if handle.join().is_err() {
        error!(target: "ironlog", "Flush worker panicked; draining remaining queues on close");
      }
    }

    self.inner.run_cycle()
  }

  pub fn is_closed(&self) -> bool {
    self.inner.closed.load(Ordering::Acquire)
  }

  /// True while a flush has been scheduled but its cycle has not started.
  pub fn is_flush_scheduled(&self) -> bool {
    self.inner.schedule.load(Ordering::Acquire) == SCHEDULED
  }

  pub fn stats(&self) -> SinkStats {
    self.inner.counters.snapshot()
  }

  /// Number of partitions currently tracked. Idle ones are forgotten after a
  /// few cycles and come back when a router names them again.
  pub fn partition_count(&self) -> usize {
    self.inner.partitions.len()
  }

  /// Bytes queued and not yet taken by a flush.
  pub fn queued_bytes(&self) -> usize {
    self.inner.partitions.queued_bytes()
  }

  pub fn options(&self) -> &SinkOptions {
    &self.inner.options
  }
}

impl Sink for PartitionedSink {
  fn log(&self, record: &LogRecord) -> bool {
    if self.is_closed() {
      return false;
    }
    match encode_record(record) {
      Ok(bytes) => self.enqueue(record, bytes),
      Err(e) => {
        warn!(target: "ironlog", "Failed to encode record; dropped. Sources: {}, Error: {}", record.source_path(), e);
        Counters::bump(&self.inner.counters.records_undeliverable, 1);
        false
      }
    }
  }
}

impl Drop for PartitionedSink {
  fn drop(&mut self) {
    self.close();
  }
}
