use std::path::PathBuf;
use std::time::Duration;

use crate::record::{LogFlags, MessageKind};

/// Defines how often a partitioned sink forces flushed batches to the physical disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
  /// Call `fsync` after every batch appended to a partition file.
  /// Safest, but every flush cycle pays the disk latency.
  Strict,

  /// Never call `fsync` automatically. Batches are handed to the OS
  /// and persisted by its background writeback.
  Async,
}

#[derive(Debug, Clone)]
pub struct SinkOptions {
  /// Base directory that partition identifiers are resolved against.
  pub root_path: PathBuf,

  /// Debounce window between the first enqueue of a burst and the flush.
  /// Default: 25 ms.
  pub flush_delay: Duration,

  pub sync_mode: SyncMode,

  /// Upper bound on partitions drained and written concurrently
  /// within one flush cycle.
  /// Default: 8.
  pub max_parallel_flushes: usize,
}

impl Default for SinkOptions {
  fn default() -> Self {
    Self {
      root_path: PathBuf::from("./logs"),
      flush_delay: Duration::from_millis(25),
      sync_mode: SyncMode::Async,
      max_parallel_flushes: 8,
    }
  }
}

impl SinkOptions {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      root_path: path.into(),
      ..Default::default()
    }
  }
}

/// Values applied to records whose producer did not set them explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogDefaults {
  pub priority: i8,
  pub indent: u8,
  pub flags: LogFlags,
  pub message_kind: MessageKind,
}

impl Default for LogDefaults {
  fn default() -> Self {
    Self {
      priority: 0,
      indent: 0,
      flags: LogFlags::empty(),
      message_kind: MessageKind::Information,
    }
  }
}
