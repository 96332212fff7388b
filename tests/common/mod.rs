#![allow(dead_code)]

use ironlog::sink::{PartitionedSink, Router};
use ironlog::{LogFlags, LogRecord, MessageKind, Payload, RecordReader, SinkOptions, Timestamp};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub struct TestEnv {
  pub sink: Arc<PartitionedSink>,
  // The TempDir guard must be kept alive to prevent premature deletion of the directory.
  pub _dir: TempDir,
  pub root: PathBuf,
}

impl TestEnv {
  pub fn new(mut options: SinkOptions, router: impl Router + 'static) -> Self {
    let dir = tempfile::tempdir().unwrap();
    options.root_path = dir.path().to_path_buf();
    let root = options.root_path.clone();

    let sink = Arc::new(PartitionedSink::new(options, router).unwrap());

    Self { sink, _dir: dir, root }
  }

  /// Short debounce so tests don't idle.
  pub fn fast(router: impl Router + 'static) -> Self {
    let mut opts = SinkOptions::default();
    opts.flush_delay = Duration::from_millis(5);
    Self::new(opts, router)
  }

  pub fn read(&self, partition: &str) -> Vec<LogRecord> {
    read_all(&self.root.join(partition))
  }
}

pub fn message(sources: &[&str], text: &str) -> LogRecord {
  LogRecord::new(
    sources.iter().map(|s| s.to_string()).collect(),
    Timestamp::now(),
    LogFlags::empty(),
    0,
    0,
    vec![Payload::message(MessageKind::Information, text)],
  )
  .unwrap()
}

/// Decodes a whole partition file; a missing file reads as empty.
pub fn read_all(path: &Path) -> Vec<LogRecord> {
  if !path.exists() {
    return Vec::new();
  }
  RecordReader::open(path).unwrap().map(|r| r.unwrap()).collect()
}

/// Polls `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if cond() {
      return true;
    }
    std::thread::sleep(Duration::from_millis(2));
  }
  cond()
}
