//! Strategies that choose a partition (a file relative to the sink root) for each record.

use crc32fast::Hasher;

use crate::error::{Error, Result};
use crate::record::LogRecord;

/// Maps a record and its encoded bytes to a partition identifier.
///
/// `Ok(None)` declines the record; it is not stored and that is not an error.
/// `Err` is a router fault: the record is dropped and counted as undeliverable.
/// A panic is treated the same way and does not reach the producer.
///
/// Each distinct identifier gets its own queue and its own append per cycle.
/// Queues idle for a few cycles are dropped, so the live set follows the
/// identifiers in recent use; the files themselves stay open only during
/// their append.
pub trait Router: Send + Sync {
  fn partition(&self, record: &LogRecord, encoded: &[u8]) -> Result<Option<String>>;
}

impl<F> Router for F
where
  F: Fn(&LogRecord, &[u8]) -> Result<Option<String>> + Send + Sync,
{
  fn partition(&self, record: &LogRecord, encoded: &[u8]) -> Result<Option<String>> {
    self(record, encoded)
  }
}

/// Sends every record to the same file.
#[derive(Debug, Clone)]
pub struct PlainFileRouter {
  file: String,
}

impl PlainFileRouter {
  pub fn new(file: impl Into<String>) -> Self {
    Self { file: file.into() }
  }

  pub fn file(&self) -> &str {
    &self.file
  }
}

impl Router for PlainFileRouter {
  fn partition(&self, _record: &LogRecord, _encoded: &[u8]) -> Result<Option<String>> {
    Ok(Some(self.file.clone()))
  }
}

/// Sends each record to `<root source>.log`, declining records with no sources.
#[derive(Debug, Clone, Default)]
pub struct SourceRouter {
  directory: Option<String>,
}

impl SourceRouter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Places the files under `directory` (relative to the sink root).
  pub fn in_directory(directory: impl Into<String>) -> Self {
    Self {
      directory: Some(directory.into()),
    }
  }
}

impl Router for SourceRouter {
  fn partition(&self, record: &LogRecord, _encoded: &[u8]) -> Result<Option<String>> {
    let root = match record.sources().first() {
      Some(root) => root,
      None => return Ok(None),
    };
    let file = format!("{}.log", root);
    Ok(Some(match &self.directory {
      Some(dir) => format!("{}/{}", dir, file),
      None => file,
    }))
  }
}

/// Spreads records over a fixed number of files by hashing their source path.
///
/// The shard is a CRC-32 of the length-prefixed sources, spread by a
/// multiplicative mix. It does not depend on the toolchain or the process,
/// so the same sources land in the same file across restarts and upgrades.
#[derive(Debug, Clone)]
pub struct HashedRouter {
  shard_count: u16,
}

impl HashedRouter {
  /// # Panics
  ///
  /// Panics if `shard_count` is zero.
  pub fn new(shard_count: u16) -> Self {
    assert!(shard_count > 0, "shard_count must be greater than zero");
    Self { shard_count }
  }

  /// Shard assigned to a source path, in `0..shard_count`.
  #[inline]
  pub fn route(&self, sources: &[String]) -> u16 {
    let mut hasher = Hasher::new();
    for source in sources {
      hasher.update(&(source.len() as u32).to_le_bytes());
      hasher.update(source.as_bytes());
    }
    let mixed = (hasher.finalize() as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32;
    (mixed % self.shard_count as u64) as u16
  }

  /// File name of a shard: `shard_00.log`, `shard_01.log`, ...
  ///
  /// # Panics
  ///
  /// Panics if `shard_id >= shard_count`.
  pub fn shard_name(&self, shard_id: u16) -> String {
    assert!(
      shard_id < self.shard_count,
      "shard_id {} out of range (max: {})",
      shard_id,
      self.shard_count - 1
    );
    format!("shard_{:02}.log", shard_id)
  }

  pub fn shard_count(&self) -> u16 {
    self.shard_count
  }
}

impl Router for HashedRouter {
  fn partition(&self, record: &LogRecord, _encoded: &[u8]) -> Result<Option<String>> {
    Ok(Some(self.shard_name(self.route(record.sources()))))
  }
}

/// Asks each router in turn; the first one that picks a partition wins.
pub struct RouterChain {
  routers: Vec<Box<dyn Router>>,
}

impl RouterChain {
  /// # Errors
  ///
  /// `Error::Config` if `routers` is empty.
  pub fn new(routers: Vec<Box<dyn Router>>) -> Result<Self> {
    if routers.is_empty() {
      return Err(Error::Config("A router chain needs at least one router".into()));
    }
    Ok(Self { routers })
  }

  pub fn push(&mut self, router: impl Router + 'static) {
    self.routers.push(Box::new(router));
  }

  pub fn len(&self) -> usize {
    self.routers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.routers.is_empty()
  }
}

impl Router for RouterChain {
  fn partition(&self, record: &LogRecord, encoded: &[u8]) -> Result<Option<String>> {
    for router in &self.routers {
      if let Some(id) = router.partition(record, encoded)? {
        return Ok(Some(id));
      }
    }
    Ok(None)
  }
}
