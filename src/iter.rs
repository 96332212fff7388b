use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;
use crate::frame::read_record;
use crate::record::LogRecord;

/// An iterator that sequentially decodes records from a byte source.
///
/// Ends with `None` when the source is exhausted at a record boundary. A
/// malformed or truncated record yields one `Err` and then the iterator is
/// finished. It cannot be rewound; open a new reader to read again.
pub struct RecordReader<R> {
  source: R,
  finished: bool,
  /// Number of records yielded so far.
  position: u64,
}

impl<R: Read> RecordReader<R> {
  pub fn new(source: R) -> Self {
    Self {
      source,
      finished: false,
      position: 0,
    }
  }

  /// Records successfully decoded so far.
  pub fn position(&self) -> u64 {
    self.position
  }

  pub fn into_inner(self) -> R {
    self.source
  }
}

impl RecordReader<BufReader<File>> {
  /// Opens a partition file for reading from its start.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let file = File::open(path)?;
    Ok(Self::new(BufReader::with_capacity(128 * 1024, file)))
  }
}

impl<'a> RecordReader<&'a [u8]> {
  pub fn from_bytes(bytes: &'a [u8]) -> Self {
    Self::new(bytes)
  }
}

impl<R: Read> Iterator for RecordReader<R> {
  type Item = Result<LogRecord>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match read_record(&mut self.source) {
      Ok(Some(record)) => {
        self.position += 1;
        Some(Ok(record))
      }
      Ok(None) => {
        self.finished = true;
        None
      }
      Err(e) => {
        self.finished = true;
        Some(Err(e))
      }
    }
  }
}

impl<R: Read> std::iter::FusedIterator for RecordReader<R> {}
