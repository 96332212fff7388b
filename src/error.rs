use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
  #[error("I/O Error: {0}")]
  Io(#[from] io::Error),

  #[error("Malformed log data: {0}")]
  Format(String),

  #[error("Invalid argument: {0}")]
  Validation(String),

  #[error("Value {0} does not fit a space-efficient integer (must be < 2^30)")]
  Range(u64),

  #[error("Configuration Error: {0}")]
  Config(String),
}

impl Error {
  /// Maps a read failure inside a record to the right variant.
  /// Running out of bytes mid-record is corruption, not an I/O fault.
  pub(crate) fn from_read(err: io::Error, what: &str) -> Self {
    if err.kind() == io::ErrorKind::UnexpectedEof {
      Error::Format(format!("truncated {}", what))
    } else {
      Error::Io(err)
    }
  }

  /// True for errors caused by malformed or truncated binary input.
  pub fn is_format(&self) -> bool {
    matches!(self, Error::Format(_))
  }
}
