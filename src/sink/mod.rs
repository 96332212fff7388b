//! # Sinks
//!
//! A [`Sink`] accepts finished records. The main implementation,
//! [`PartitionedSink`], encodes each record, asks a [`Router`] which file
//! (partition) it belongs to, queues the bytes and appends them in batches
//! from a background worker.
//!
//! ## Flushing
//!
//! The first record of a burst wins a single compare-and-swap on the
//! schedule word and wakes the worker; every other producer only queues its
//! bytes. The worker waits out the debounce delay, returns the word to idle
//! so later arrivals can schedule the next cycle, then drains every
//! non-empty partition queue in parallel and appends each one with a single
//! write.
//!
//! ## Example
//!
//! ```no_run
//! use ironlog::sink::{PartitionedSink, PlainFileRouter, Sink};
//! use ironlog::{RecordBuilder, SinkOptions};
//!
//! # fn main() -> ironlog::Result<()> {
//! let sink = PartitionedSink::new(SinkOptions::new("./logs"), PlainFileRouter::new("app.log"))?;
//!
//! let record = RecordBuilder::default().source("svc").message("starting up").build()?;
//! assert!(sink.log(&record));
//!
//! // Drain whatever is still queued before exiting.
//! sink.close();
//! # Ok(())
//! # }
//! ```

mod partitioned;
mod queue;
mod router;
mod stats;

use crate::record::LogRecord;

pub use partitioned::{FlushReport, PartitionedSink};
pub use router::{HashedRouter, PlainFileRouter, Router, RouterChain, SourceRouter};
pub use stats::SinkStats;

/// A destination for records.
///
/// Implementations must tolerate concurrent calls from any number of threads.
pub trait Sink: Send + Sync {
  /// Accepts `record`.
  ///
  /// Returns `true` if at least one underlying destination took it. Declining
  /// or failing softly is reported as `false`, never as a panic.
  fn log(&self, record: &LogRecord) -> bool;
}

impl<S: Sink + ?Sized> Sink for std::sync::Arc<S> {
  fn log(&self, record: &LogRecord) -> bool {
    (**self).log(record)
  }
}
