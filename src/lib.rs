//! # IronLog
//!
//! `ironlog` is a structured logging core with a compact binary record format
//! and a partitioned file sink built for many concurrent producers.
//!
//! ## Key Features
//!
//! * **Typed Records**: Hierarchical sources, 100 ns timestamps, priority,
//!   flags and up to three payloads (message, error chain, key/value tree).
//! * **Compact Encoding**: Self-delimiting records with 1-4 byte length
//!   prefixes, readable back as a stream.
//! * **Partitioned Sink**: Routers pick a file per record; bursts are
//!   debounced and appended in one write per file from a single worker.
//! * **Failure Isolation**: A partition that cannot be written loses only its
//!   own batch.
//!
//! ## Example
//!
//! ```no_run
//! use ironlog::sink::{PartitionedSink, SourceRouter};
//! use ironlog::{Dispatcher, MessageKind, RecordReader, SinkOptions};
//! use std::sync::Arc;
//!
//! # fn main() -> ironlog::Result<()> {
//! let dispatcher = Dispatcher::default();
//! let sink = Arc::new(PartitionedSink::new(SinkOptions::new("./logs"), SourceRouter::new())?);
//! dispatcher.add_sink(sink.clone());
//!
//! dispatcher.log_message("starting up", &["svc", "init"], MessageKind::Warning)?;
//! sink.close();
//!
//! for record in RecordReader::open("./logs/svc.log")? {
//!   println!("{:?}", record?.message());
//! }
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod dispatch;
mod error;
mod frame;
mod iter;
mod kv;
mod record;
mod util;

pub mod codec;
pub mod sink;
pub mod varint;

// Text rendering (optional feature, on by default)
#[cfg(feature = "text")]
pub mod text;

// Re-exports for the flat public API
pub use builder::RecordBuilder;
pub use config::{LogDefaults, SinkOptions, SyncMode};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use frame::{decode_record, encode_record, read_record, write_record};
pub use iter::RecordReader;
pub use kv::{KeyValue, KeyValueTree, KvTag, KvValue};
pub use record::{
  ExceptionChain, LogFlags, LogRecord, Message, MessageKind, Payload, PayloadKind, PayloadKinds, Timestamp,
};
pub use util::sanitize_partition_id;
