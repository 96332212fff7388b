use crate::config::LogDefaults;
use crate::error::Result;
use crate::kv::KeyValueTree;
use crate::record::{ExceptionChain, LogFlags, LogRecord, MessageKind, Payload, Timestamp};
use crate::sink::Sink;

/// Accumulates the parts of a record in memory.
/// Nothing is validated or sent until [`build`](Self::build) or [`commit`](Self::commit).
#[derive(Debug, Clone)]
pub struct RecordBuilder {
  defaults: LogDefaults,
  sources: Vec<String>,
  timestamp: Option<Timestamp>,
  priority: i8,
  indent: u8,
  flags: LogFlags,
  payloads: Vec<Payload>,
}

impl Default for RecordBuilder {
  fn default() -> Self {
    Self::new(LogDefaults::default())
  }
}

impl RecordBuilder {
  pub fn new(defaults: LogDefaults) -> Self {
    Self {
      defaults,
      sources: Vec::new(),
      timestamp: None,
      priority: defaults.priority,
      indent: defaults.indent,
      flags: defaults.flags,
      payloads: Vec::new(),
    }
  }

  /// Appends one source name below the ones already set.
  pub fn source(mut self, name: impl Into<String>) -> Self {
    self.sources.push(name.into());
    self
  }

  pub fn sources<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.sources.extend(names.into_iter().map(Into::into));
    self
  }

  /// Fixes the timestamp. Unset timestamps are taken at `build` time.
  pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
    self.timestamp = Some(timestamp);
    self
  }

  pub fn priority(mut self, priority: i8) -> Self {
    self.priority = priority;
    self
  }

  pub fn indent(mut self, indent: u8) -> Self {
    self.indent = indent;
    self
  }

  /// Replaces the flags.
  pub fn flags(mut self, flags: LogFlags) -> Self {
    self.flags = flags;
    self
  }

  /// Adds `flag` to the current flags.
  pub fn flag(mut self, flag: LogFlags) -> Self {
    self.flags |= flag;
    self
  }

  /// Adds a message with the default message kind.
  pub fn message(self, text: impl Into<String>) -> Self {
    let kind = self.defaults.message_kind;
    self.message_with_kind(kind, text)
  }

  pub fn message_with_kind(mut self, kind: MessageKind, text: impl Into<String>) -> Self {
    self.payloads.push(Payload::message(kind, text));
    self
  }

  pub fn exception(mut self, chain: ExceptionChain) -> Self {
    self.payloads.push(Payload::Exception(chain));
    self
  }

  /// Adds `err` and every error in its `source()` chain.
  pub fn error(self, err: &(dyn std::error::Error + 'static)) -> Self {
    self.exception(ExceptionChain::from_error(err, true))
  }

  pub fn key_values(mut self, tree: KeyValueTree) -> Self {
    self.payloads.push(Payload::KeyValues(tree));
    self
  }

  /// Produces the immutable record.
  ///
  /// # Errors
  ///
  /// `Error::Validation` if two payloads of one kind were added or a
  /// key/value tree was not frozen.
  pub fn build(self) -> Result<LogRecord> {
    LogRecord::new(
      self.sources,
      self.timestamp.unwrap_or_else(Timestamp::now),
      self.flags,
      self.priority,
      self.indent,
      self.payloads,
    )
  }

  /// Builds the record and hands it to `sink`.
  pub fn commit(self, sink: &dyn Sink) -> Result<bool> {
    let record = self.build()?;
    Ok(sink.log(&record))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;
  use crate::kv::KeyValue;
  use parking_lot::Mutex;

  #[derive(Default)]
  struct Collect(Mutex<Vec<LogRecord>>);

  impl Sink for Collect {
    fn log(&self, record: &LogRecord) -> bool {
      self.0.lock().push(record.clone());
      true
    }
  }

  #[test]
  fn test_defaults_apply() {
    let defaults = LogDefaults {
      priority: 5,
      indent: 2,
      flags: LogFlags::DEBUG,
      message_kind: MessageKind::Warning,
    };
    let record = RecordBuilder::new(defaults).source("svc").message("hi").build().unwrap();

    assert_eq!(record.priority(), 5);
    assert_eq!(record.indent(), 2);
    assert_eq!(record.flags(), LogFlags::DEBUG);
    assert_eq!(record.message().unwrap().kind, MessageKind::Warning);
  }

  #[test]
  fn test_overrides() {
    let tree = KeyValueTree::frozen(vec![KeyValue::new("k", "v")]).unwrap();
    let record = RecordBuilder::default()
      .sources(["svc", "init"])
      .timestamp(Timestamp::from_ticks(99))
      .priority(-3)
      .flag(LogFlags::TERMINAL)
      .message_with_kind(MessageKind::Error, "bad")
      .key_values(tree)
      .build()
      .unwrap();

    assert_eq!(record.sources(), ["svc", "init"]);
    assert_eq!(record.timestamp().ticks(), 99);
    assert_eq!(record.priority(), -3);
    assert!(record.flags().contains(LogFlags::TERMINAL));
    assert!(record.key_values().is_some());
  }

  #[test]
  fn test_duplicate_message_fails_at_build() {
    let res = RecordBuilder::default().message("a").message("b").build();
    assert!(matches!(res, Err(Error::Validation(_))));
  }

  #[test]
  fn test_commit_hands_record_to_sink() {
    let sink = Collect::default();
    assert!(RecordBuilder::default().source("x").message("m").commit(&sink).unwrap());
    assert_eq!(sink.0.lock().len(), 1);
  }
}
