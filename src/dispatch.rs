use std::sync::Arc;

use parking_lot::RwLock;

use crate::builder::RecordBuilder;
use crate::config::LogDefaults;
use crate::error::Result;
use crate::record::{ExceptionChain, LogRecord, MessageKind, Payload, Timestamp};
use crate::sink::Sink;

type SinkList = Arc<Vec<Arc<dyn Sink>>>;

/// Fans records out to a changing set of sinks.
///
/// Logging reads an immutable snapshot of the sink list, so adding or
/// removing a sink never blocks or disturbs a record that is already being
/// delivered. Sinks are identified by the `Arc` they were added with.
pub struct Dispatcher {
  sinks: RwLock<SinkList>,
  defaults: LogDefaults,
}

impl Default for Dispatcher {
  fn default() -> Self {
    Self::new(LogDefaults::default())
  }
}

impl Dispatcher {
  pub fn new(defaults: LogDefaults) -> Self {
    Self {
      sinks: RwLock::new(Arc::new(Vec::new())),
      defaults,
    }
  }

  pub fn with_sinks(defaults: LogDefaults, sinks: impl IntoIterator<Item = Arc<dyn Sink>>) -> Self {
    Self {
      sinks: RwLock::new(Arc::new(sinks.into_iter().collect())),
      defaults,
    }
  }

  pub fn defaults(&self) -> &LogDefaults {
    &self.defaults
  }

  /// Adds `sink` and returns it.
  pub fn add_sink(&self, sink: Arc<dyn Sink>) -> Arc<dyn Sink> {
    let mut guard = self.sinks.write();
    let mut next = Vec::with_capacity(guard.len() + 1);
    next.extend(guard.iter().cloned());
    next.push(sink.clone());
    *guard = Arc::new(next);
    sink
  }

  /// Removes the first occurrence of `sink`. Returns whether it was found.
  pub fn remove_sink(&self, sink: &Arc<dyn Sink>) -> bool {
    let mut guard = self.sinks.write();
    match guard.iter().position(|s| same_sink(s, sink)) {
      Some(index) => {
        let mut next: Vec<_> = guard.iter().cloned().collect();
        next.remove(index);
        *guard = Arc::new(next);
        true
      }
      None => false,
    }
  }

  pub fn contains_sink(&self, sink: &Arc<dyn Sink>) -> bool {
    self.snapshot().iter().any(|s| same_sink(s, sink))
  }

  pub fn sink_count(&self) -> usize {
    self.snapshot().len()
  }

  fn snapshot(&self) -> SinkList {
    self.sinks.read().clone()
  }

  /// Starts a record seeded with this dispatcher's defaults.
  pub fn record(&self) -> RecordBuilder {
    RecordBuilder::new(self.defaults)
  }

  /// Logs a single message stamped with the current time and returns
  /// whether any sink accepted it.
  pub fn log_message<S: AsRef<str>>(&self, text: impl Into<String>, sources: &[S], kind: MessageKind) -> Result<bool> {
    let record = self.single(sources, Payload::message(kind, text))?;
    Ok(self.log(&record))
  }

  /// Logs an error and its whole `source()` chain.
  pub fn log_error<S: AsRef<str>>(&self, err: &(dyn std::error::Error + 'static), sources: &[S]) -> Result<bool> {
    let record = self.single(sources, Payload::exception(ExceptionChain::from_error(err, true)))?;
    Ok(self.log(&record))
  }

  fn single<S: AsRef<str>>(&self, sources: &[S], payload: Payload) -> Result<LogRecord> {
    LogRecord::new(
      sources.iter().map(|s| s.as_ref().to_string()).collect(),
      Timestamp::now(),
      self.defaults.flags,
      self.defaults.priority,
      self.defaults.indent,
      vec![payload],
    )
  }
}

impl Sink for Dispatcher {
  /// Offers the record to every sink, even after one accepted it.
  fn log(&self, record: &LogRecord) -> bool {
    let sinks = self.snapshot();
    let mut accepted = false;
    for sink in sinks.iter() {
      accepted |= sink.log(record);
    }
    accepted
  }
}

fn same_sink(a: &Arc<dyn Sink>, b: &Arc<dyn Sink>) -> bool {
  // Compare data pointers only; vtable pointers are not unique.
  std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
  use super::*;
  use parking_lot::Mutex;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct Counting {
    calls: AtomicUsize,
    accept: bool,
  }

  impl Counting {
    fn new(accept: bool) -> Arc<Self> {
      Arc::new(Self {
        calls: AtomicUsize::new(0),
        accept,
      })
    }
  }

  impl Sink for Counting {
    fn log(&self, _record: &LogRecord) -> bool {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.accept
    }
  }

  #[derive(Default)]
  struct Collect(Mutex<Vec<LogRecord>>);

  impl Sink for Collect {
    fn log(&self, record: &LogRecord) -> bool {
      self.0.lock().push(record.clone());
      true
    }
  }

  #[test]
  fn test_no_sinks_declines() {
    let dispatcher = Dispatcher::default();
    assert!(!dispatcher.log_message("hello", &["a"], MessageKind::Information).unwrap());
  }

  #[test]
  fn test_every_sink_sees_the_record() {
    let dispatcher = Dispatcher::default();
    let yes = Counting::new(true);
    let no = Counting::new(false);
    dispatcher.add_sink(yes.clone());
    dispatcher.add_sink(no.clone());

    assert!(dispatcher.log_message("hello", &["a"], MessageKind::Warning).unwrap());
    assert_eq!(yes.calls.load(Ordering::SeqCst), 1);
    assert_eq!(no.calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_all_declining_returns_false() {
    let dispatcher = Dispatcher::with_sinks(LogDefaults::default(), [Counting::new(false) as Arc<dyn Sink>]);
    assert!(!dispatcher.log_message("x", &["a"], MessageKind::Error).unwrap());
  }

  #[test]
  fn test_add_remove_contains() {
    let dispatcher = Dispatcher::default();
    let sink: Arc<dyn Sink> = Counting::new(true);
    let other: Arc<dyn Sink> = Counting::new(true);

    dispatcher.add_sink(sink.clone());
    assert!(dispatcher.contains_sink(&sink));
    assert!(!dispatcher.contains_sink(&other));
    assert_eq!(dispatcher.sink_count(), 1);

    assert!(!dispatcher.remove_sink(&other));
    assert!(dispatcher.remove_sink(&sink));
    assert!(!dispatcher.contains_sink(&sink));
    assert_eq!(dispatcher.sink_count(), 0);
  }

  #[test]
  fn test_defaults_applied() {
    let mut defaults = LogDefaults::default();
    defaults.priority = 7;
    defaults.indent = 2;
    let dispatcher = Dispatcher::new(defaults);
    let collect = Arc::new(Collect::default());
    dispatcher.add_sink(collect.clone());

    dispatcher.log_message("m", &["svc", "init"], MessageKind::Information).unwrap();
    let record = dispatcher.record().source("svc").message("built").build().unwrap();
    assert!(dispatcher.log(&record));

    let seen = collect.0.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].priority(), 7);
    assert_eq!(seen[0].indent(), 2);
    assert_eq!(seen[0].source_path(), "svc/init");
    assert_eq!(seen[1].priority(), 7);
  }

  #[test]
  fn test_log_error_includes_sources() {
    #[derive(Debug)]
    struct Outer(std::io::Error);
    impl std::fmt::Display for Outer {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "outer failed")
      }
    }
    impl std::error::Error for Outer {
      fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
      }
    }

    let dispatcher = Dispatcher::default();
    let collect = Arc::new(Collect::default());
    dispatcher.add_sink(collect.clone());

    let err = Outer(std::io::Error::other("disk gone"));
    assert!(dispatcher.log_error(&err, &["io"]).unwrap());

    let seen = collect.0.lock();
    let chain = seen[0].exception().unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain.entries()[0], "outer failed");
    assert_eq!(chain.entries()[1], "disk gone");
  }

  #[test]
  fn test_snapshot_survives_concurrent_changes() {
    let dispatcher = Arc::new(Dispatcher::default());
    let sink = Counting::new(true);
    dispatcher.add_sink(sink.clone());

    let handles: Vec<_> = (0..4)
      .map(|i| {
        let d = dispatcher.clone();
        std::thread::spawn(move || {
          for _ in 0..100 {
            if i % 2 == 0 {
              let extra: Arc<dyn Sink> = Counting::new(false);
              d.add_sink(extra.clone());
              d.remove_sink(&extra);
            } else {
              assert!(d.log_message("x", &["a"], MessageKind::Information).unwrap());
            }
          }
        })
      })
      .collect();
    for h in handles {
      h.join().unwrap();
    }

    assert_eq!(sink.calls.load(Ordering::SeqCst), 200);
    assert_eq!(dispatcher.sink_count(), 1);
  }
}
