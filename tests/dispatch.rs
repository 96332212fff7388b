mod common;
use common::TestEnv;
use ironlog::sink::{HashedRouter, Sink, SourceRouter};
use ironlog::{Dispatcher, LogDefaults, LogFlags, MessageKind, SinkOptions};

#[test]
fn test_dispatch_to_partitioned_sinks() {
  let by_source = TestEnv::new(SinkOptions::default(), SourceRouter::new());
  let sharded = TestEnv::new(SinkOptions::default(), HashedRouter::new(4));

  let mut defaults = LogDefaults::default();
  defaults.flags = LogFlags::DEBUG;
  let dispatcher = Dispatcher::new(defaults);
  dispatcher.add_sink(by_source.sink.clone());
  dispatcher.add_sink(sharded.sink.clone());

  for i in 0..20 {
    let source = format!("svc{}", i % 2);
    assert!(dispatcher
      .log_message(format!("event {}", i), &[source.as_str(), "io"], MessageKind::Information)
      .unwrap());
  }
  by_source.sink.close();
  sharded.sink.close();

  let svc0 = by_source.read("svc0.log");
  assert_eq!(svc0.len(), 10);
  assert!(svc0.iter().all(|r| r.flags() == LogFlags::DEBUG));
  assert_eq!(by_source.read("svc1.log").len(), 10);

  let router = HashedRouter::new(4);
  let total: usize = (0..4).map(|s| sharded.read(&router.shard_name(s)).len()).sum();
  assert_eq!(total, 20);
}

#[test]
fn test_closed_sink_does_not_block_others() {
  let first = TestEnv::new(SinkOptions::default(), SourceRouter::new());
  let second = TestEnv::new(SinkOptions::default(), SourceRouter::new());

  let dispatcher = Dispatcher::default();
  dispatcher.add_sink(first.sink.clone());
  dispatcher.add_sink(second.sink.clone());
  first.sink.close();

  let record = dispatcher.record().source("svc").message("still delivered").build().unwrap();
  assert!(dispatcher.log(&record));
  second.sink.close();

  assert!(first.read("svc.log").is_empty());
  assert_eq!(second.read("svc.log").len(), 1);
}

#[cfg(feature = "text")]
#[test]
fn test_text_and_binary_side_by_side() {
  use ironlog::text::{TextRenderer, TextSink};
  use std::sync::Arc;

  let env = TestEnv::new(SinkOptions::default(), SourceRouter::new());
  let text = Arc::new(TextSink::new(TextRenderer::new(), Vec::new()));

  let dispatcher = Dispatcher::default();
  dispatcher.add_sink(env.sink.clone());
  dispatcher.add_sink(text.clone());

  dispatcher
    .log_message("starting up", &["svc", "init"], MessageKind::Warning)
    .unwrap();
  env.sink.close();

  assert_eq!(env.read("svc.log").len(), 1);
  assert_eq!(dispatcher.sink_count(), 2);

  let text_sink: Arc<dyn Sink> = text.clone();
  assert!(dispatcher.remove_sink(&text_sink));
  drop(text_sink);
  drop(dispatcher);

  let rendered = String::from_utf8(Arc::try_unwrap(text).ok().unwrap().into_inner()).unwrap();
  assert!(rendered.contains("@ svc/init] <Warning    > starting up"));
}
