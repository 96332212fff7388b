mod common;
use common::{message, wait_until, TestEnv};
use ironlog::sink::{Sink, SourceRouter};
use ironlog::SinkOptions;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_concurrent_producers_keep_partition_order() {
  let mut opts = SinkOptions::default();
  opts.flush_delay = Duration::from_millis(2);
  let env = TestEnv::new(opts, SourceRouter::new());

  let thread_count = 8;
  let items_per_thread = 500;
  let barrier = Arc::new(Barrier::new(thread_count));
  let mut handles = Vec::new();

  // Each producer writes to one of four partitions; two producers share each.
  for t_id in 0..thread_count {
    let sink = env.sink.clone();
    let barrier = barrier.clone();

    handles.push(thread::spawn(move || {
      let source = format!("p{}", t_id % 4);
      barrier.wait();
      for i in 0..items_per_thread {
        assert!(sink.log(&message(&[source.as_str()], &format!("{}:{}", t_id, i))));
      }
    }));
  }

  for h in handles {
    h.join().unwrap();
  }
  env.sink.close();

  let mut total = 0;
  for p in 0..4 {
    let records = env.read(&format!("p{}.log", p));
    total += records.len();

    // Records of one producer appear in the order it logged them.
    let mut next: HashMap<usize, usize> = HashMap::new();
    for r in &records {
      let text = &r.message().unwrap().text;
      let (t, i) = text.split_once(':').unwrap();
      let (t, i): (usize, usize) = (t.parse().unwrap(), i.parse().unwrap());
      assert_eq!(t % 4, p, "record of producer {} in wrong partition", t);

      let expected = next.entry(t).or_insert(0);
      assert_eq!(i, *expected, "producer {} out of order", t);
      *expected += 1;
    }
  }

  assert_eq!(total, thread_count * items_per_thread, "Total items mismatch");
  let stats = env.sink.stats();
  assert_eq!(stats.records_enqueued, (thread_count * items_per_thread) as u64);
  assert_eq!(stats.records_written, stats.records_enqueued);
  assert_eq!(stats.records_lost, 0);
}

#[test]
fn test_at_most_one_cycle_at_a_time() {
  let mut opts = SinkOptions::default();
  opts.flush_delay = Duration::from_millis(1);
  let env = TestEnv::new(opts, SourceRouter::new());

  let stop = Arc::new(AtomicBool::new(false));

  // Manual flushes race the background worker.
  let flusher = {
    let sink = env.sink.clone();
    let stop = stop.clone();
    thread::spawn(move || {
      while !stop.load(Ordering::Relaxed) {
        sink.flush();
      }
    })
  };

  let producers: Vec<_> = (0..4)
    .map(|t| {
      let sink = env.sink.clone();
      thread::spawn(move || {
        for i in 0..1000 {
          let source = format!("p{}", (t + i) % 16);
          sink.log(&message(&[source.as_str()], "x"));
        }
      })
    })
    .collect();

  for h in producers {
    h.join().unwrap();
  }
  stop.store(true, Ordering::Relaxed);
  flusher.join().unwrap();
  env.sink.close();

  let stats = env.sink.stats();
  assert_eq!(stats.max_concurrent_cycles, 1);
  assert_eq!(stats.records_written, 4000);
}

#[test]
fn test_no_lost_wakeup() {
  let mut opts = SinkOptions::default();
  opts.flush_delay = Duration::from_millis(1);
  let env = TestEnv::new(opts, SourceRouter::new());

  // Without manual flushes every record must still be written by the worker.
  for i in 1..=200u64 {
    env.sink.log(&message(&["svc"], &i.to_string()));
    assert!(
      wait_until(Duration::from_secs(5), || env.sink.stats().records_written == i),
      "record {} never flushed",
      i
    );
  }
}

#[test]
fn test_records_logged_during_cycle_schedule_another() {
  let mut opts = SinkOptions::default();
  opts.flush_delay = Duration::from_millis(1);
  let env = TestEnv::new(opts, SourceRouter::new());

  let producers: Vec<_> = (0..4)
    .map(|t| {
      let sink = env.sink.clone();
      thread::spawn(move || {
        for i in 0..250 {
          sink.log(&message(&["svc"], &format!("{}-{}", t, i)));
          if i % 50 == 0 {
            thread::sleep(Duration::from_millis(3));
          }
        }
      })
    })
    .collect();
  for h in producers {
    h.join().unwrap();
  }

  assert!(wait_until(Duration::from_secs(5), || env.sink.stats().records_written == 1000));
  assert_eq!(env.read("svc.log").len(), 1000);
  assert!(env.sink.stats().flush_cycles > 1);
}
