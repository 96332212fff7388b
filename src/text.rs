//! Human-readable rendering of records.
//!
//! A rendered record starts with a header such as
//! `[2024.03.01 12:30:05.25|  10|Terminal @ svc/init] ` followed by its
//! payloads. Continuation lines are aligned under the end of the header.

use std::io::Write;

use chrono::DateTime;
use parking_lot::Mutex;
use tracing::warn;

use crate::kv::{KeyValueTree, KvValue};
use crate::record::{LogRecord, Payload, Timestamp};
use crate::sink::Sink;

/// Width of `<Information> `, the widest message tag.
const MESSAGE_TAG_WIDTH: usize = 14;

/// The string repeated once per indentation level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indentation {
  unit: String,
}

impl Default for Indentation {
  fn default() -> Self {
    Self::tab()
  }
}

impl Indentation {
  pub fn new(unit: impl Into<String>) -> Self {
    Self { unit: unit.into() }
  }

  pub fn tab() -> Self {
    Self::new("\t")
  }

  pub fn one_space() -> Self {
    Self::new(" ")
  }

  pub fn two_spaces() -> Self {
    Self::new("  ")
  }

  pub fn four_spaces() -> Self {
    Self::new("    ")
  }

  pub fn unit(&self) -> &str {
    &self.unit
  }

  /// `level` copies of the unit.
  pub fn level(&self, level: usize) -> String {
    self.unit.repeat(level)
  }
}

#[derive(Debug, Clone, Default)]
pub struct TextRenderer {
  indentation: Indentation,
  exclude_sources: bool,
}

impl TextRenderer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_indentation(mut self, indentation: Indentation) -> Self {
    self.indentation = indentation;
    self
  }

  /// Leaves the ` @ src/src` part out of the header.
  pub fn exclude_sources(mut self, exclude: bool) -> Self {
    self.exclude_sources = exclude;
    self
  }

  pub fn indentation(&self) -> &Indentation {
    &self.indentation
  }

  /// Renders `record`. The result always ends with a newline.
  pub fn render(&self, record: &LogRecord) -> String {
    let mut out = String::with_capacity(256);

    out.push('[');
    out.push_str(&format_timestamp(record.timestamp()));
    out.push_str(&format!("|{:>4}", record.priority()));
    if !record.flags().is_empty() {
      out.push_str(&format!("|{}", record.flags()));
    }
    if !self.exclude_sources && !record.sources().is_empty() {
      out.push_str(" @ ");
      out.push_str(&record.source_path());
    }
    out.push_str("] ");

    let margin = " ".repeat(out.chars().count());
    let indent = self.indentation.level(record.indent() as usize);

    for (i, payload) in record.payloads().iter().enumerate() {
      if i > 0 {
        out.push_str(&margin);
      }

      match payload {
        Payload::Message(message) => {
          out.push_str(&format!("<{:<11}> ", message.kind));
          let extra = " ".repeat(MESSAGE_TAG_WIDTH);
          for (j, line) in message.text.split('\n').enumerate() {
            if j > 0 {
              out.push_str(&margin);
              out.push_str(&extra);
            }
            out.push_str(&indent);
            out.push_str(line.trim_end_matches('\r'));
            out.push('\n');
          }
        }
        Payload::Exception(chain) => {
          let mut first = true;
          for entry in chain.entries() {
            for line in entry.split('\n') {
              if !first {
                out.push_str(&margin);
              }
              first = false;
              out.push_str(&indent);
              out.push_str(line.trim_end_matches('\r'));
              out.push('\n');
            }
          }
          if first {
            out.push('\n');
          }
        }
        Payload::KeyValues(tree) => {
          self.render_tree(&mut out, tree, record.indent() as usize, &margin);
        }
      }
    }

    if record.payloads().is_empty() {
      out.push('\n');
    }
    out
  }

  fn render_tree(&self, out: &mut String, tree: &KeyValueTree, level: usize, margin: &str) {
    out.push_str(&format!("({} pairs)\n", tree.len()));
    let indent = self.indentation.level(level);

    for pair in tree {
      out.push_str(margin);
      out.push_str(&indent);

      match &pair.value {
        KvValue::Tree(child) => {
          out.push_str(&format!("\"{}\": ", pair.key));
          self.render_tree(out, child, level + 1, margin);
        }
        KvValue::String(s) => {
          out.push_str(&format!("\"{}\" = \"", pair.key));
          // Align continuation lines with the opening quote.
          let extra = " ".repeat(pair.key.chars().count() + 6);
          for (j, line) in s.split('\n').enumerate() {
            if j > 0 {
              out.push('\n');
              out.push_str(margin);
              out.push_str(&indent);
              out.push_str(&extra);
            }
            out.push_str(line.trim_end_matches('\r'));
          }
          out.push_str("\"\n");
        }
        KvValue::Long(v) => out.push_str(&format!("\"{}\" = {}\n", pair.key, v)),
        KvValue::Double(v) => out.push_str(&format!("\"{}\" = {}\n", pair.key, v)),
      }
    }
  }
}

/// `yyyy.MM.dd HH:mm:ss.ff` in UTC, or the raw tick count if the calendar cannot represent it.
fn format_timestamp(timestamp: Timestamp) -> String {
  let offset = timestamp.ticks().wrapping_sub(Timestamp::UNIX_EPOCH_TICKS);
  let secs = offset.div_euclid(Timestamp::TICKS_PER_SECOND);
  let sub_ticks = offset.rem_euclid(Timestamp::TICKS_PER_SECOND);

  match DateTime::from_timestamp(secs, (sub_ticks * 100) as u32) {
    Some(dt) => format!("{}.{:02}", dt.format("%Y.%m.%d %H:%M:%S"), sub_ticks / 100_000),
    None => format!("@{}", timestamp.ticks()),
  }
}

/// A sink that renders records as text into a writer.
pub struct TextSink<W: Write + Send> {
  renderer: TextRenderer,
  writer: Mutex<W>,
}

impl<W: Write + Send> TextSink<W> {
  pub fn new(renderer: TextRenderer, writer: W) -> Self {
    Self {
      renderer,
      writer: Mutex::new(writer),
    }
  }

  pub fn renderer(&self) -> &TextRenderer {
    &self.renderer
  }

  pub fn into_inner(self) -> W {
    self.writer.into_inner()
  }
}

impl<W: Write + Send> Sink for TextSink<W> {
  fn log(&self, record: &LogRecord) -> bool {
    let text = self.renderer.render(record);
    let mut writer = self.writer.lock();
    match writer.write_all(text.as_bytes()) {
      Ok(()) => true,
      Err(e) => {
        warn!(target: "ironlog", "Failed to write rendered record: {}", e);
        false
      }
    }
  }
}
