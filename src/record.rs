//! The immutable log record and its typed payloads.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::kv::KeyValueTree;

/// A point in time as a count of 100 ns ticks since `0001-01-01T00:00:00Z`
/// (proleptic Gregorian calendar, UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
  pub const TICKS_PER_SECOND: i64 = 10_000_000;
  /// Tick count of `1970-01-01T00:00:00Z`.
  pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

  pub const fn from_ticks(ticks: i64) -> Self {
    Self(ticks)
  }

  pub const fn ticks(self) -> i64 {
    self.0
  }

  pub fn now() -> Self {
    Self::from_system_time(SystemTime::now())
  }

  pub fn from_system_time(time: SystemTime) -> Self {
    match time.duration_since(UNIX_EPOCH) {
      Ok(after) => Self(Self::UNIX_EPOCH_TICKS.saturating_add(duration_ticks(after))),
      Err(before) => Self(Self::UNIX_EPOCH_TICKS.saturating_sub(duration_ticks(before.duration()))),
    }
  }

  /// Converts back to a `SystemTime`, or `None` if the platform cannot represent it.
  pub fn to_system_time(self) -> Option<SystemTime> {
    let offset = self.0.checked_sub(Self::UNIX_EPOCH_TICKS)?;
    let magnitude = Duration::new(
      offset.unsigned_abs() / Self::TICKS_PER_SECOND as u64,
      (offset.unsigned_abs() % Self::TICKS_PER_SECOND as u64) as u32 * 100,
    );
    if offset >= 0 {
      UNIX_EPOCH.checked_add(magnitude)
    } else {
      UNIX_EPOCH.checked_sub(magnitude)
    }
  }
}

fn duration_ticks(d: Duration) -> i64 {
  let ticks = d.as_nanos() / 100;
  i64::try_from(ticks).unwrap_or(i64::MAX)
}

/// Bitset of record flags. Bits without a named constant are preserved as-is.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LogFlags(u8);

impl LogFlags {
  pub const DEBUG: LogFlags = LogFlags(0x80);
  pub const TERMINAL: LogFlags = LogFlags(0x40);

  pub const fn empty() -> Self {
    Self(0)
  }

  pub const fn from_bits(bits: u8) -> Self {
    Self(bits)
  }

  pub const fn bits(self) -> u8 {
    self.0
  }

  pub const fn is_empty(self) -> bool {
    self.0 == 0
  }

  pub const fn contains(self, other: LogFlags) -> bool {
    self.0 & other.0 == other.0
  }

  pub fn insert(&mut self, other: LogFlags) {
    self.0 |= other.0;
  }
}

impl BitOr for LogFlags {
  type Output = LogFlags;
  fn bitor(self, rhs: Self) -> Self {
    LogFlags(self.0 | rhs.0)
  }
}

impl BitOrAssign for LogFlags {
  fn bitor_assign(&mut self, rhs: Self) {
    self.0 |= rhs.0;
  }
}

impl fmt::Debug for LogFlags {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "LogFlags({})", self)
  }
}

impl fmt::Display for LogFlags {
  /// `Debug, Terminal`, unknown bits as hex, or `0` when empty.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      return f.write_str("0");
    }
    let mut parts = Vec::new();
    if self.contains(LogFlags::DEBUG) {
      parts.push("Debug".to_string());
    }
    if self.contains(LogFlags::TERMINAL) {
      parts.push("Terminal".to_string());
    }
    let rest = self.0 & !(LogFlags::DEBUG.0 | LogFlags::TERMINAL.0);
    if rest != 0 {
      parts.push(format!("{:#04x}", rest));
    }
    f.write_str(&parts.join(", "))
  }
}

/// Subtype of a message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
  Information = 0,
  Warning = 1,
  Error = 2,
}

impl TryFrom<u8> for MessageKind {
  type Error = Error;
  fn try_from(v: u8) -> Result<Self> {
    match v {
      0 => Ok(MessageKind::Information),
      1 => Ok(MessageKind::Warning),
      2 => Ok(MessageKind::Error),
      _ => Err(Error::Format(format!("Unknown message type: {}", v))),
    }
  }
}

impl fmt::Display for MessageKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      MessageKind::Information => "Information",
      MessageKind::Warning => "Warning",
      MessageKind::Error => "Error",
    };
    f.pad(name)
  }
}

/// Discriminant of a payload; the value is its bit in the payload mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PayloadKind {
  Message = 0x01,
  Exception = 0x02,
  KeyValue = 0x04,
}

impl PayloadKind {
  /// All kinds in wire order.
  pub const ALL: [PayloadKind; 3] = [PayloadKind::Message, PayloadKind::Exception, PayloadKind::KeyValue];

  pub const fn bit(self) -> u8 {
    self as u8
  }
}

/// The set of payload kinds present on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PayloadKinds(u8);

impl PayloadKinds {
  const KNOWN: u8 = 0x07;

  pub const fn empty() -> Self {
    Self(0)
  }

  /// Parses a mask read from the wire.
  pub fn from_bits(bits: u8) -> Result<Self> {
    if bits & !Self::KNOWN != 0 {
      return Err(Error::Format(format!("Unknown payload type bits: {:#04x}", bits)));
    }
    Ok(Self(bits))
  }

  pub const fn bits(self) -> u8 {
    self.0
  }

  pub const fn contains(self, kind: PayloadKind) -> bool {
    self.0 & kind.bit() != 0
  }

  /// Adds `kind`; returns false if it was already present.
  pub fn insert(&mut self, kind: PayloadKind) -> bool {
    let present = self.contains(kind);
    self.0 |= kind.bit();
    !present
  }

  pub fn iter(self) -> impl Iterator<Item = PayloadKind> {
    PayloadKind::ALL.into_iter().filter(move |k| self.contains(*k))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
  pub kind: MessageKind,
  pub text: String,
}

/// Rendered errors, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExceptionChain {
  entries: Vec<String>,
}

impl ExceptionChain {
  pub fn new(entries: Vec<String>) -> Self {
    Self { entries }
  }

  /// Renders `err`, and its `source()` chain when `include_sources` is set.
  pub fn from_error(err: &(dyn std::error::Error + 'static), include_sources: bool) -> Self {
    let mut entries = vec![err.to_string()];
    if include_sources {
      let mut cur = err.source();
      while let Some(inner) = cur {
        entries.push(inner.to_string());
        cur = inner.source();
      }
    }
    Self { entries }
  }

  pub fn entries(&self) -> &[String] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
  Message(Message),
  Exception(ExceptionChain),
  KeyValues(KeyValueTree),
}

impl Payload {
  pub fn message(kind: MessageKind, text: impl Into<String>) -> Self {
    Payload::Message(Message {
      kind,
      text: text.into(),
    })
  }

  pub fn exception(chain: ExceptionChain) -> Self {
    Payload::Exception(chain)
  }

  /// Wraps a frozen tree.
  ///
  /// # Errors
  ///
  /// `Error::Validation` if `tree` has not been frozen.
  pub fn key_values(tree: KeyValueTree) -> Result<Self> {
    if !tree.is_frozen() {
      return Err(Error::Validation(
        "The key/value tree must be frozen before it is attached to a record".into(),
      ));
    }
    Ok(Payload::KeyValues(tree))
  }

  pub fn kind(&self) -> PayloadKind {
    match self {
      Payload::Message(_) => PayloadKind::Message,
      Payload::Exception(_) => PayloadKind::Exception,
      Payload::KeyValues(_) => PayloadKind::KeyValue,
    }
  }
}

/// An immutable structured log entry.
///
/// Payloads are kept in wire order (message, exception, key/values) whatever
/// order they were supplied in.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
  sources: Vec<String>,
  timestamp: Timestamp,
  flags: LogFlags,
  priority: i8,
  indent: u8,
  payload_kinds: PayloadKinds,
  payloads: Vec<Payload>,
}

impl LogRecord {
  /// # Errors
  ///
  /// `Error::Validation` if two payloads share a kind or a key/value payload
  /// carries a tree that is not frozen.
  pub fn new(
    sources: Vec<String>,
    timestamp: Timestamp,
    flags: LogFlags,
    priority: i8,
    indent: u8,
    mut payloads: Vec<Payload>,
  ) -> Result<Self> {
    let mut payload_kinds = PayloadKinds::empty();
    for payload in &payloads {
      if !payload_kinds.insert(payload.kind()) {
        return Err(Error::Validation(format!(
          "A record may not contain two payloads of the same type (duplicated: {:?})",
          payload.kind()
        )));
      }
      if let Payload::KeyValues(tree) = payload {
        if !tree.is_frozen() {
          return Err(Error::Validation(
            "The key/value tree must be frozen before it is attached to a record".into(),
          ));
        }
      }
    }
    payloads.sort_by_key(Payload::kind);

    Ok(Self {
      sources,
      timestamp,
      flags,
      priority,
      indent,
      payload_kinds,
      payloads,
    })
  }

  /// Source names from root to leaf.
  pub fn sources(&self) -> &[String] {
    &self.sources
  }

  /// Sources joined with `/`.
  pub fn source_path(&self) -> String {
    self.sources.join("/")
  }

  pub fn timestamp(&self) -> Timestamp {
    self.timestamp
  }

  pub fn flags(&self) -> LogFlags {
    self.flags
  }

  pub fn priority(&self) -> i8 {
    self.priority
  }

  pub fn indent(&self) -> u8 {
    self.indent
  }

  pub fn payload_kinds(&self) -> PayloadKinds {
    self.payload_kinds
  }

  pub fn payloads(&self) -> &[Payload] {
    &self.payloads
  }

  pub fn message(&self) -> Option<&Message> {
    self.payloads.iter().find_map(|p| match p {
      Payload::Message(m) => Some(m),
      _ => None,
    })
  }

  pub fn exception(&self) -> Option<&ExceptionChain> {
    self.payloads.iter().find_map(|p| match p {
      Payload::Exception(e) => Some(e),
      _ => None,
    })
  }

  pub fn key_values(&self) -> Option<&KeyValueTree> {
    self.payloads.iter().find_map(|p| match p {
      Payload::KeyValues(t) => Some(t),
      _ => None,
    })
  }
}
