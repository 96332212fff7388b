//! Ordered key/value trees carried by `Payload::KeyValues`.

use crate::error::{Error, Result};

/// Wire tag identifying the type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KvTag {
  String = 0,
  Long = 1,
  Double = 2,
  Tree = 3,
}

impl TryFrom<u8> for KvTag {
  type Error = Error;
  fn try_from(v: u8) -> Result<Self> {
    match v {
      0 => Ok(KvTag::String),
      1 => Ok(KvTag::Long),
      2 => Ok(KvTag::Double),
      3 => Ok(KvTag::Tree),
      _ => Err(Error::Format(format!("Unknown key/value tag: {}", v))),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KvValue {
  String(String),
  Long(i64),
  Double(f64),
  Tree(KeyValueTree),
}

impl KvValue {
  pub fn tag(&self) -> KvTag {
    match self {
      KvValue::String(_) => KvTag::String,
      KvValue::Long(_) => KvTag::Long,
      KvValue::Double(_) => KvTag::Double,
      KvValue::Tree(_) => KvTag::Tree,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      KvValue::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_long(&self) -> Option<i64> {
    match self {
      KvValue::Long(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_double(&self) -> Option<f64> {
    match self {
      KvValue::Double(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_tree(&self) -> Option<&KeyValueTree> {
    match self {
      KvValue::Tree(t) => Some(t),
      _ => None,
    }
  }
}

impl From<String> for KvValue {
  fn from(v: String) -> Self {
    KvValue::String(v)
  }
}

impl From<&str> for KvValue {
  fn from(v: &str) -> Self {
    KvValue::String(v.to_string())
  }
}

impl From<i64> for KvValue {
  fn from(v: i64) -> Self {
    KvValue::Long(v)
  }
}

impl From<f64> for KvValue {
  fn from(v: f64) -> Self {
    KvValue::Double(v)
  }
}

impl From<KeyValueTree> for KvValue {
  fn from(v: KeyValueTree) -> Self {
    KvValue::Tree(v)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
  pub key: String,
  pub value: KvValue,
}

impl KeyValue {
  pub fn new(key: impl Into<String>, value: impl Into<KvValue>) -> Self {
    Self {
      key: key.into(),
      value: value.into(),
    }
  }
}

/// An ordered collection of uniquely keyed entries.
///
/// A tree starts out mutable. Once [`freeze`](Self::freeze) is called it can no
/// longer change, and only frozen trees may be nested inside other trees or
/// attached to a record.
#[derive(Debug, Clone, Default)]
pub struct KeyValueTree {
  entries: Vec<KeyValue>,
  frozen: bool,
}

impl PartialEq for KeyValueTree {
  // The freeze flag is a construction detail, not content.
  fn eq(&self, other: &Self) -> bool {
    self.entries == other.entries
  }
}

impl KeyValueTree {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builds a tree from `entries` and freezes it.
  pub fn frozen(entries: impl IntoIterator<Item = KeyValue>) -> Result<Self> {
    let mut tree = Self::new();
    for entry in entries {
      tree.push(entry)?;
    }
    tree.frozen = true;
    Ok(tree)
  }

  /// Appends an entry.
  ///
  /// # Errors
  ///
  /// `Error::Validation` if the tree is frozen, the key is already present at
  /// this level, or the value is a tree that has not been frozen.
  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<KvValue>) -> Result<()> {
    self.push(KeyValue::new(key, value))
  }

  fn push(&mut self, entry: KeyValue) -> Result<()> {
    if self.frozen {
      return Err(Error::Validation("The key/value tree is frozen (read-only)".into()));
    }
    if self.contains_key(&entry.key) {
      return Err(Error::Validation(format!(
        "A key/value pair with the key {:?} already exists in the tree",
        entry.key
      )));
    }
    if let KvValue::Tree(child) = &entry.value {
      if !child.is_frozen() {
        return Err(Error::Validation(format!(
          "The nested tree under {:?} must be frozen before it is attached",
          entry.key
        )));
      }
    }
    self.entries.push(entry);
    Ok(())
  }

  /// Removes and returns the value stored under `key`.
  pub fn remove(&mut self, key: &str) -> Result<Option<KvValue>> {
    if self.frozen {
      return Err(Error::Validation("The key/value tree is frozen (read-only)".into()));
    }
    Ok(
      self
        .entries
        .iter()
        .position(|e| e.key == key)
        .map(|idx| self.entries.remove(idx).value),
    )
  }

  /// Makes the tree immutable.
  ///
  /// # Errors
  ///
  /// `Error::Validation` if the tree is already frozen.
  pub fn freeze(&mut self) -> Result<()> {
    if self.frozen {
      return Err(Error::Validation("The key/value tree is already frozen".into()));
    }
    self.frozen = true;
    Ok(())
  }

  pub fn is_frozen(&self) -> bool {
    self.frozen
  }

  pub fn get(&self, key: &str) -> Option<&KvValue> {
    self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.entries.iter().any(|e| e.key == key)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, KeyValue> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Depth of the deepest nesting; a flat tree has depth 1.
  pub fn depth(&self) -> usize {
    1 + self
      .entries
      .iter()
      .filter_map(|e| e.value.as_tree())
      .map(KeyValueTree::depth)
      .max()
      .unwrap_or(0)
  }
}

impl<'a> IntoIterator for &'a KeyValueTree {
  type Item = &'a KeyValue;
  type IntoIter = std::slice::Iter<'a, KeyValue>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.iter()
  }
}
