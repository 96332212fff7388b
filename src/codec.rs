//! String, string sequence and key/value tree encoding.
//!
//! Strings are a space-efficient byte length followed by UTF-8 bytes.
//! Sequences are a space-efficient count followed by that many strings.
//! Trees are a count followed by `[key][tag: 1][value]` entries, where a
//! value is a string, an 8-byte signed integer, an 8-byte IEEE-754 double
//! (both little-endian) or a nested tree.
//!
//! Readers return `Ok(None)` only when the source is exhausted before the
//! leading length/count; every other shortfall is a format error.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::kv::{KeyValue, KeyValueTree, KvTag, KvValue};
use crate::varint::{read_varint, write_len};

pub fn write_string<W: Write>(writer: &mut W, s: &str) -> Result<()> {
  write_len(writer, s.len())?;
  writer.write_all(s.as_bytes())?;
  Ok(())
}

pub fn read_string<R: Read>(reader: &mut R) -> Result<Option<String>> {
  let len = match read_varint(reader)? {
    Some(len) => len as usize,
    None => return Ok(None),
  };

  let mut buf = Vec::with_capacity(len.min(64 * 1024));
  let read = reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
  if read != len {
    return Err(Error::Format(format!("truncated string: expected {} bytes, found {}", len, read)));
  }

  String::from_utf8(buf)
    .map(Some)
    .map_err(|e| Error::Format(format!("invalid UTF-8 in string: {}", e)))
}

pub fn write_strings<W: Write, S: AsRef<str>>(writer: &mut W, strings: &[S]) -> Result<()> {
  write_len(writer, strings.len())?;
  for s in strings {
    write_string(writer, s.as_ref())?;
  }
  Ok(())
}

pub fn read_strings<R: Read>(reader: &mut R) -> Result<Option<Vec<String>>> {
  let count = match read_varint(reader)? {
    Some(count) => count as usize,
    None => return Ok(None),
  };

  // The count is untrusted; grow as elements actually arrive.
  let mut strings = Vec::with_capacity(count.min(256));
  for _ in 0..count {
    strings.push(require(read_string(reader)?, "string sequence element")?);
  }
  Ok(Some(strings))
}

/// Deepest nesting accepted on read and produced on write; a flat tree is depth 1.
pub const MAX_TREE_DEPTH: usize = 64;

/// # Errors
///
/// `Error::Validation` if the tree nests deeper than [`MAX_TREE_DEPTH`],
/// since no reader would accept it.
pub fn write_tree<W: Write>(writer: &mut W, tree: &KeyValueTree) -> Result<()> {
  write_tree_at(writer, tree, 1)
}

fn write_tree_at<W: Write>(writer: &mut W, tree: &KeyValueTree, depth: usize) -> Result<()> {
  if depth > MAX_TREE_DEPTH {
    return Err(Error::Validation(format!(
      "key/value tree nests deeper than {} levels",
      MAX_TREE_DEPTH
    )));
  }
  write_len(writer, tree.len())?;
  for entry in tree {
    write_string(writer, &entry.key)?;
    writer.write_u8(entry.value.tag() as u8)?;
    match &entry.value {
      KvValue::String(s) => write_string(writer, s)?,
      KvValue::Long(v) => writer.write_i64::<LittleEndian>(*v)?,
      KvValue::Double(v) => writer.write_f64::<LittleEndian>(*v)?,
      KvValue::Tree(child) => write_tree_at(writer, child, depth + 1)?,
    }
  }
  Ok(())
}

/// Reads a tree and returns it frozen.
///
/// A key repeated within one level, or nesting deeper than
/// [`MAX_TREE_DEPTH`], means the stream is corrupt and is reported as
/// `Error::Format`.
pub fn read_tree<R: Read>(reader: &mut R) -> Result<Option<KeyValueTree>> {
  read_tree_at(reader, 1)
}

fn read_tree_at<R: Read>(reader: &mut R, depth: usize) -> Result<Option<KeyValueTree>> {
  if depth > MAX_TREE_DEPTH {
    return Err(Error::Format("key/value tree nested too deeply".into()));
  }

  let count = match read_varint(reader)? {
    Some(count) => count as usize,
    None => return Ok(None),
  };

  let mut entries: Vec<KeyValue> = Vec::with_capacity(count.min(256));
  for _ in 0..count {
    let key = require(read_string(reader)?, "key/value key")?;
    if entries.iter().any(|e| e.key == key) {
      return Err(Error::Format(format!("duplicate key/value key {:?}", key)));
    }

    let tag = reader.read_u8().map_err(|e| Error::from_read(e, "key/value tag"))?;
    let value = match KvTag::try_from(tag)? {
      KvTag::String => KvValue::String(require(read_string(reader)?, "key/value string")?),
      KvTag::Long => KvValue::Long(
        reader
          .read_i64::<LittleEndian>()
          .map_err(|e| Error::from_read(e, "key/value long"))?,
      ),
      KvTag::Double => KvValue::Double(
        reader
          .read_f64::<LittleEndian>()
          .map_err(|e| Error::from_read(e, "key/value double"))?,
      ),
      KvTag::Tree => KvValue::Tree(require(read_tree_at(reader, depth + 1)?, "nested key/value tree")?),
    };
    entries.push(KeyValue { key, value });
  }

  // Keys were checked above and nested trees come back frozen.
  KeyValueTree::frozen(entries)
    .map(Some)
    .map_err(|e| Error::Format(e.to_string()))
}

/// Turns an "absent" read inside a larger structure into a truncation error.
pub(crate) fn require<T>(value: Option<T>, what: &str) -> Result<T> {
  value.ok_or_else(|| Error::Format(format!("truncated {}", what)))
}
