//! Space-efficient unsigned integers.
//!
//! Values below 2^30 are stored in 1 to 4 bytes. The two high bits of the
//! first byte count the bytes that follow; the remaining 30 bits carry the
//! value in big-endian order.
//!
//! ```text
//! 00xxxxxx                             < 2^6
//! 01xxxxxx xxxxxxxx                    < 2^14
//! 10xxxxxx xxxxxxxx xxxxxxxx           < 2^22
//! 11xxxxxx xxxxxxxx xxxxxxxx xxxxxxxx  < 2^30
//! ```

use byteorder::ReadBytesExt;
use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// Exclusive upper bound of encodable values.
pub const VARINT_LIMIT: u32 = 1 << 30;

const ONE_BYTE_LIMIT: u32 = 1 << 6;
const TWO_BYTE_LIMIT: u32 = 1 << 14;
const THREE_BYTE_LIMIT: u32 = 1 << 22;

const TAG_MASK: u8 = 0xC0;

/// Number of bytes `value` occupies on the wire.
pub fn encoded_len(value: u32) -> Result<usize> {
  match value {
    v if v < ONE_BYTE_LIMIT => Ok(1),
    v if v < TWO_BYTE_LIMIT => Ok(2),
    v if v < THREE_BYTE_LIMIT => Ok(3),
    v if v < VARINT_LIMIT => Ok(4),
    v => Err(Error::Range(v as u64)),
  }
}

/// Writes `value` using the fewest bytes possible.
///
/// # Errors
///
/// Returns `Error::Range` if `value >= 2^30`. Nothing is written in that case.
pub fn write_varint<W: Write>(writer: &mut W, value: u32) -> Result<()> {
  let len = encoded_len(value)?;
  let mut bytes = value.to_be_bytes();
  let start = 4 - len;
  bytes[start] |= ((len - 1) as u8) << 6;
  writer.write_all(&bytes[start..])?;
  Ok(())
}

/// Converts a length or count to its wire form.
pub fn write_len<W: Write>(writer: &mut W, len: usize) -> Result<()> {
  let value = u32::try_from(len).map_err(|_| Error::Range(len as u64))?;
  write_varint(writer, value)
}

/// Reads one value.
///
/// Returns `Ok(None)` when the source is exhausted before the first byte.
/// A zero is always `Ok(Some(0))`. Running out of bytes after the first
/// byte is a format error.
pub fn read_varint<R: Read>(reader: &mut R) -> Result<Option<u32>> {
  let first = match reader.read_u8() {
    Ok(b) => b,
    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
    Err(e) => return Err(Error::Io(e)),
  };

  let extra = (first & TAG_MASK) >> 6;
  let mut value = (first & !TAG_MASK) as u32;

  for _ in 0..extra {
    let next = reader.read_u8().map_err(|e| Error::from_read(e, "space-efficient integer"))?;
    value = (value << 8) | next as u32;
  }

  Ok(Some(value))
}

/// Appends `value` to an in-memory buffer.
pub fn encode(value: u32, buffer: &mut Vec<u8>) -> Result<()> {
  write_varint(buffer, value)
}

/// Decodes a value from the front of `bytes`, returning it with the number of bytes consumed.
pub fn decode(bytes: &[u8]) -> Result<Option<(u32, usize)>> {
  let mut cursor = bytes;
  let value = read_varint(&mut cursor)?;
  Ok(value.map(|v| (v, bytes.len() - cursor.len())))
}
