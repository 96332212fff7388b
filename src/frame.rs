use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::codec::{read_string, read_strings, read_tree, require, write_string, write_strings, write_tree};
use crate::error::{Error, Result};
use crate::record::{ExceptionChain, LogFlags, LogRecord, Message, MessageKind, Payload, PayloadKind, PayloadKinds, Timestamp};

/// The binary layout of one record. Files are a bare concatenation of these.
///
/// [Sources: string sequence]
/// [Timestamp ticks: 8, LE]
/// [Priority: 1, signed]
/// [Flags: 1]
/// [Indent: 1]
/// [Payload mask: 1]  bit0 Message, bit1 Exception, bit2 KeyValue
/// [Message: subtype 1 + string]        if bit0
/// [Exception: string sequence]         if bit1
/// [KeyValue: tree]                     if bit2
pub fn write_record<W: Write>(writer: &mut W, record: &LogRecord) -> Result<()> {
  write_strings(writer, record.sources())?;
  writer.write_i64::<LittleEndian>(record.timestamp().ticks())?;
  writer.write_i8(record.priority())?;
  writer.write_u8(record.flags().bits())?;
  writer.write_u8(record.indent())?;
  writer.write_u8(record.payload_kinds().bits())?;

  // Payloads are stored in mask order already.
  for payload in record.payloads() {
    match payload {
      Payload::Message(msg) => {
        writer.write_u8(msg.kind as u8)?;
        write_string(writer, &msg.text)?;
      }
      Payload::Exception(chain) => write_strings(writer, chain.entries())?,
      Payload::KeyValues(tree) => write_tree(writer, tree)?,
    }
  }
  Ok(())
}

/// Serializes a record into a fresh buffer.
pub fn encode_record(record: &LogRecord) -> Result<Vec<u8>> {
  let mut buffer = Vec::with_capacity(64);
  write_record(&mut buffer, record)?;
  Ok(buffer)
}

/// Reads the next record.
///
/// `Ok(None)` means the source ended cleanly at a record boundary.
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<LogRecord>> {
  let sources = match read_strings(reader)? {
    Some(s) => s,
    None => return Ok(None),
  };

  let ticks = reader
    .read_i64::<LittleEndian>()
    .map_err(|e| Error::from_read(e, "timestamp"))?;
  let priority = reader.read_i8().map_err(|e| Error::from_read(e, "priority"))?;
  let flags = reader.read_u8().map_err(|e| Error::from_read(e, "flags"))?;
  let indent = reader.read_u8().map_err(|e| Error::from_read(e, "indent"))?;
  let mask = reader.read_u8().map_err(|e| Error::from_read(e, "payload mask"))?;
  let kinds = PayloadKinds::from_bits(mask)?;

  let mut payloads = Vec::with_capacity(3);
  for kind in kinds.iter() {
    let payload = match kind {
      PayloadKind::Message => {
        let subtype = reader.read_u8().map_err(|e| Error::from_read(e, "message type"))?;
        Payload::Message(Message {
          kind: MessageKind::try_from(subtype)?,
          text: require(read_string(reader)?, "message text")?,
        })
      }
      PayloadKind::Exception => {
        Payload::Exception(ExceptionChain::new(require(read_strings(reader)?, "exception chain")?))
      }
      PayloadKind::KeyValue => Payload::KeyValues(require(read_tree(reader)?, "key/value tree")?),
    };
    payloads.push(payload);
  }

  LogRecord::new(
    sources,
    Timestamp::from_ticks(ticks),
    LogFlags::from_bits(flags),
    priority,
    indent,
    payloads,
  )
  .map(Some)
  .map_err(|e| Error::Format(e.to_string()))
}

/// Decodes a single record occupying the whole of `bytes`.
pub fn decode_record(bytes: &[u8]) -> Result<LogRecord> {
  let mut cursor = bytes;
  let record = require(read_record(&mut cursor)?, "record")?;
  if !cursor.is_empty() {
    return Err(Error::Format(format!("{} trailing bytes after record", cursor.len())));
  }
  Ok(record)
}
