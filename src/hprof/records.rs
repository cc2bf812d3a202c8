//! Top-level record stream
//!
//! The header is a NUL-terminated version string, a 4-byte identifier width
//! and an 8-byte creation timestamp. It is followed by records framed as
//! `tag: u8, time: u32, length: u32, payload[length]`.

use super::tags;
use crate::cursor::ByteCursor;
use crate::error::{HeapError, Result};
use crate::model::{IdSize, Identifier};
use serde::Serialize;

/// Snapshot header metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotHeader {
    pub version: String,
    pub id_size: IdSize,
    /// Creation time in epoch milliseconds (advisory)
    pub timestamp_ms: u64,
}

/// One framed top-level record
#[derive(Debug)]
pub struct Record<'a> {
    pub tag: u8,
    /// Absolute offset of the tag byte
    pub offset: u64,
    /// Cursor bounded to exactly the declared payload length
    pub body: ByteCursor<'a>,
}

/// Decoded `LOAD CLASS` record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadClass {
    pub class_serial: u32,
    pub class_id: Identifier,
    pub name_id: Identifier,
}

/// Iterator-like reader over top-level records
pub struct RecordStream<'a> {
    cursor: ByteCursor<'a>,
    header: SnapshotHeader,
}

impl<'a> RecordStream<'a> {
    /// Read the header and position the stream at the first record
    ///
    /// `id_size_override` replaces the header-declared width, which is still
    /// consumed from the input.
    pub fn open(data: &'a [u8], id_size_override: Option<IdSize>) -> Result<Self> {
        let mut cursor = ByteCursor::new(data, IdSize::Four);
        let version = cursor.read_cstr()?;
        let declared = cursor.read_u32()?;
        let id_size = match id_size_override {
            Some(size) => size,
            None => IdSize::from_width(declared).ok_or_else(|| {
                HeapError::InvalidHeader(format!(
                    "identifier width must be 4 or 8, header declares {}",
                    declared
                ))
            })?,
        };
        let timestamp_ms = cursor.read_u64()?;
        cursor.set_id_size(id_size);

        tracing::debug!(
            "HPROF header: version={:?} id_size={} timestamp={}",
            version,
            id_size.bytes(),
            timestamp_ms
        );

        Ok(Self {
            cursor,
            header: SnapshotHeader {
                version,
                id_size,
                timestamp_ms,
            },
        })
    }

    pub fn header(&self) -> &SnapshotHeader {
        &self.header
    }

    /// Absolute offset of the next record
    pub fn offset(&self) -> u64 {
        self.cursor.offset()
    }

    /// Frame the next record, `None` at a clean end of input
    ///
    /// A record whose declared length runs past the end of input is a
    /// `TruncatedInput` error, not a short record.
    pub fn next_record(&mut self) -> Result<Option<Record<'a>>> {
        if self.cursor.is_empty() {
            return Ok(None);
        }

        let offset = self.cursor.offset();
        let tag = self.cursor.read_u8()?;
        let body = self.read_body().map_err(|e| e.in_record(tag, offset))?;
        Ok(Some(Record { tag, offset, body }))
    }

    fn read_body(&mut self) -> Result<ByteCursor<'a>> {
        let _time = self.cursor.read_u32()?;
        let length = self.cursor.read_u32()? as usize;
        self.cursor.sub_cursor(length)
    }
}

impl Record<'_> {
    /// Decode a `STRING` record into its identifier and text
    pub fn read_string(&mut self) -> Result<(Identifier, String)> {
        let id_width = self.body.id_size().bytes();
        if self.body.remaining() < id_width {
            return Err(HeapError::MalformedRecord {
                tag: self.tag,
                offset: self.offset,
                reason: format!(
                    "string record of {} bytes is shorter than an identifier",
                    self.body.remaining()
                ),
            });
        }
        let id = self.body.read_id()?;
        let len = self.body.remaining();
        let text = String::from_utf8_lossy(self.body.read_bytes(len)?).into_owned();
        Ok((id, text))
    }

    /// Decode a `LOAD CLASS` record
    pub fn read_load_class(&mut self) -> Result<LoadClass> {
        let class_serial = self.body.read_u32()?;
        let class_id = self.body.read_id()?;
        let _stack_trace_serial = self.body.read_u32()?;
        let name_id = self.body.read_id()?;
        Ok(LoadClass {
            class_serial,
            class_id,
            name_id,
        })
    }

    pub fn is_heap_dump(&self) -> bool {
        self.tag == tags::HEAP_DUMP || self.tag == tags::HEAP_DUMP_SEGMENT
    }

    /// Known record whose payload is irrelevant to memory analysis
    pub fn is_skippable(&self) -> bool {
        tags::SKIPPED_RECORDS.contains(&self.tag)
    }
}
