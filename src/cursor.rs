//! Sequential big-endian reader over a borrowed byte buffer
//!
//! Only forward movement is supported. Every read checks the remaining
//! length first and reports the absolute offset of the failed read, so a
//! truncated snapshot is reported instead of silently misparsed.

use crate::error::{HeapError, Result};
use crate::model::{IdSize, Identifier};

#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    /// Absolute offset of `data[0]` in the original input
    base: u64,
    id_size: IdSize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], id_size: IdSize) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
            id_size,
        }
    }

    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    /// Change the identifier width once the header has been read
    pub fn set_id_size(&mut self, id_size: IdSize) {
        self.id_size = id_size;
    }

    /// Absolute offset of the next byte to be read
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if needed > self.remaining() {
            return Err(HeapError::TruncatedInput {
                offset: self.offset(),
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Read an unsigned big-endian integer of `n` bytes (1..=8)
    pub fn read_uint(&mut self, n: usize) -> Result<u64> {
        debug_assert!((1..=8).contains(&n));
        let bytes = self.read_bytes(n)?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.read_uint(2)? as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.read_uint(4)? as u32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_uint(8)
    }

    /// Read one identifier at the snapshot's identifier width
    pub fn read_id(&mut self) -> Result<Identifier> {
        Ok(Identifier(self.read_uint(self.id_size.bytes())?))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Relative forward seek
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Split off the next `n` bytes as a bounded cursor and advance past them
    pub fn sub_cursor(&mut self, n: usize) -> Result<ByteCursor<'a>> {
        let start = self.offset();
        let data = self.read_bytes(n)?;
        Ok(ByteCursor {
            data,
            pos: 0,
            base: start,
            id_size: self.id_size,
        })
    }

    /// Read a NUL-terminated string, consuming the terminator
    pub fn read_cstr(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(HeapError::TruncatedInput {
                offset: self.offset(),
                needed: rest.len() + 1,
                available: rest.len(),
            })?;
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(text)
    }

    /// Move to the end of the buffer, returning how many bytes were skipped
    pub fn skip_to_end(&mut self) -> usize {
        let skipped = self.remaining();
        self.pos = self.data.len();
        skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_uint_big_endian() {
        let data = [0x01, 0x02, 0x03, 0x04, 0xff];
        let mut cursor = ByteCursor::new(&data, IdSize::Four);
        assert_eq!(cursor.read_u32().unwrap(), 0x0102_0304);
        assert_eq!(cursor.read_u8().unwrap(), 0xff);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_read_id_respects_width() {
        let data = [0, 0, 0, 0, 0, 0, 0x12, 0x34];
        let mut narrow = ByteCursor::new(&data, IdSize::Four);
        assert_eq!(narrow.read_id().unwrap(), Identifier(0));
        assert_eq!(narrow.read_id().unwrap(), Identifier(0x1234));

        let mut wide = ByteCursor::new(&data, IdSize::Eight);
        assert_eq!(wide.read_id().unwrap(), Identifier(0x1234));
    }

    #[test]
    fn test_truncated_read_reports_offset() {
        let data = [0u8; 3];
        let mut cursor = ByteCursor::new(&data, IdSize::Four);
        cursor.skip(1).unwrap();
        match cursor.read_u32() {
            Err(HeapError::TruncatedInput {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 1);
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("expected TruncatedInput, got {:?}", other),
        }
        // Failed reads do not move the cursor
        assert_eq!(cursor.offset(), 1);
    }

    #[test]
    fn test_sub_cursor_is_bounded_and_offset_aware() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let mut cursor = ByteCursor::new(&data, IdSize::Four);
        cursor.skip(1).unwrap();
        let mut sub = cursor.sub_cursor(3).unwrap();
        assert_eq!(cursor.offset(), 4);
        assert_eq!(sub.offset(), 1);
        assert_eq!(sub.read_bytes(3).unwrap(), &[2, 3, 4]);
        assert!(sub.read_u8().is_err());
        assert_eq!(cursor.read_u8().unwrap(), 5);
    }

    #[test]
    fn test_read_cstr() {
        let data = b"JAVA PROFILE 1.0.3\0rest";
        let mut cursor = ByteCursor::new(data, IdSize::Four);
        assert_eq!(cursor.read_cstr().unwrap(), "JAVA PROFILE 1.0.3");
        assert_eq!(cursor.remaining(), 4);

        let mut unterminated = ByteCursor::new(b"abc", IdSize::Four);
        assert!(unterminated.read_cstr().is_err());
    }
}
