//! A minimal binary-Avro cursor: just enough of the Avro binary encoding
//! to read or skip the primitive types the alert envelope uses
//! (`int`/`long` zig-zag varints, `float`/`double` little-endian IEEE754,
//! length-prefixed `string`/`bytes`, and `union` of `null` with one other
//! type). This intentionally does not attempt to be a general Avro
//! decoder -- see `record::decode` for why the fast path only reads the
//! handful of fields the index needs.

use crate::error::{AlertbaseError, Result};

pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.buf.len())
            .ok_or(AlertbaseError::DecodeTruncated { offset: self.pos })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Reads a zig-zag varint-encoded `long`.
    pub fn read_long(&mut self) -> Result<i64> {
        let start = self.pos;
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(AlertbaseError::DecodeTruncated { offset: start })?;
            self.pos += 1;
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(((result >> 1) as i64) ^ -((result & 1) as i64))
    }

    pub fn read_int(&mut self) -> Result<i32> {
        Ok(self.read_long()? as i32)
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        let arr: [u8; 8] = bytes.try_into().unwrap();
        Ok(f64::from_le_bytes(arr))
    }

    pub fn read_float(&mut self) -> Result<f32> {
        let bytes = self.take(4)?;
        let arr: [u8; 4] = bytes.try_into().unwrap();
        Ok(f32::from_le_bytes(arr))
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_long()?;
        let len = usize::try_from(len)
            .map_err(|_| AlertbaseError::DecodeSchemaMismatch {
                offset: self.pos,
                detail: "negative byte-string length".to_string(),
            })?;
        self.take(len)
    }

    pub fn read_utf8(&mut self) -> Result<String> {
        let offset = self.pos;
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| AlertbaseError::DecodeUtf8 { offset })
    }

    pub fn skip_long(&mut self) -> Result<()> {
        self.read_long().map(|_| ())
    }

    pub fn skip_int(&mut self) -> Result<()> {
        self.read_long().map(|_| ())
    }

    pub fn skip_utf8(&mut self) -> Result<()> {
        self.read_bytes().map(|_| ())
    }

    pub fn skip_fixed(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Skips a `union` of `[null, T]` or `[T, null]` style optional, where
    /// `skip_value` is only invoked when the branch index selects the
    /// non-null arm. Any branch index outside `{0, 1}` is a schema
    /// mismatch.
    pub fn skip_optional<F>(&mut self, skip_value: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let offset = self.pos;
        let branch = self.read_long()?;
        match branch {
            0 => Ok(()),
            1 => skip_value(self),
            other => Err(AlertbaseError::DecodeSchemaMismatch {
                offset,
                detail: format!("unexpected union branch {other}"),
            }),
        }
    }

    /// Skips the Avro Object Container File header: a 4-byte magic, a map
    /// of metadata (terminated by a zero-length block), and a 16-byte sync
    /// marker. We don't validate the magic bytes or metadata contents --
    /// only their shape, so we can advance past them.
    pub fn skip_object_container_header(&mut self) -> Result<()> {
        self.skip_fixed(4)?; // "Obj\x01" magic

        loop {
            let block_count = self.read_long()?;
            if block_count == 0 {
                break;
            }
            let count = if block_count < 0 {
                // A negative block count is followed by the byte size of
                // the block, per the Avro spec; skip it and use the
                // absolute count for the number of entries.
                self.skip_long()?;
                (-block_count) as i64
            } else {
                block_count
            };
            for _ in 0..count {
                self.skip_utf8()?; // key
                self.read_bytes()?; // value (bytes)
            }
        }

        self.skip_fixed(16)?; // sync marker
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_long_matching_varint_zigzag() {
        let mut c = Cursor::new(&[0x02]); // zigzag(1) = 2
        assert_eq!(c.read_long().unwrap(), 1);
    }

    #[test]
    fn reads_double_little_endian() {
        let bytes = 2459065.65625f64.to_le_bytes();
        let mut c = Cursor::new(&bytes);
        assert_eq!(c.read_double().unwrap(), 2459065.65625);
    }

    #[test]
    fn reads_utf8_length_prefixed() {
        let mut buf = Vec::new();
        buf.push(0x18); // zigzag(12) length-prefix for "ZTF18aaylcqb" (12 bytes)
        buf.extend_from_slice(b"ZTF18aaylcqb");
        let mut c = Cursor::new(&buf);
        assert_eq!(c.read_utf8().unwrap(), "ZTF18aaylcqb");
    }

    #[test]
    fn skip_optional_null_consumes_only_the_tag() {
        let mut c = Cursor::new(&[0x00, 0xAB]);
        c.skip_optional(|_| panic!("should not be called")).unwrap();
        assert_eq!(c.offset(), 1);
    }

    #[test]
    fn skip_optional_invalid_branch_is_schema_mismatch() {
        let mut c = Cursor::new(&[0x04]); // zigzag(2) -> branch 2
        let err = c.skip_optional(|_| Ok(())).unwrap_err();
        assert!(matches!(err, AlertbaseError::DecodeSchemaMismatch { .. }));
    }

    #[test]
    fn truncated_read_is_an_error() {
        let mut c = Cursor::new(&[]);
        assert!(c.read_long().is_err());
    }
}
