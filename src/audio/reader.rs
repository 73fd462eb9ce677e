//! Bounds-checked cursor over an in-memory byte buffer.

use super::error::{DecodeError, DecodeResult};

pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `n` bytes, failing with `Truncated` if fewer are left.
    pub fn take(&mut self, n: usize, what: &'static str) -> DecodeResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(DecodeError::Truncated {
                what,
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    pub fn read_u8(&mut self, what: &'static str) -> DecodeResult<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn read_u24_be(&mut self, what: &'static str) -> DecodeResult<u32> {
        let b = self.take(3, what)?;
        Ok((b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32)
    }

    pub fn read_u32_be(&mut self, what: &'static str) -> DecodeResult<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32_le(&mut self, what: &'static str) -> DecodeResult<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a 32-bit big-endian length prefix followed by that many bytes.
    pub fn read_be_prefixed(&mut self, what: &'static str) -> DecodeResult<&'a [u8]> {
        let len = self.read_u32_be(what)? as usize;
        self.take(len, what)
    }

    /// Read a 32-bit little-endian length prefix followed by that many bytes.
    pub fn read_le_prefixed(&mut self, what: &'static str) -> DecodeResult<&'a [u8]> {
        let len = self.read_u32_le(what)? as usize;
        self.take(len, what)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_mixed_endianness() {
        let data = [0x00, 0x00, 0x01, 0x02, 0x02, 0x00, 0x00, 0x00, 0xAB];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u32_be("be").unwrap(), 0x0102);
        assert_eq!(reader.read_u32_le("le").unwrap(), 2);
        assert_eq!(reader.read_u8("byte").unwrap(), 0xAB);
        assert!(reader.is_empty());
    }

    #[test]
    fn take_past_end_is_truncated() {
        let data = [1, 2, 3];
        let mut reader = ByteReader::new(&data);
        match reader.take(4, "payload") {
            Err(DecodeError::Truncated {
                what,
                needed,
                available,
            }) => {
                assert_eq!(what, "payload");
                assert_eq!(needed, 4);
                assert_eq!(available, 3);
            }
            other => panic!("expected truncation, got {:?}", other.map(|s| s.len())),
        }
        // a failed take does not consume anything
        assert_eq!(reader.remaining(), 3);
    }

    #[test]
    fn length_prefixed_fields() {
        let data = [0, 0, 0, 2, b'h', b'i', 1, 0, 0, 0, b'x'];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_be_prefixed("be str").unwrap(), b"hi");
        assert_eq!(reader.read_le_prefixed("le str").unwrap(), b"x");
    }
}
