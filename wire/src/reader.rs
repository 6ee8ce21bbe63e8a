//! Bounds-checked byte reader.

use crate::error::{ReadError, WireResult};

/// A byte-level reader for decoding protocol data.
///
/// All read operations are bounds-checked and return errors on failure.
/// The reader never panics on malformed input. Multi-byte integers are
/// little-endian.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a new `ByteReader` over a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the number of bytes remaining to read.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns `true` if there are no more bytes to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the current byte position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    fn check(&self, requested: usize) -> WireResult<()> {
        if requested > self.remaining() {
            return Err(ReadError::EndOfBuffer {
                requested,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> WireResult<u8> {
        self.check(1)?;
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> WireResult<u16> {
        self.check(2)?;
        let value = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> WireResult<u32> {
        self.check(4)?;
        let value = u32::from_le_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(value)
    }

    /// Reads `len` bytes as a subslice of the underlying buffer.
    pub fn read_bytes(&mut self, len: usize) -> WireResult<&'a [u8]> {
        self.check(len)?;
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Skips `len` bytes.
    pub fn skip(&mut self, len: usize) -> WireResult<()> {
        self.check(len)?;
        self.pos += len;
        Ok(())
    }

    /// Returns the unread remainder without consuming it.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}
