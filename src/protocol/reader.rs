//! Sequential cursor over a message body.

use crate::error::{Error, Result};

use super::codec;

/// Reads primitive protocol values from an immutable buffer, front to back.
///
/// The cursor only advances on success; a failed read leaves it where it was.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    /// Create a reader positioned at the start of `buffer`.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Current cursor position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Unread bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buffer[self.offset..]
    }

    /// True when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.offset >= self.buffer.len()
    }

    fn advance_to(&mut self, rest: &'a [u8]) {
        self.offset = self.buffer.len() - rest.len();
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let (value, rest) = codec::read_u8(self.remaining())?;
        self.advance_to(rest);
        Ok(value)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let (value, rest) = codec::read_i16(self.remaining())?;
        self.advance_to(rest);
        Ok(value)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let (value, rest) = codec::read_i32(self.remaining())?;
        self.advance_to(rest);
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let (value, rest) = codec::read_u32(self.remaining())?;
        self.advance_to(rest);
        Ok(value)
    }

    /// Read the next `len` bytes verbatim.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let (bytes, rest) = codec::read_bytes(self.remaining(), len)?;
        self.advance_to(rest);
        Ok(bytes)
    }

    /// Read the next `len` bytes as UTF-8 text.
    pub fn read_string(&mut self, len: usize) -> Result<&'a str> {
        let (bytes, rest) = codec::read_bytes(self.remaining(), len)?;
        let s = codec::to_str(bytes)?;
        self.advance_to(rest);
        Ok(s)
    }

    /// Read up to the next NUL byte and step past it.
    pub fn read_cstring(&mut self) -> Result<&'a str> {
        let (s, rest) = codec::read_cstr(self.remaining())?;
        self.advance_to(rest);
        Ok(s)
    }

    /// Read a fixed-size array, e.g. the 4-byte MD5 salt.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        bytes
            .try_into()
            .map_err(|_| Error::Protocol(format!("expected {N} bytes")))
    }
}
