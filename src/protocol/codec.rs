//! Big-endian primitives for message bodies.
//!
//! Readers return the decoded value plus the unread tail and fail with
//! [`Error::BufferUnderrun`] rather than truncate. Writers append to a `Vec`.

use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::{I16, I32, U32};

use crate::error::{Error, Result};

fn underrun(needed: usize, data: &[u8]) -> Error {
    Error::BufferUnderrun {
        needed,
        available: data.len(),
    }
}

/// Split a fixed-size big-endian value off the front of `data`.
fn read_be<T: FromBytes>(data: &[u8]) -> Result<(T, &[u8])> {
    let needed = size_of::<T>();
    T::read_from_prefix(data).map_err(|_short| underrun(needed, data))
}

#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((byte, rest)) => Ok((*byte, rest)),
        None => Err(underrun(1, data)),
    }
}

#[inline]
pub fn read_i16(data: &[u8]) -> Result<(i16, &[u8])> {
    read_be::<I16>(data).map(|(v, rest)| (v.get(), rest))
}

#[inline]
pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    read_be::<I32>(data).map(|(v, rest)| (v.get(), rest))
}

#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    read_be::<U32>(data).map(|(v, rest)| (v.get(), rest))
}

#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    data.split_at_checked(len).ok_or_else(|| underrun(len, data))
}

/// Split off a NUL-terminated string, dropping the terminator.
#[inline]
pub fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        // The terminator is one byte past whatever is left
        None => Err(underrun(data.len() + 1, data)),
    }
}

#[inline]
pub fn to_str(bytes: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("invalid UTF-8: {e}")))
}

#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    Ok((to_str(bytes)?, rest))
}

#[inline]
pub fn write_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Appends one frontend message and backfills its length on `finish()`.
///
/// Layout: optional type byte, then an int32 length counting itself and the
/// body but not the type byte.
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    len_at: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start a typed message.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        Self::new_startup(buf)
    }

    /// Start an untyped message (StartupMessage).
    pub fn new_startup(buf: &'a mut Vec<u8>) -> Self {
        let len_at = buf.len();
        buf.extend_from_slice(&[0; 4]);
        Self { buf, len_at }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        write_i32(self.buf, value);
    }

    pub fn write_cstr(&mut self, s: &str) {
        write_cstr(self.buf, s);
    }

    /// Backfill the length field.
    pub fn finish(self) {
        let len = (self.buf.len() - self.len_at) as u32;
        self.buf[self.len_at..self.len_at + 4].copy_from_slice(&len.to_be_bytes());
    }
}
