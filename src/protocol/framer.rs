//! Splitting a byte stream into backend messages.

use crate::error::{Error, Result};

use super::reader::PacketReader;

/// Largest frame accepted from the server.
pub const MAX_MESSAGE_LEN: usize = 1 << 30;

/// Size of the type byte plus the length field.
const HEADER_LEN: usize = 5;

/// One complete backend message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type byte
    pub type_byte: u8,
    /// Declared length, counting the length field itself
    pub len: u32,
    /// Body bytes (`len - 4` of them)
    pub body: Vec<u8>,
}

impl Message {
    /// A reader scoped to this message's body.
    pub fn reader(&self) -> PacketReader<'_> {
        PacketReader::new(&self.body)
    }
}

/// Accumulates raw bytes and hands out whole messages.
///
/// Bytes may arrive in arbitrary chunks; a message is only yielded once its
/// full body is buffered.
#[derive(Debug, Default)]
pub struct Framer {
    buf: Vec<u8>,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the socket.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    fn header(&self) -> Result<Option<(u8, u32)>> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let type_byte = self.buf[0];
        let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]);
        if len < 4 {
            return Err(Error::Protocol(format!("Invalid message length: {}", len)));
        }
        if len as usize > MAX_MESSAGE_LEN {
            return Err(Error::Protocol(format!("Message too large: {} bytes", len)));
        }
        Ok(Some((type_byte, len)))
    }

    /// Pop the next complete message, or `None` if more bytes are needed.
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        let Some((type_byte, len)) = self.header()? else {
            return Ok(None);
        };
        let frame_len = len as usize + 1;
        if self.buf.len() < frame_len {
            return Ok(None);
        }

        let body = self.buf[HEADER_LEN..frame_len].to_vec();
        self.buf.drain(..frame_len);
        Ok(Some(Message {
            type_byte,
            len,
            body,
        }))
    }
}
