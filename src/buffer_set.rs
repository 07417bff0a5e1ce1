//! Buffer set shared between a connection and its state machines.

/// Buffers a state machine reads from and writes into.
///
/// The driver fills `read_buffer`/`type_byte` with one framed message before
/// each `step()`, and flushes `write_buffer` when asked to.
#[derive(Debug)]
pub struct BufferSet {
    /// Body of the last message read (without type byte and length)
    pub read_buffer: Vec<u8>,
    /// Outgoing messages
    pub write_buffer: Vec<u8>,
    /// Type byte of the last message read
    pub type_byte: u8,
}

impl BufferSet {
    /// Create a new buffer set.
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            write_buffer: Vec::with_capacity(8192),
            type_byte: 0,
        }
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}
