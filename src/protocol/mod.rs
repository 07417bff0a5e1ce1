//! PostgreSQL wire protocol implementation.
//!
//! This module contains the low-level protocol encoding and decoding.
//!
//! # Structure
//!
//! - `backend`: Server → Client messages (parsing)
//! - `frontend`: Client → Server messages (encoding)
//! - `framer`: Splits a byte stream into framed messages
//! - `reader`: Bounds-checked cursor over a message body
//! - `codec`: Low-level encoding/decoding primitives
//! - `types`: Common protocol types (FormatCode, Oid, TransactionStatus)

pub mod backend;
pub mod codec;
pub mod framer;
pub mod frontend;
pub mod reader;
pub mod types;

pub use framer::{Framer, Message};
pub use reader::PacketReader;
pub use types::{FormatCode, Oid, TransactionStatus};
