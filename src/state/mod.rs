//! Sans-I/O state machines for PostgreSQL protocol.
//!
//! These state machines handle the protocol logic without performing any I/O.
//! They produce `Action` values that tell the caller what to do next.

pub mod action;
pub mod connection;
pub mod simple_query;

pub use action::{Action, AsyncMessage};
pub use connection::{ConnectionState, ConnectionStateMachine};
pub use simple_query::SimpleQueryStateMachine;

use crate::buffer_set::BufferSet;
use crate::error::Result;
use crate::protocol::types::TransactionStatus;

/// A protocol exchange driven one message at a time.
///
/// The first `step()` call produces the opening action; every later call
/// expects the message just read in `buffer_set`.
pub trait StateMachine {
    /// Advance the exchange.
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action>;

    /// Transaction status reported by the last ReadyForQuery.
    fn transaction_status(&self) -> TransactionStatus;
}
