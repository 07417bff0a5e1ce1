//! Simple query protocol state machine.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::handler::TextHandler;
use crate::protocol::backend::{
    CommandComplete, DataRow, EmptyQueryResponse, ErrorResponse, ReadyForQuery, msg_type,
    parse_row_description,
};
use crate::protocol::frontend::write_query;
use crate::protocol::types::TransactionStatus;
use crate::row::RowDescription;

use super::StateMachine;
use super::action::{Action, AsyncMessage};

/// Simple query state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingResponse,
    ProcessingRows,
    WaitingReady,
    Finished,
}

/// Simple query protocol state machine.
///
/// Errors come in two kinds. A malformed or unexpected message is returned
/// from `step()` and leaves the connection unusable. A server ErrorResponse
/// or a handler failure is held back until ReadyForQuery arrives, so the
/// connection is back in sync before [`finish`](Self::finish) reports it.
pub struct SimpleQueryStateMachine<'a, H> {
    state: State,
    handler: &'a mut H,
    sql: &'a str,
    description: Option<RowDescription>,
    deferred_error: Option<Error>,
    transaction_status: TransactionStatus,
}

impl<'a, H: TextHandler> SimpleQueryStateMachine<'a, H> {
    /// Create a new simple query state machine.
    pub fn new(handler: &'a mut H, sql: &'a str) -> Self {
        Self {
            state: State::Initial,
            handler,
            sql,
            description: None,
            deferred_error: None,
            transaction_status: TransactionStatus::Idle,
        }
    }

    /// Outcome of the query once the machine has finished.
    pub fn finish(self) -> Result<()> {
        match self.deferred_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Keep the first failure; the exchange continues to ReadyForQuery.
    fn defer(&mut self, result: Result<()>) {
        if let Err(err) = result
            && self.deferred_error.is_none()
        {
            self.deferred_error = Some(err);
        }
    }

    fn handle_response(&mut self, buffer_set: &BufferSet) -> Result<Action> {
        let type_byte = buffer_set.type_byte;
        let payload = buffer_set.read_buffer.as_slice();

        match (self.state, type_byte) {
            (State::WaitingResponse, msg_type::ROW_DESCRIPTION) => {
                let cols = parse_row_description(payload)?;
                if self.deferred_error.is_none() {
                    let result = self.handler.result_start(&cols);
                    self.defer(result);
                }
                self.description = Some(cols);
                self.state = State::ProcessingRows;
                Ok(Action::ReadMessage)
            }
            (State::ProcessingRows, msg_type::DATA_ROW) => {
                let row = DataRow::parse(payload)?;
                if self.deferred_error.is_none()
                    && let Some(cols) = &self.description
                {
                    let result = self.handler.row(cols, row);
                    self.defer(result);
                }
                Ok(Action::ReadMessage)
            }
            (State::WaitingResponse | State::ProcessingRows, msg_type::COMMAND_COMPLETE) => {
                let complete = CommandComplete::parse(payload)?;
                if self.deferred_error.is_none() {
                    let result = self.handler.result_end(complete);
                    self.defer(result);
                }
                // More commands may follow in a multi-statement query
                self.description = None;
                self.state = State::WaitingResponse;
                Ok(Action::ReadMessage)
            }
            (State::WaitingResponse, msg_type::EMPTY_QUERY_RESPONSE) => {
                EmptyQueryResponse::parse(payload)?;
                if self.deferred_error.is_none() {
                    let result = self.handler.empty_query();
                    self.defer(result);
                }
                self.state = State::WaitingReady;
                Ok(Action::ReadMessage)
            }
            (_, msg_type::READY_FOR_QUERY) => {
                let ready = ReadyForQuery::parse(payload)?;
                self.transaction_status = ready.transaction_status().unwrap_or_default();
                self.state = State::Finished;
                Ok(Action::Finished)
            }
            (state, _) => Err(Error::Protocol(format!(
                "Unexpected message '{}' in state {:?}",
                type_byte as char, state
            ))),
        }
    }
}

impl<H: TextHandler> StateMachine for SimpleQueryStateMachine<'_, H> {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match self.state {
            State::Initial => {
                buffer_set.write_buffer.clear();
                write_query(&mut buffer_set.write_buffer, self.sql);
                self.state = State::WaitingResponse;
                return Ok(Action::WriteAndReadMessage);
            }
            State::Finished => {
                return Err(Error::Protocol("Query already finished".into()));
            }
            State::WaitingResponse | State::ProcessingRows | State::WaitingReady => {}
        }

        let type_byte = buffer_set.type_byte;

        if let Some(async_msg) = AsyncMessage::parse(type_byte, &buffer_set.read_buffer)? {
            return Ok(Action::HandleAsyncMessageAndReadMessage(async_msg));
        }

        if type_byte == msg_type::ERROR_RESPONSE {
            let error = ErrorResponse::parse(&buffer_set.read_buffer)?.into_error();
            if error.is_connection_broken() {
                return Err(error);
            }
            // The server skips the rest of the query string and sends ReadyForQuery
            self.defer(Err(error));
            self.state = State::WaitingReady;
            return Ok(Action::ReadMessage);
        }

        self.handle_response(buffer_set)
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::DropHandler;
    use crate::protocol::codec::{write_cstr, write_i16, write_i32, write_u32};
    use crate::protocol::types::oid;
    use crate::query::QueryResult;
    use crate::value::Value;

    fn feed(buffer_set: &mut BufferSet, type_byte: u8, payload: Vec<u8>) {
        buffer_set.type_byte = type_byte;
        buffer_set.read_buffer = payload;
    }

    fn row_description(names: &[&str]) -> Vec<u8> {
        let mut payload = Vec::new();
        write_i16(&mut payload, names.len() as i16);
        for name in names {
            write_cstr(&mut payload, name);
            write_u32(&mut payload, 0);
            write_i16(&mut payload, 0);
            write_u32(&mut payload, oid::INT4);
            write_i16(&mut payload, 4);
            write_i32(&mut payload, -1);
            write_i16(&mut payload, 0);
        }
        payload
    }

    fn data_row(fields: &[&str]) -> Vec<u8> {
        let mut payload = Vec::new();
        write_i16(&mut payload, fields.len() as i16);
        for field in fields {
            write_i32(&mut payload, field.len() as i32);
            payload.extend_from_slice(field.as_bytes());
        }
        payload
    }

    fn cstr(s: &str) -> Vec<u8> {
        let mut payload = Vec::new();
        write_cstr(&mut payload, s);
        payload
    }

    #[test]
    fn test_select_rows() {
        let mut result = QueryResult::new();
        let mut buffers = BufferSet::new();
        let mut sm = SimpleQueryStateMachine::new(&mut result, "SELECT n FROM t");

        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::WriteAndReadMessage));
        assert_eq!(buffers.write_buffer[0], b'Q');

        feed(&mut buffers, b'T', row_description(&["n"]));
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::ReadMessage));
        for n in ["1", "2"] {
            feed(&mut buffers, b'D', data_row(&[n]));
            assert!(matches!(sm.step(&mut buffers).unwrap(), Action::ReadMessage));
        }
        feed(&mut buffers, b'C', cstr("SELECT 2"));
        sm.step(&mut buffers).unwrap();
        feed(&mut buffers, b'Z', vec![b'T']);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::Finished));
        assert_eq!(sm.transaction_status(), TransactionStatus::InTransaction);
        sm.finish().unwrap();

        assert_eq!(result.rows(), &[vec![Value::Int4(1)], vec![Value::Int4(2)]]);
        assert_eq!(result.rows_affected(), Some(2));
    }

    #[test]
    fn test_server_error_is_deferred() {
        let mut handler = DropHandler::new();
        let mut buffers = BufferSet::new();
        let mut sm = SimpleQueryStateMachine::new(&mut handler, "SELECT nope");
        sm.step(&mut buffers).unwrap();

        feed(
            &mut buffers,
            b'E',
            b"SERROR\0VERROR\0C42703\0Mcolumn \"nope\" does not exist\0\0".to_vec(),
        );
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::ReadMessage));
        feed(&mut buffers, b'Z', vec![b'I']);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::Finished));

        let err = sm.finish().unwrap_err();
        assert_eq!(err.sqlstate(), Some("42703"));
    }

    #[test]
    fn test_fatal_error_returned_immediately() {
        let mut handler = DropHandler::new();
        let mut buffers = BufferSet::new();
        let mut sm = SimpleQueryStateMachine::new(&mut handler, "SELECT 1");
        sm.step(&mut buffers).unwrap();

        feed(
            &mut buffers,
            b'E',
            b"SFATAL\0VFATAL\0C57P01\0Mterminating connection\0\0".to_vec(),
        );
        let err = sm.step(&mut buffers).unwrap_err();
        assert!(err.is_connection_broken());
    }

    #[test]
    fn test_column_mismatch_deferred_and_drained() {
        let mut result = QueryResult::new();
        let mut buffers = BufferSet::new();
        let mut sm = SimpleQueryStateMachine::new(&mut result, "SELECT a, b");
        sm.step(&mut buffers).unwrap();

        feed(&mut buffers, b'T', row_description(&["a", "b"]));
        sm.step(&mut buffers).unwrap();
        feed(&mut buffers, b'D', data_row(&["1"]));
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::ReadMessage));
        feed(&mut buffers, b'D', data_row(&["1", "2"]));
        sm.step(&mut buffers).unwrap();
        feed(&mut buffers, b'C', cstr("SELECT 2"));
        sm.step(&mut buffers).unwrap();
        feed(&mut buffers, b'Z', vec![b'I']);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::Finished));

        assert!(matches!(sm.finish(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_notice_is_async() {
        let mut handler = DropHandler::new();
        let mut buffers = BufferSet::new();
        let mut sm = SimpleQueryStateMachine::new(&mut handler, "DROP TABLE IF EXISTS t");
        sm.step(&mut buffers).unwrap();

        feed(
            &mut buffers,
            b'N',
            b"SNOTICE\0C00000\0Mtable \"t\" does not exist, skipping\0\0".to_vec(),
        );
        match sm.step(&mut buffers).unwrap() {
            Action::HandleAsyncMessageAndReadMessage(AsyncMessage::Notice(fields)) => {
                assert_eq!(fields.severity.as_deref(), Some("NOTICE"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_message_is_protocol_error() {
        let mut handler = DropHandler::new();
        let mut buffers = BufferSet::new();
        let mut sm = SimpleQueryStateMachine::new(&mut handler, "SELECT 1");
        sm.step(&mut buffers).unwrap();

        feed(&mut buffers, b'D', data_row(&["1"]));
        assert!(matches!(sm.step(&mut buffers), Err(Error::Protocol(_))));
    }
}
