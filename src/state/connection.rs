//! Connection startup and authentication state machine.

use tracing::debug;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::opts::ConnectionParams;
use crate::protocol::backend::auth::method_name;
use crate::protocol::backend::{
    AuthenticationMessage, BackendKeyData, ErrorResponse, ReadyForQuery, msg_type,
};
use crate::protocol::frontend::{md5_password, write_password, write_startup};
use crate::protocol::types::TransactionStatus;

use super::StateMachine;
use super::action::{Action, AsyncMessage};

/// Lifecycle of a connection as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Socket not yet talking to the server
    Disconnected = 0,
    /// Startup packet sent, waiting for the authentication request
    StartupSent = 1,
    /// Authentication exchange in progress
    Authenticating = 2,
    /// Idle and ready for a query
    Ready = 3,
    /// A query is in flight
    Querying = 4,
    /// Terminal. Reached by `close()` or a fatal error
    Closed = 5,
}

impl ConnectionState {
    /// Inverse of `state as u8`. Unknown values map to `Closed`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::StartupSent,
            2 => ConnectionState::Authenticating,
            3 => ConnectionState::Ready,
            4 => ConnectionState::Querying,
            _ => ConnectionState::Closed,
        }
    }
}

/// Internal handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingAuth,
    WaitingAuthResult,
    WaitingReady,
    Ready,
    Failed,
}

/// Connection startup state machine.
///
/// Sends the startup packet, answers the server's password request and
/// collects ParameterStatus and BackendKeyData until ReadyForQuery.
pub struct ConnectionStateMachine {
    state: State,
    params: ConnectionParams,
    backend_key: Option<BackendKeyData>,
    server_params: Vec<(String, String)>,
    transaction_status: TransactionStatus,
}

impl ConnectionStateMachine {
    /// Create a new connection state machine.
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            state: State::Initial,
            params,
            backend_key: None,
            server_params: Vec::new(),
            transaction_status: TransactionStatus::Idle,
        }
    }

    /// The externally visible state matching the handshake progress.
    pub fn connection_state(&self) -> ConnectionState {
        match self.state {
            State::Initial => ConnectionState::Disconnected,
            State::WaitingAuth => ConnectionState::StartupSent,
            State::WaitingAuthResult | State::WaitingReady => ConnectionState::Authenticating,
            State::Ready => ConnectionState::Ready,
            State::Failed => ConnectionState::Closed,
        }
    }

    /// Get the backend key data (for cancellation).
    pub fn backend_key(&self) -> Option<&BackendKeyData> {
        self.backend_key.as_ref()
    }

    /// Get server parameters.
    pub fn server_params(&self) -> &[(String, String)] {
        &self.server_params
    }

    /// Take server parameters, leaving an empty list behind.
    pub fn take_server_params(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.server_params)
    }

    fn password(&self) -> Result<&str> {
        self.params
            .password
            .as_deref()
            .ok_or_else(|| Error::Auth("Password required but not provided".into()))
    }

    fn handle_auth_message(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let type_byte = buffer_set.type_byte;
        if type_byte != msg_type::AUTHENTICATION {
            return Err(Error::Protocol(format!(
                "Expected Authentication message, got '{}'",
                type_byte as char
            )));
        }

        let auth = AuthenticationMessage::parse(&buffer_set.read_buffer)?;

        match auth {
            AuthenticationMessage::Ok => {
                debug!("server accepted connection without a password");
                self.state = State::WaitingReady;
                Ok(Action::ReadMessage)
            }
            AuthenticationMessage::CleartextPassword => {
                debug!("server requested cleartext password");
                let password = self.password()?;
                buffer_set.write_buffer.clear();
                write_password(&mut buffer_set.write_buffer, password);
                self.state = State::WaitingAuthResult;
                Ok(Action::WriteAndReadMessage)
            }
            AuthenticationMessage::Md5Password { salt } => {
                debug!("server requested md5 password");
                let hashed = md5_password(&self.params.user, self.password()?, &salt);
                buffer_set.write_buffer.clear();
                write_password(&mut buffer_set.write_buffer, &hashed);
                self.state = State::WaitingAuthResult;
                Ok(Action::WriteAndReadMessage)
            }
            AuthenticationMessage::Unsupported { code } => Err(Error::UnsupportedAuthMethod(
                format!("{} (code {})", method_name(code), code),
            )),
        }
    }

    fn handle_auth_result(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let type_byte = buffer_set.type_byte;
        if type_byte != msg_type::AUTHENTICATION {
            return Err(Error::Protocol(format!(
                "Expected AuthenticationOk, got '{}'",
                type_byte as char
            )));
        }

        match AuthenticationMessage::parse(&buffer_set.read_buffer)? {
            AuthenticationMessage::Ok => {
                self.state = State::WaitingReady;
                Ok(Action::ReadMessage)
            }
            other => Err(Error::Auth(format!("Unexpected auth result: {:?}", other))),
        }
    }

    fn handle_ready_message(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let type_byte = buffer_set.type_byte;
        let payload = &buffer_set.read_buffer;

        match type_byte {
            msg_type::BACKEND_KEY_DATA => {
                let key = BackendKeyData::parse(payload)?;
                self.backend_key = Some(*key);
                Ok(Action::ReadMessage)
            }
            msg_type::READY_FOR_QUERY => {
                let ready = ReadyForQuery::parse(payload)?;
                self.transaction_status = ready.transaction_status().unwrap_or_default();
                self.state = State::Ready;
                Ok(Action::Finished)
            }
            _ => Err(Error::Protocol(format!(
                "Unexpected message during startup: '{}'",
                type_byte as char
            ))),
        }
    }

    fn step_inner(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        if self.state == State::Initial {
            buffer_set.write_buffer.clear();
            write_startup(&mut buffer_set.write_buffer, &self.params);
            self.state = State::WaitingAuth;
            return Ok(Action::WriteAndReadMessage);
        }

        let type_byte = buffer_set.type_byte;

        match AsyncMessage::parse(type_byte, &buffer_set.read_buffer)? {
            // Informational during startup; cached without a callback
            Some(AsyncMessage::ParameterChanged { name, value }) => {
                upsert_param(&mut self.server_params, &name, &value);
                return Ok(Action::ReadMessage);
            }
            Some(async_msg) => return Ok(Action::HandleAsyncMessageAndReadMessage(async_msg)),
            None => {}
        }

        if type_byte == msg_type::ERROR_RESPONSE {
            let error = ErrorResponse::parse(&buffer_set.read_buffer)?;
            return Err(match self.state {
                State::WaitingAuth | State::WaitingAuthResult => error.into_auth_error(),
                _ => error.into_error(),
            });
        }

        match self.state {
            State::WaitingAuth => self.handle_auth_message(buffer_set),
            State::WaitingAuthResult => self.handle_auth_result(buffer_set),
            State::WaitingReady => self.handle_ready_message(buffer_set),
            State::Initial | State::Ready | State::Failed => Err(Error::Protocol(format!(
                "Unexpected message in state {:?}",
                self.state
            ))),
        }
    }
}

impl StateMachine for ConnectionStateMachine {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let result = self.step_inner(buffer_set);
        if result.is_err() {
            self.state = State::Failed;
        }
        result
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }
}

/// Insert or replace a cached server parameter.
pub(crate) fn upsert_param(params: &mut Vec<(String, String)>, name: &str, value: &str) {
    if let Some(entry) = params.iter_mut().find(|(n, _)| n == name) {
        entry.1 = value.to_string();
    } else {
        params.push((name.to_string(), value.to_string()));
    }
}
