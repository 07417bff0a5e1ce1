//! Asynchronous PostgreSQL connection.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::handler::{DropHandler, TextHandler};
use crate::opts::ConnectionParams;
use crate::protocol::backend::BackendKeyData;
use crate::protocol::frontend::write_terminate;
use crate::protocol::types::TransactionStatus;
use crate::query::{Query, QueryResult};
use crate::state::StateMachine;
use crate::state::action::{Action, AsyncMessage};
use crate::state::connection::{ConnectionState, ConnectionStateMachine, upsert_param};
use crate::state::simple_query::SimpleQueryStateMachine;

use super::stream::Stream;

/// Socket and buffers, owned by whoever holds the execution lock.
struct Session {
    stream: Option<Stream>,
    buffer_set: BufferSet,
}

/// Asynchronous PostgreSQL connection.
///
/// Methods take `&self`, so a connection can be shared. Exactly one
/// operation runs at a time: a second `query()` waits for the first one to
/// finish before any of its bytes are written.
pub struct Conn {
    session: Mutex<Session>,
    state: AtomicU8,
    backend_key: Option<BackendKeyData>,
    server_params: StdMutex<Vec<(String, String)>>,
    transaction_status: AtomicU8,
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("state", &self.state())
            .field("pid", &self.connection_id())
            .finish_non_exhaustive()
    }
}

impl Conn {
    /// Connect to a PostgreSQL server.
    ///
    /// A `host` starting with `/` is a directory holding the server's Unix
    /// socket. Anything else is a TCP host name or address.
    pub async fn connect(params: &ConnectionParams) -> Result<Self> {
        let stream = match params.unix_socket_path() {
            #[cfg(unix)]
            Some(path) => Stream::unix(UnixStream::connect(&path).await?),
            #[cfg(not(unix))]
            Some(path) => {
                return Err(Error::InvalidConfig(format!(
                    "Unix sockets are not available on this platform: {path}"
                )));
            }
            None => {
                let tcp = TcpStream::connect((params.host.as_str(), params.port)).await?;
                tcp.set_nodelay(true)?;
                Stream::tcp(tcp)
            }
        };
        debug!(host = %params.host, port = params.port, "connected");

        Self::connect_with_stream(stream, params.clone()).await
    }

    /// Run the handshake over an existing stream.
    pub async fn connect_with_stream(mut stream: Stream, params: ConnectionParams) -> Result<Self> {
        let mut buffer_set = BufferSet::new();
        let init_sql = params.init_sql.clone();
        let mut state_machine = ConnectionStateMachine::new(params);

        if let Err(e) = drive(&mut stream, &mut buffer_set, &mut state_machine, None).await {
            warn!(error = %e, "handshake failed");
            let _ = stream.shutdown().await;
            return Err(e);
        }

        let conn = Self {
            backend_key: state_machine.backend_key().copied(),
            server_params: StdMutex::new(state_machine.take_server_params()),
            transaction_status: AtomicU8::new(state_machine.transaction_status() as u8),
            state: AtomicU8::new(ConnectionState::Ready as u8),
            session: Mutex::new(Session {
                stream: Some(stream),
                buffer_set,
            }),
        };
        debug!(pid = conn.connection_id(), "handshake complete");

        if let Some(sql) = init_sql
            && let Err(e) = conn.query_drop(&sql).await
        {
            let _ = conn.close().await;
            return Err(e);
        }

        Ok(conn)
    }

    /// Current protocol state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// True once the connection has been closed or has failed.
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Get the backend key data for query cancellation.
    pub fn backend_key(&self) -> Option<&BackendKeyData> {
        self.backend_key.as_ref()
    }

    /// Get the connection ID (backend process ID).
    ///
    /// Returns 0 if the backend key data is not available.
    pub fn connection_id(&self) -> u32 {
        self.backend_key.as_ref().map_or(0, |k| k.process_id())
    }

    /// Snapshot of the server parameters reported so far.
    pub fn server_params(&self) -> Vec<(String, String)> {
        self.params_lock().clone()
    }

    /// Current value of one server parameter.
    pub fn server_param(&self, name: &str) -> Option<String> {
        self.params_lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    fn params_lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, String)>> {
        self.server_params
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Get the transaction status from the last ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        TransactionStatus::from_byte(self.transaction_status.load(Ordering::Acquire))
            .unwrap_or_default()
    }

    /// Check if currently in a transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction_status().in_transaction()
    }

    /// Run a query and collect its result.
    ///
    /// A server error fails the query but leaves the connection usable. A
    /// broken socket or malformed response closes the connection; that call
    /// returns the underlying error and later calls fail with
    /// [`Error::ConnectionClosed`].
    pub async fn query(&self, query: impl Into<Query>) -> Result<QueryResult> {
        let query = query.into();
        let sql = query.sql()?;
        let mut result = QueryResult::new();
        self.query_with_handler(&sql, &mut result).await?;
        Ok(result)
    }

    /// Run a query, streaming its results into `handler`.
    pub async fn query_with_handler<H: TextHandler>(&self, sql: &str, handler: &mut H) -> Result<()> {
        let mut session = self.session.lock().await;
        let Session { stream, buffer_set } = &mut *session;
        let Some(stream_ref) = stream.as_mut() else {
            return Err(Error::ConnectionClosed);
        };
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        self.set_state(ConnectionState::Querying);
        trace!(sql, "query start");

        // A future dropped mid-query leaves unread responses on the socket
        let mut guard = CloseOnDrop { conn: self, armed: true };
        let mut state_machine = SimpleQueryStateMachine::new(handler, sql);
        let outcome = drive(stream_ref, buffer_set, &mut state_machine, Some(self)).await;
        guard.armed = false;

        match outcome {
            Ok(()) => {
                self.transaction_status
                    .store(state_machine.transaction_status() as u8, Ordering::Release);
                self.set_state(ConnectionState::Ready);
                let result = state_machine.finish();
                trace!(ok = result.is_ok(), "query finish");
                result
            }
            Err(e) => {
                warn!(error = %e, pid = self.connection_id(), "connection failed");
                if let Some(mut dead) = stream.take() {
                    let _ = dead.shutdown().await;
                }
                self.set_state(ConnectionState::Closed);
                Err(e)
            }
        }
    }

    /// Execute a simple query and discard results.
    pub async fn query_drop(&self, sql: &str) -> Result<Option<u64>> {
        let mut handler = DropHandler::new();
        self.query_with_handler(sql, &mut handler).await?;
        Ok(handler.rows_affected())
    }

    /// Ping the server with an empty query to check connection aliveness.
    pub async fn ping(&self) -> Result<()> {
        self.query_drop("").await?;
        Ok(())
    }

    /// Close the connection gracefully.
    ///
    /// Waits for an in-flight query, sends Terminate and shuts the socket.
    /// Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let Session { stream, buffer_set } = &mut *session;
        self.set_state(ConnectionState::Closed);
        let Some(mut stream) = stream.take() else {
            return Ok(());
        };

        buffer_set.write_buffer.clear();
        write_terminate(&mut buffer_set.write_buffer);
        // The server may already be gone; Terminate is a courtesy
        if stream.write_all(&buffer_set.write_buffer).await.is_ok() {
            let _ = stream.flush().await;
        }
        let _ = stream.shutdown().await;
        debug!(pid = self.connection_id(), "connection closed");
        Ok(())
    }

    fn handle_async_message(&self, msg: &AsyncMessage) {
        match msg {
            AsyncMessage::Notice(fields) => warn!(notice = %fields, "server notice"),
            AsyncMessage::ParameterChanged { name, value } => {
                debug!(%name, %value, "server parameter changed");
                upsert_param(&mut self.params_lock(), name, value);
            }
            AsyncMessage::Notification {
                pid,
                channel,
                payload,
            } => debug!(pid, %channel, %payload, "notification"),
        }
    }
}

/// Marks the connection closed unless disarmed before drop.
struct CloseOnDrop<'a> {
    conn: &'a Conn,
    armed: bool,
}

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(pid = self.conn.connection_id(), "query cancelled mid-flight");
            self.conn.set_state(ConnectionState::Closed);
        }
    }
}

/// Drive a state machine to completion over `stream`.
async fn drive<S: StateMachine>(
    stream: &mut Stream,
    buffer_set: &mut BufferSet,
    state_machine: &mut S,
    conn: Option<&Conn>,
) -> Result<()> {
    loop {
        match state_machine.step(buffer_set)? {
            Action::ReadMessage => {
                stream.read_message(buffer_set).await?;
            }
            Action::WriteAndReadMessage => {
                stream.write_all(&buffer_set.write_buffer).await?;
                stream.flush().await?;
                stream.read_message(buffer_set).await?;
            }
            Action::HandleAsyncMessageAndReadMessage(async_msg) => {
                match conn {
                    Some(conn) => conn.handle_async_message(&async_msg),
                    None => {
                        if let AsyncMessage::Notice(fields) = &async_msg {
                            warn!(notice = %fields, "server notice during startup");
                        }
                    }
                }
                stream.read_message(buffer_set).await?;
            }
            Action::Finished => return Ok(()),
        }
    }
}
