//! In-process mock PostgreSQL backend over `tokio::io::duplex`.

#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use lite_postgres::tokio::{Conn, Stream};
use lite_postgres::{ConnectionConfig, ConnectionParams, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

pub const INT4_OID: u32 = 23;
pub const TEXT_OID: u32 = 25;

pub fn params() -> ConnectionParams {
    params_with(ConnectionConfig::default())
}

pub fn params_with(config: ConnectionConfig) -> ConnectionParams {
    let config = ConnectionConfig {
        database: config.database.or_else(|| Some("test".into())),
        user: config.user.or_else(|| Some("postgres".into())),
        ..config
    };
    ConnectionParams::resolve_with(&config, |_| None).unwrap()
}

/// Server side of a mocked connection.
pub struct Backend {
    io: DuplexStream,
}

/// A client stream wired to a fresh backend.
pub fn pair() -> (Stream, Backend) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    (Stream::custom(client), Backend { io: server })
}

impl Backend {
    /// Read the untyped startup message, returning its key/value pairs.
    pub async fn read_startup(&mut self) -> Vec<(String, String)> {
        let len = self.io.read_u32().await.unwrap() as usize;
        let mut body = vec![0; len - 4];
        self.io.read_exact(&mut body).await.unwrap();
        assert_eq!(&body[..4], &196_608_u32.to_be_bytes()[..]);

        let mut pairs = Vec::new();
        let mut parts = body[4..].split(|b| *b == 0).map(|s| String::from_utf8(s.to_vec()).unwrap());
        while let (Some(key), Some(value)) = (parts.next(), parts.next()) {
            if key.is_empty() {
                break;
            }
            pairs.push((key, value));
        }
        pairs
    }

    /// Read one typed message. `None` at end of stream.
    pub async fn read_message(&mut self) -> Option<(u8, Vec<u8>)> {
        let type_byte = self.io.read_u8().await.ok()?;
        let len = self.io.read_u32().await.ok()? as usize;
        let mut body = vec![0; len - 4];
        self.io.read_exact(&mut body).await.ok()?;
        Some((type_byte, body))
    }

    /// Read a Query message and return its SQL text.
    pub async fn expect_query(&mut self) -> String {
        let (type_byte, body) = self.read_message().await.unwrap();
        assert_eq!(type_byte, b'Q');
        cstr(&body)
    }

    pub async fn send(&mut self, type_byte: u8, body: &[u8]) {
        let mut frame = Vec::with_capacity(body.len() + 5);
        frame.push(type_byte);
        frame.extend_from_slice(&(body.len() as u32 + 4).to_be_bytes());
        frame.extend_from_slice(body);
        self.io.write_all(&frame).await.unwrap();
    }

    pub async fn auth_request(&mut self, code: u32, extra: &[u8]) {
        let mut body = code.to_be_bytes().to_vec();
        body.extend_from_slice(extra);
        self.send(b'R', &body).await;
    }

    pub async fn parameter_status(&mut self, name: &str, value: &str) {
        let mut body = Vec::new();
        put_cstr(&mut body, name);
        put_cstr(&mut body, value);
        self.send(b'S', &body).await;
    }

    pub async fn backend_key(&mut self, pid: u32, secret: u32) {
        let mut body = pid.to_be_bytes().to_vec();
        body.extend_from_slice(&secret.to_be_bytes());
        self.send(b'K', &body).await;
    }

    pub async fn ready(&mut self, status: u8) {
        self.send(b'Z', &[status]).await;
    }

    /// AuthenticationOk through the first ReadyForQuery.
    pub async fn finish_startup(&mut self, pid: u32) {
        self.auth_request(0, &[]).await;
        self.parameter_status("server_version", "16.0").await;
        self.parameter_status("client_encoding", "UTF8").await;
        self.backend_key(pid, 0xDEAD_BEEF).await;
        self.ready(b'I').await;
    }

    /// Accept a trust-auth handshake.
    pub async fn handshake(&mut self, pid: u32) {
        self.read_startup().await;
        self.finish_startup(pid).await;
    }

    pub async fn row_description(&mut self, columns: &[(&str, u32)]) {
        let mut body = (columns.len() as u16).to_be_bytes().to_vec();
        for (name, type_oid) in columns {
            put_cstr(&mut body, name);
            body.extend_from_slice(&0_u32.to_be_bytes()); // table oid
            body.extend_from_slice(&0_i16.to_be_bytes()); // column attr
            body.extend_from_slice(&type_oid.to_be_bytes());
            body.extend_from_slice(&(-1_i16).to_be_bytes()); // type size
            body.extend_from_slice(&(-1_i32).to_be_bytes()); // type modifier
            body.extend_from_slice(&0_i16.to_be_bytes()); // text format
        }
        self.send(b'T', &body).await;
    }

    pub async fn data_row(&mut self, values: &[Option<&str>]) {
        let mut body = (values.len() as u16).to_be_bytes().to_vec();
        for value in values {
            match value {
                Some(v) => {
                    body.extend_from_slice(&(v.len() as i32).to_be_bytes());
                    body.extend_from_slice(v.as_bytes());
                }
                None => body.extend_from_slice(&(-1_i32).to_be_bytes()),
            }
        }
        self.send(b'D', &body).await;
    }

    pub async fn command_complete(&mut self, tag: &str) {
        let mut body = Vec::new();
        put_cstr(&mut body, tag);
        self.send(b'C', &body).await;
    }

    pub async fn error(&mut self, severity: &str, code: &str, message: &str) {
        let mut body = Vec::new();
        for (field, value) in [(b'S', severity), (b'V', severity), (b'C', code), (b'M', message)] {
            body.push(field);
            put_cstr(&mut body, value);
        }
        body.push(0);
        self.send(b'E', &body).await;
    }

    pub async fn notice(&mut self, message: &str) {
        let mut body = Vec::new();
        for (field, value) in [(b'S', "NOTICE"), (b'C', "00000"), (b'M', message)] {
            body.push(field);
            put_cstr(&mut body, value);
        }
        body.push(0);
        self.send(b'N', &body).await;
    }

    /// Answer queries until the client terminates or hangs up.
    ///
    /// `SELECT ...` returns one int4 row holding `id`, `FAIL` raises an
    /// ERROR, the empty string gets EmptyQueryResponse, and anything else
    /// completes with no rows. Returns the SQL texts received.
    pub async fn serve(mut self, id: i32) -> Vec<String> {
        let mut seen = Vec::new();
        while let Some((type_byte, body)) = self.read_message().await {
            if type_byte == b'X' {
                break;
            }
            assert_eq!(type_byte, b'Q');
            let sql = cstr(&body);
            if sql.is_empty() {
                self.send(b'I', &[]).await;
            } else if sql == "FAIL" {
                self.error("ERROR", "42601", "syntax error").await;
            } else if sql.starts_with("SELECT") {
                self.row_description(&[("id", INT4_OID)]).await;
                self.data_row(&[Some(&id.to_string())]).await;
                self.command_complete("SELECT 1").await;
            } else {
                self.command_complete("SET").await;
            }
            self.ready(b'I').await;
            seen.push(sql);
        }
        seen
    }
}

/// Connect a client to a backend that accepts the handshake and then serves.
pub async fn connect_served(id: i32) -> (Conn, JoinHandle<Vec<String>>) {
    let (stream, mut backend) = pair();
    let server = tokio::spawn(async move {
        backend.handshake(id as u32).await;
        backend.serve(id).await
    });
    let conn = Conn::connect_with_stream(stream, params()).await.unwrap();
    (conn, server)
}

pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<Conn>> + Send>>;

/// Connector for pools: each call spawns a fresh served backend with the
/// next id from `counter`.
pub fn served_connector(counter: Arc<AtomicI32>) -> impl Fn() -> ConnectFuture + Send + Sync + 'static {
    move || -> ConnectFuture {
        let id = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move {
            let (stream, mut backend) = pair();
            tokio::spawn(async move {
                backend.handshake(id as u32).await;
                backend.serve(id).await
            });
            Conn::connect_with_stream(stream, params()).await
        })
    }
}

pub fn cstr(body: &[u8]) -> String {
    let end = body.iter().position(|b| *b == 0).unwrap_or(body.len());
    String::from_utf8(body[..end].to_vec()).unwrap()
}

fn put_cstr(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}
