//! Async stream abstraction for tokio.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::framer::Framer;

/// Any byte stream a connection can run over.
///
/// Lets callers supply their own transport (an in-memory pipe, a TLS stream
/// set up elsewhere) instead of a plain socket.
pub trait Socket: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Socket for T {}

enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    Custom(Box<dyn Socket>),
}

/// Byte stream plus the framer that cuts it into messages.
pub struct Stream {
    transport: Transport,
    framer: Framer,
    chunk: Box<[u8]>,
}

impl Stream {
    fn new(transport: Transport) -> Self {
        Self {
            transport,
            framer: Framer::new(),
            chunk: vec![0; 8192].into_boxed_slice(),
        }
    }

    pub fn tcp(stream: TcpStream) -> Self {
        Self::new(Transport::Tcp(stream))
    }

    #[cfg(unix)]
    pub fn unix(stream: UnixStream) -> Self {
        Self::new(Transport::Unix(stream))
    }

    pub fn custom<S: Socket + 'static>(socket: S) -> Self {
        Self::new(Transport::Custom(Box::new(socket)))
    }

    async fn read_chunk(&mut self) -> std::io::Result<usize> {
        let buf = &mut self.chunk[..];
        match &mut self.transport {
            Transport::Tcp(s) => s.read(buf).await,
            #[cfg(unix)]
            Transport::Unix(s) => s.read(buf).await,
            Transport::Custom(s) => s.read(buf).await,
        }
    }

    /// Read one complete message into `buffer_set`.
    ///
    /// Suspends until the whole frame has arrived, however many socket reads
    /// that takes. End of stream is an I/O error.
    pub async fn read_message(&mut self, buffer_set: &mut BufferSet) -> Result<()> {
        loop {
            if let Some(message) = self.framer.next_message()? {
                buffer_set.type_byte = message.type_byte;
                buffer_set.read_buffer = message.body;
                return Ok(());
            }
            let n = self.read_chunk().await?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )));
            }
            self.framer.extend(&self.chunk[..n]);
        }
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match &mut self.transport {
            Transport::Tcp(s) => s.write_all(buf).await,
            #[cfg(unix)]
            Transport::Unix(s) => s.write_all(buf).await,
            Transport::Custom(s) => s.write_all(buf).await,
        }
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.transport {
            Transport::Tcp(s) => s.flush().await,
            #[cfg(unix)]
            Transport::Unix(s) => s.flush().await,
            Transport::Custom(s) => s.flush().await,
        }
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        match &mut self.transport {
            Transport::Tcp(s) => s.shutdown().await,
            #[cfg(unix)]
            Transport::Unix(s) => s.shutdown().await,
            Transport::Custom(s) => s.shutdown().await,
        }
    }
}
