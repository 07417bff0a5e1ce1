//! Asynchronous PostgreSQL client using Tokio.

mod conn;
mod deferred;
mod mux;
mod pool;
mod stream;

pub use conn::Conn;
pub use deferred::{BoxFuture, Creator, DeferredStack};
pub use mux::MuxStream;
pub use pool::{Pool, PoolOpts, PooledConn};
pub use stream::{Socket, Stream};
