//! A small asynchronous PostgreSQL client.
//!
//! # Features
//!
//! - **Sans-I/O state machines**: protocol logic is separated from I/O
//! - **Single-flight connections**: one query at a time per connection, queued
//!   callers wait their turn
//! - **Bounded pool**: lazy or eager, FIFO waiters, direct hand-off on release
//! - **Fan-in**: merge independent asynchronous streams
//!
//! # Example
//!
//! ```no_run
//! use lite_postgres::tokio::{Pool, PoolOpts};
//! use lite_postgres::{ConnectionConfig, ConnectionParams, Query};
//!
//! # async fn run() -> lite_postgres::Result<()> {
//! let params = ConnectionParams::resolve(&ConnectionConfig {
//!     database: Some("mydb".into()),
//!     user: Some("postgres".into()),
//!     ..Default::default()
//! })?;
//! let pool = Pool::new(params, PoolOpts::default()).await?;
//!
//! let result = pool
//!     .query(Query::with_params("SELECT $1::int4 AS num", (42,)))
//!     .await?;
//! println!("{:?}", result.rows());
//!
//! pool.end().await;
//! # Ok(())
//! # }
//! ```

pub mod buffer_set;
pub mod error;
pub mod handler;
pub mod opts;
pub mod protocol;
pub mod query;
pub mod row;
pub mod state;
pub mod types;
pub mod value;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use buffer_set::BufferSet;
pub use error::{Error, ErrorFields, Result};
pub use handler::{DropHandler, TextHandler};
pub use opts::{ConnectionConfig, ConnectionParams};
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use query::{Query, QueryResult};
pub use row::{Column, RowDescription};
pub use state::ConnectionState;
pub use types::{EncodedArg, ToParams, ToWireValue};
pub use value::{PgType, Value};
