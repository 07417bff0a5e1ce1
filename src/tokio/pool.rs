//! Asynchronous connection pool.

use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::opts::ConnectionParams;
use crate::query::{Query, QueryResult};

use super::Conn;
use super::deferred::{Creator, DeferredStack};

/// Pool sizing and acquisition options.
#[derive(Debug, Clone)]
pub struct PoolOpts {
    /// Upper bound on open connections. Must be at least 1.
    pub max_size: usize,
    /// Open one connection up front and grow on demand, instead of opening
    /// `max_size` immediately.
    pub lazy: bool,
    /// Fail `acquire()` with [`Error::PoolUnavailable`] after waiting this
    /// long. `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolOpts {
    fn default() -> Self {
        Self {
            max_size: 10,
            lazy: false,
            acquire_timeout: None,
        }
    }
}

type Registry = Arc<StdMutex<Vec<Arc<Conn>>>>;

fn registry_lock(registry: &Registry) -> MutexGuard<'_, Vec<Arc<Conn>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PoolInner {
    stack: DeferredStack<Arc<Conn>>,
    // Every open connection, idle or checked out
    registry: Registry,
    opts: PoolOpts,
    ended: Arc<AtomicBool>,
}

/// Bounded pool of [`Conn`]s.
///
/// Cheap to clone; clones share the same connections. When every connection
/// is checked out and the pool is at `max_size`, `acquire()` waits in FIFO
/// order for a release.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size())
            .field("available", &self.available())
            .field("max_size", &self.max_size())
            .finish()
    }
}

impl Pool {
    /// Create a pool connecting with `params`.
    pub async fn new(params: ConnectionParams, opts: PoolOpts) -> Result<Self> {
        Self::with_connector(
            move || {
                let params = params.clone();
                async move { Conn::connect(&params).await }
            },
            opts,
        )
        .await
    }

    /// Create a pool whose connections come from `connector`.
    pub async fn with_connector<F, Fut>(connector: F, opts: PoolOpts) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Conn>> + Send + 'static,
    {
        if opts.max_size == 0 {
            return Err(Error::InvalidConfig(
                "pool max_size must be at least 1".into(),
            ));
        }

        let registry: Registry = Arc::new(StdMutex::new(Vec::new()));
        let ended = Arc::new(AtomicBool::new(false));
        let connector = Arc::new(connector);

        let initial_count = if opts.lazy { 1 } else { opts.max_size };
        let mut initial = Vec::with_capacity(initial_count);
        for _ in 0..initial_count {
            match (*connector)().await {
                Ok(conn) => {
                    let conn = Arc::new(conn);
                    registry_lock(&registry).push(Arc::clone(&conn));
                    initial.push(conn);
                }
                Err(e) => {
                    for conn in &initial {
                        let _ = conn.close().await;
                    }
                    return Err(e);
                }
            }
        }

        let creator: Creator<Arc<Conn>> = {
            let registry = Arc::clone(&registry);
            let ended = Arc::clone(&ended);
            Box::new(move || {
                let connector = Arc::clone(&connector);
                let registry = Arc::clone(&registry);
                let ended = Arc::clone(&ended);
                Box::pin(async move {
                    if ended.load(Ordering::Acquire) {
                        return Err(Error::ConnectionClosed);
                    }
                    let conn = Arc::new((*connector)().await?);
                    {
                        let mut registry = registry_lock(&registry);
                        // end() snapshots the registry under this lock
                        if !ended.load(Ordering::Acquire) {
                            debug!(pid = conn.connection_id(), "pool connection created");
                            registry.push(Arc::clone(&conn));
                            return Ok(conn);
                        }
                    }
                    let _ = conn.close().await;
                    Err(Error::ConnectionClosed)
                })
            })
        };

        debug!(
            max_size = opts.max_size,
            lazy = opts.lazy,
            initial = initial.len(),
            "pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                stack: DeferredStack::new(opts.max_size, initial, Some(creator)),
                registry,
                opts,
                ended,
            }),
        })
    }

    /// Check out a connection.
    ///
    /// Reuses an idle connection, opens a new one while below `max_size`, or
    /// waits for a release. Closed connections found idle are evicted.
    pub async fn acquire(&self) -> Result<PooledConn> {
        loop {
            if self.inner.ended.load(Ordering::Acquire) {
                return Err(Error::ConnectionClosed);
            }
            let conn = match self.inner.opts.acquire_timeout {
                Some(timeout) => self.inner.stack.pop_timeout(timeout).await?,
                None => self.inner.stack.pop().await?,
            };
            if self.inner.ended.load(Ordering::Acquire) {
                self.inner.evict(&conn);
                let _ = conn.close().await;
                return Err(Error::ConnectionClosed);
            }
            if conn.is_closed() {
                self.inner.evict(&conn);
                continue;
            }
            return Ok(PooledConn {
                pool: Arc::clone(&self.inner),
                conn,
            });
        }
    }

    /// Acquire a connection, run `query`, and release the connection.
    pub async fn query(&self, query: impl Into<Query>) -> Result<QueryResult> {
        let conn = self.acquire().await?;
        let result = conn.query(query).await;
        conn.release();
        result
    }

    /// Close every connection the pool has opened, including checked-out ones.
    ///
    /// Later `acquire()` calls fail with [`Error::ConnectionClosed`].
    pub async fn end(&self) {
        let conns: Vec<Arc<Conn>> = {
            let registry = registry_lock(&self.inner.registry);
            self.inner.ended.store(true, Ordering::Release);
            registry.clone()
        };
        debug!(count = conns.len(), "pool ending");
        for conn in conns {
            let _ = conn.close().await;
        }
    }

    /// Number of open connections, idle or checked out.
    pub fn size(&self) -> usize {
        self.inner.stack.size()
    }

    /// Number of idle connections.
    pub fn available(&self) -> usize {
        self.inner.stack.available()
    }

    /// Number of callers waiting in `acquire()`.
    pub fn waiting(&self) -> usize {
        self.inner.stack.waiting()
    }

    pub fn max_size(&self) -> usize {
        self.inner.stack.max_size()
    }
}

impl PoolInner {
    fn evict(&self, conn: &Arc<Conn>) {
        registry_lock(&self.registry).retain(|c| !Arc::ptr_eq(c, conn));
        self.stack.discard();
        debug!(pid = conn.connection_id(), "pool connection evicted");
    }

    fn check_in(&self, conn: Arc<Conn>) {
        if conn.is_closed() || self.ended.load(Ordering::Acquire) {
            self.evict(&conn);
        } else {
            self.stack.push(conn);
        }
    }
}

/// A connection checked out of a [`Pool`].
///
/// Returned to the pool on [`release`](Self::release) or drop.
pub struct PooledConn {
    pool: Arc<PoolInner>,
    conn: Arc<Conn>,
}

impl PooledConn {
    /// Return the connection to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for PooledConn {
    type Target = Conn;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::fmt::Debug for PooledConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledConn").field(&self.conn).finish()
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        self.pool.check_in(Arc::clone(&self.conn));
    }
}
