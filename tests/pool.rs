//! Pool sizing, hand-off and eviction against mock backends.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use common::{ConnectFuture, pair, params, served_connector};
use lite_postgres::tokio::{Conn, Pool, PoolOpts};
use lite_postgres::{Error, Value};

async fn pool(max_size: usize, lazy: bool) -> (Pool, Arc<AtomicI32>) {
    let counter = Arc::new(AtomicI32::new(0));
    let pool = Pool::with_connector(
        served_connector(Arc::clone(&counter)),
        PoolOpts {
            max_size,
            lazy,
            acquire_timeout: None,
        },
    )
    .await
    .unwrap();
    (pool, counter)
}

#[tokio::test]
async fn test_eager_pool_opens_every_connection() {
    let (pool, counter) = pool(3, false).await;
    assert_eq!(pool.size(), 3);
    assert_eq!(pool.available(), 3);
    assert_eq!(pool.max_size(), 3);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_lazy_pool_grows_to_cap() {
    let (pool, counter) = pool(3, true).await;
    assert_eq!(pool.size(), 1);
    assert_eq!(pool.available(), 1);

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let c = pool.acquire().await.unwrap();
    assert_eq!(pool.size(), 3);
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    let fourth = tokio::time::timeout(Duration::from_millis(30), pool.acquire()).await;
    assert!(fourth.is_err());
    assert_eq!(pool.size(), 3);

    drop((a, b, c));
    assert_eq!(pool.available(), 3);
}

#[tokio::test]
async fn test_zero_max_size_is_rejected() {
    let counter = Arc::new(AtomicI32::new(0));
    let err = Pool::with_connector(
        served_connector(Arc::clone(&counter)),
        PoolOpts {
            max_size: 0,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)), "{err:?}");
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_waiters_served_in_order() {
    let (pool, _) = pool(1, false).await;
    let held = pool.acquire().await.unwrap();
    let held_id = held.connection_id();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    for waiter in 0..2 {
        let pool = pool.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let conn = pool.acquire().await.unwrap();
            tx.send((waiter, conn.connection_id())).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            conn.release();
        });
        tokio::task::yield_now().await;
    }
    assert_eq!(pool.waiting(), 2);

    held.release();
    assert_eq!(rx.recv().await.unwrap(), (0, held_id));
    assert_eq!(rx.recv().await.unwrap(), (1, held_id));
    assert_eq!(pool.size(), 1);
}

#[tokio::test]
async fn test_query_releases_connection() {
    let (pool, _) = pool(1, false).await;

    let result = pool.query("SELECT 1").await.unwrap();
    assert_eq!(result.rows()[0][0], Value::Int4(1));
    assert_eq!(pool.available(), 1);

    let err = pool.query("FAIL").await.unwrap_err();
    assert!(matches!(err, Error::Server(_)), "{err:?}");
    assert_eq!(pool.available(), 1);

    // Still the same, still usable connection
    let result = pool.query("SELECT 1").await.unwrap();
    assert_eq!(result.rows()[0][0], Value::Int4(1));
}

#[tokio::test]
async fn test_closed_connection_is_evicted() {
    let (pool, counter) = pool(2, true).await;
    let conn = pool.acquire().await.unwrap();
    let first_id = conn.connection_id();
    conn.close().await.unwrap();
    conn.release();

    assert_eq!(pool.size(), 0);
    assert_eq!(pool.available(), 0);

    let fresh = pool.acquire().await.unwrap();
    assert_ne!(fresh.connection_id(), first_id);
    assert!(!fresh.is_closed());
    assert_eq!(pool.size(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_eviction_hands_slot_to_waiter() {
    let (pool, _) = pool(1, false).await;
    let held = pool.acquire().await.unwrap();

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire().await.map(|conn| conn.connection_id()) }
    });
    tokio::task::yield_now().await;
    assert_eq!(pool.waiting(), 1);

    held.close().await.unwrap();
    held.release();

    let id = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(id, 2);
    assert_eq!(pool.size(), 1);
}

#[tokio::test]
async fn test_acquire_timeout() {
    let counter = Arc::new(AtomicI32::new(0));
    let pool = Pool::with_connector(
        served_connector(counter),
        PoolOpts {
            max_size: 1,
            lazy: false,
            acquire_timeout: Some(Duration::from_millis(20)),
        },
    )
    .await
    .unwrap();

    let _held = pool.acquire().await.unwrap();
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::PoolUnavailable), "{err:?}");
    assert_eq!(pool.waiting(), 0);
}

#[tokio::test]
async fn test_end_closes_checked_out_connections() {
    let (pool, _) = pool(2, false).await;
    let held = pool.acquire().await.unwrap();

    pool.end().await;

    assert!(held.is_closed());
    assert!(matches!(pool.acquire().await, Err(Error::ConnectionClosed)));
    drop(held);
    assert!(matches!(pool.query("SELECT 1").await, Err(Error::ConnectionClosed)));
}

#[tokio::test]
async fn test_failed_connect_fails_pool_creation() {
    let err = Pool::with_connector(
        || async { Err::<Conn, _>(Error::ConnectionClosed) },
        PoolOpts {
            max_size: 2,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
}

#[tokio::test]
async fn test_connection_created_during_end_is_closed() {
    let counter = Arc::new(AtomicI32::new(0));
    let slow = Arc::new(AtomicBool::new(false));
    let connect = served_connector(Arc::clone(&counter));
    let pool = Pool::with_connector(
        {
            let slow = Arc::clone(&slow);
            move || -> ConnectFuture {
                let delay = slow.load(Ordering::SeqCst);
                let connecting = connect();
                Box::pin(async move {
                    if delay {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    connecting.await
                })
            }
        },
        PoolOpts {
            max_size: 2,
            lazy: true,
            acquire_timeout: None,
        },
    )
    .await
    .unwrap();
    slow.store(true, Ordering::SeqCst);

    let held = pool.acquire().await.unwrap();
    let racing = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire().await.map(|conn| conn.connection_id()) }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    pool.end().await;

    let result = tokio::time::timeout(Duration::from_secs(1), racing)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(Error::ConnectionClosed)), "{result:?}");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(held.is_closed());
    drop(held);
    assert_eq!(pool.size(), 0);
}

#[tokio::test]
async fn test_cancelled_query_evicts_connection() {
    let counter = Arc::new(AtomicI32::new(0));
    let pool = Pool::with_connector(
        {
            let counter = Arc::clone(&counter);
            move || -> ConnectFuture {
                let id = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Box::pin(async move {
                    let (stream, mut backend) = pair();
                    tokio::spawn(async move {
                        backend.handshake(id as u32).await;
                        if id == 1 {
                            // Swallow queries without answering
                            while backend.read_message().await.is_some() {}
                        } else {
                            backend.serve(id).await;
                        }
                    });
                    Conn::connect_with_stream(stream, params()).await
                })
            }
        },
        PoolOpts {
            max_size: 1,
            lazy: true,
            acquire_timeout: None,
        },
    )
    .await
    .unwrap();

    let stalled = tokio::time::timeout(Duration::from_millis(30), pool.query("SELECT 1")).await;
    assert!(stalled.is_err());
    assert_eq!(pool.size(), 0);
    assert_eq!(pool.available(), 0);

    let fresh = pool.acquire().await.unwrap();
    assert_eq!(fresh.connection_id(), 2);
    assert!(!fresh.is_closed());
    let result = fresh.query("SELECT 1").await.unwrap();
    assert_eq!(result.rows()[0][0], Value::Int4(2));
    drop(fresh);
    assert_eq!(pool.size(), 1);
    assert_eq!(pool.available(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}
