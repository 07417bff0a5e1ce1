//! Bounded resource stack with lazy creation and FIFO waiters.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{Error, Result};

/// Boxed future returned by a [`Creator`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Asynchronous factory for new resources.
pub type Creator<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// What a queued waiter receives.
enum Handoff<T> {
    /// A released resource, delivered directly
    Resource(T),
    /// A freed creation slot; the waiter creates its own resource
    Create,
}

struct Inner<T> {
    free: Vec<T>,
    waiters: VecDeque<oneshot::Sender<Handoff<T>>>,
    size: usize,
}

/// A bounded pool of reusable `T`.
///
/// `pop()` reuses a free resource, creates one while fewer than `max_size`
/// exist, or queues. `push()` hands the resource straight to the earliest
/// queued waiter through that waiter's own channel, so a released resource
/// is never visible to anyone else in between.
pub struct DeferredStack<T> {
    inner: Mutex<Inner<T>>,
    max_size: usize,
    creator: Option<Creator<T>>,
}

impl<T: Send + 'static> DeferredStack<T> {
    /// Create a stack holding `initial` resources.
    ///
    /// The initial resources count as created. If there are more of them
    /// than `max_size`, the cap grows to fit.
    pub fn new(max_size: usize, initial: Vec<T>, creator: Option<Creator<T>>) -> Self {
        let size = initial.len();
        Self {
            inner: Mutex::new(Inner {
                free: initial,
                waiters: VecDeque::new(),
                size,
            }),
            max_size: max_size.max(size),
            creator,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a resource, waiting in FIFO order if none can be had.
    ///
    /// Cancel-safe: dropping the future returns anything already handed to it.
    pub async fn pop(&self) -> Result<T> {
        let receiver = {
            let mut inner = self.lock();
            if let Some(item) = inner.free.pop() {
                return Ok(item);
            }
            if inner.size < self.max_size && self.creator.is_some() {
                inner.size += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push_back(tx);
                trace!(waiting = inner.waiters.len(), "stack exhausted, queued");
                Some(rx)
            }
        };

        let Some(rx) = receiver else {
            return self.create().await;
        };

        let mut waiter = Waiter {
            stack: self,
            rx: Some(rx),
        };
        match waiter.recv().await {
            Some(Handoff::Resource(item)) => Ok(item),
            Some(Handoff::Create) => self.create().await,
            None => Err(Error::PoolUnavailable),
        }
    }

    /// Like [`pop`](Self::pop), failing with [`Error::PoolUnavailable`]
    /// after `timeout`.
    pub async fn pop_timeout(&self, timeout: Duration) -> Result<T> {
        tokio::time::timeout(timeout, self.pop())
            .await
            .map_err(|_elapsed| Error::PoolUnavailable)?
    }

    /// Create a resource in a slot already counted in `size`.
    async fn create(&self) -> Result<T> {
        let Some(creator) = &self.creator else {
            self.discard();
            return Err(Error::PoolUnavailable);
        };
        let mut slot = Slot {
            stack: self,
            armed: true,
        };
        let item = creator().await?;
        slot.armed = false;
        Ok(item)
    }

    /// Return a resource.
    ///
    /// The earliest live waiter receives it directly; otherwise it goes back
    /// on the free list.
    pub fn push(&self, item: T) {
        let mut inner = self.lock();
        let mut item = item;
        while let Some(tx) = inner.waiters.pop_front() {
            match tx.send(Handoff::Resource(item)) {
                Ok(()) => {
                    trace!("resource handed to waiter");
                    return;
                }
                // Waiter was cancelled; try the next one
                Err(Handoff::Resource(returned)) => item = returned,
                Err(Handoff::Create) => return,
            }
        }
        inner.free.push(item);
    }

    /// Forget one created resource, freeing its slot.
    ///
    /// With a creator configured, the earliest live waiter inherits the slot
    /// and creates a replacement. Otherwise the created count drops.
    pub fn discard(&self) {
        let mut inner = self.lock();
        if self.creator.is_some() {
            while let Some(tx) = inner.waiters.pop_front() {
                if tx.send(Handoff::Create).is_ok() {
                    trace!("creation slot handed to waiter");
                    return;
                }
            }
        }
        inner.size = inner.size.saturating_sub(1);
    }

    /// Number of resources created and not discarded.
    pub fn size(&self) -> usize {
        self.lock().size
    }

    /// Number of free resources.
    pub fn available(&self) -> usize {
        self.lock().free.len()
    }

    /// Number of callers queued in `pop()`.
    pub fn waiting(&self) -> usize {
        self.lock()
            .waiters
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Releases a reserved creation slot unless creation succeeded.
struct Slot<'a, T: Send + 'static> {
    stack: &'a DeferredStack<T>,
    armed: bool,
}

impl<T: Send + 'static> Drop for Slot<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.stack.discard();
        }
    }
}

/// A queued `pop()`. Gives back whatever it was handed if dropped early.
struct Waiter<'a, T: Send + 'static> {
    stack: &'a DeferredStack<T>,
    rx: Option<oneshot::Receiver<Handoff<T>>>,
}

impl<T: Send + 'static> Waiter<'_, T> {
    async fn recv(&mut self) -> Option<Handoff<T>> {
        let rx = self.rx.as_mut()?;
        let handoff = rx.await.ok();
        self.rx = None;
        handoff
    }
}

impl<T: Send + 'static> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        rx.close();
        match rx.try_recv() {
            Ok(Handoff::Resource(item)) => self.stack.push(item),
            Ok(Handoff::Create) => self.stack.discard(),
            Err(_) => {}
        }
    }
}
