//! Fan-in over several asynchronous streams.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

// `None` marks a source that ended during the current poll
type Source<T> = Option<Pin<Box<dyn Stream<Item = T> + Send>>>;

/// Merges any number of streams into one.
///
/// Yields items in whatever order the sources produce them. Polling starts
/// one source further along each time so a busy source cannot starve the
/// others. Sources may be added between polls, and the merged stream ends
/// once every source has ended.
pub struct MuxStream<T> {
    sources: Vec<Source<T>>,
    next: usize,
}

impl<T> Default for MuxStream<T> {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            next: 0,
        }
    }
}

impl<T> MuxStream<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source.
    pub fn add<S>(&mut self, source: S)
    where
        S: Stream<Item = T> + Send + 'static,
    {
        self.sources.push(Some(Box::pin(source)));
    }

    /// Number of sources that have not ended yet.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Wait for the next item from any source.
    ///
    /// Returns `None` once every source has ended.
    pub async fn next(&mut self) -> Option<T> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }
}

impl<T> Stream for MuxStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        let len = this.sources.len();
        let start = if this.next < len { this.next } else { 0 };
        let mut ended = false;
        let mut ready = None;

        for offset in 0..len {
            let mut index = start + offset;
            if index >= len {
                index -= len;
            }
            let Some(slot) = this.sources.get_mut(index) else {
                continue;
            };
            let Some(source) = slot.as_mut() else {
                continue;
            };
            match source.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    this.next = index + 1;
                    ready = Some(item);
                    break;
                }
                Poll::Ready(None) => {
                    *slot = None;
                    ended = true;
                }
                Poll::Pending => {}
            }
        }

        if ended {
            this.sources.retain(Option::is_some);
        }
        match ready {
            Some(item) => Poll::Ready(Some(item)),
            None if this.sources.is_empty() => Poll::Ready(None),
            None => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.sources.is_empty() {
            (0, Some(0))
        } else {
            (0, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    struct Items(VecDeque<u32>);

    impl Stream for Items {
        type Item = u32;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<u32>> {
            Poll::Ready(self.get_mut().0.pop_front())
        }
    }

    struct Channel(mpsc::UnboundedReceiver<u32>);

    impl Stream for Channel {
        type Item = u32;

        fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<u32>> {
            self.get_mut().0.poll_recv(cx)
        }
    }

    #[tokio::test]
    async fn test_yields_everything_then_ends() {
        let mut mux = MuxStream::new();
        mux.add(Items(VecDeque::from([1, 2, 3])));
        mux.add(Items(VecDeque::from([10, 20])));
        mux.add(Items(VecDeque::new()));

        let mut got = Vec::new();
        while let Some(item) = mux.next().await {
            got.push(item);
        }
        got.sort_unstable();
        assert_eq!(got, [1, 2, 3, 10, 20]);
        assert!(mux.is_empty());
        assert_eq!(mux.next().await, None);
    }

    #[tokio::test]
    async fn test_round_robin_start() {
        let mut mux = MuxStream::new();
        mux.add(Items(VecDeque::from([1, 2])));
        mux.add(Items(VecDeque::from([10, 20])));

        assert_eq!(mux.next().await, Some(1));
        assert_eq!(mux.next().await, Some(10));
        assert_eq!(mux.next().await, Some(2));
        assert_eq!(mux.next().await, Some(20));
        assert_eq!(mux.next().await, None);
    }

    #[tokio::test]
    async fn test_waits_for_slow_source() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut mux = MuxStream::new();
        mux.add(Channel(rx));
        mux.add(Items(VecDeque::from([1])));

        assert_eq!(mux.next().await, Some(1));
        let pending = tokio::time::timeout(Duration::from_millis(20), mux.next()).await;
        assert!(pending.is_err());

        tx.send(7).unwrap();
        drop(tx);
        assert_eq!(mux.next().await, Some(7));
        assert_eq!(mux.next().await, None);
    }

    #[tokio::test]
    async fn test_source_added_mid_iteration() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut mux = MuxStream::new();
        mux.add(Channel(rx));
        tx.send(1).unwrap();

        assert_eq!(mux.next().await, Some(1));
        mux.add(Items(VecDeque::from([2, 3])));
        drop(tx);

        let mut rest = Vec::new();
        while let Some(item) = mux.next().await {
            rest.push(item);
        }
        assert_eq!(rest, [2, 3]);
        assert_eq!(mux.len(), 0);
    }

    #[tokio::test]
    async fn test_empty_mux_ends_immediately() {
        let mut mux = MuxStream::<u32>::new();
        assert_eq!(mux.next().await, None);
    }
}
