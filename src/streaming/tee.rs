//! Non-destructive splitting of one stream into independent readers.
//!
//! All branches share one buffer. Each branch keeps an absolute cursor into
//! it; items are dropped from the front once every live branch has read them,
//! so memory is bounded by the lag of the slowest branch. Whichever branch
//! needs an item that is not buffered yet pulls the source; the others park
//! until it publishes. Dropping the last branch drops the source, which
//! cancels whatever produces it.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use futures::Stream;

use super::BoxedStream;
use crate::utils::lock;

struct TeeState<T> {
    source: Option<BoxedStream<T>>,
    pulling: bool,
    done: bool,
    buffer: VecDeque<T>,
    /// Absolute index of `buffer[0]`.
    offset: usize,
    cursors: HashMap<usize, usize>,
    next_branch: usize,
    waiters: Vec<Waker>,
}

impl<T> TeeState<T> {
    fn trim(&mut self) {
        let Some(min) = self.cursors.values().copied().min() else {
            self.buffer.clear();
            return;
        };
        while self.offset < min && self.buffer.pop_front().is_some() {
            self.offset += 1;
        }
    }

    fn wake_waiters(&mut self) {
        for waker in self.waiters.drain(..) {
            waker.wake();
        }
    }
}

/// One reader of a teed stream.
pub struct Tee<T> {
    state: Arc<Mutex<TeeState<T>>>,
    id: usize,
}

/// Wrap `source` into a first branch. More branches come from [`Tee::fork`].
pub fn tee<T, S>(source: S) -> Tee<T>
where
    S: Stream<Item = T> + Send + 'static,
{
    let mut cursors = HashMap::new();
    cursors.insert(0, 0);
    Tee {
        state: Arc::new(Mutex::new(TeeState {
            source: Some(Box::pin(source)),
            pulling: false,
            done: false,
            buffer: VecDeque::new(),
            offset: 0,
            cursors,
            next_branch: 1,
            waiters: Vec::new(),
        })),
        id: 0,
    }
}

impl<T> Tee<T> {
    /// A new branch positioned where this branch currently is.
    pub fn fork(&self) -> Tee<T> {
        let mut state = lock(&self.state);
        let id = state.next_branch;
        state.next_branch += 1;
        let cursor = state.cursors.get(&self.id).copied().unwrap_or(state.offset);
        state.cursors.insert(id, cursor);
        Tee {
            state: self.state.clone(),
            id,
        }
    }

    /// Items buffered for lagging branches.
    pub fn buffered_len(&self) -> usize {
        lock(&self.state).buffer.len()
    }
}

impl<T: Clone> Stream for Tee<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        let mut state = lock(&this.state);
        loop {
            let cursor = state.cursors.get(&this.id).copied().unwrap_or(state.offset);
            if cursor < state.offset + state.buffer.len() {
                let item = state.buffer[cursor - state.offset].clone();
                state.cursors.insert(this.id, cursor + 1);
                state.trim();
                return Poll::Ready(Some(item));
            }
            if state.done {
                return Poll::Ready(None);
            }
            if state.pulling {
                state.waiters.push(cx.waker().clone());
                return Poll::Pending;
            }
            let Some(mut source) = state.source.take() else {
                state.done = true;
                return Poll::Ready(None);
            };
            state.pulling = true;
            drop(state);

            let polled = source.as_mut().poll_next(cx);

            state = lock(&this.state);
            state.pulling = false;
            match polled {
                Poll::Ready(Some(item)) => {
                    state.source = Some(source);
                    state.buffer.push_back(item);
                    state.wake_waiters();
                }
                Poll::Ready(None) => {
                    state.done = true;
                    state.wake_waiters();
                    drop(state);
                    drop(source);
                    return Poll::Ready(None);
                }
                Poll::Pending => {
                    state.source = Some(source);
                    state.waiters.push(cx.waker().clone());
                    return Poll::Pending;
                }
            }
        }
    }
}

impl<T> Drop for Tee<T> {
    fn drop(&mut self) {
        let released = {
            let mut state = lock(&self.state);
            state.cursors.remove(&self.id);
            state.trim();
            // Another branch must take over the pull this one may have
            // registered with the source.
            state.wake_waiters();
            if state.cursors.is_empty() {
                state.source.take()
            } else {
                None
            }
        };
        drop(released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn every_branch_sees_the_full_sequence() {
        let first = tee(stream::iter(vec![1, 2, 3]));
        let second = first.fork();
        let third = first.fork();

        let (a, b, c) = tokio::join!(
            first.collect::<Vec<_>>(),
            second.collect::<Vec<_>>(),
            third.collect::<Vec<_>>()
        );
        assert_eq!(a, vec![1, 2, 3]);
        assert_eq!(b, a);
        assert_eq!(c, a);
    }

    #[tokio::test]
    async fn buffer_is_bounded_by_slowest_branch() {
        let mut fast = tee(stream::iter(0..10));
        let mut slow = fast.fork();

        for _ in 0..4 {
            fast.next().await;
        }
        assert_eq!(fast.buffered_len(), 4);
        for _ in 0..4 {
            slow.next().await;
        }
        assert_eq!(fast.buffered_len(), 0);

        drop(slow);
        for _ in 0..3 {
            fast.next().await;
        }
        assert_eq!(fast.buffered_len(), 0);
    }

    #[tokio::test]
    async fn fork_starts_at_the_parent_position() {
        let mut origin = tee(stream::iter(vec!["a", "b", "c"]));
        let fresh = origin.fork();
        assert_eq!(origin.next().await, Some("a"));
        let late = origin.fork();

        assert_eq!(fresh.collect::<Vec<_>>().await, vec!["a", "b", "c"]);
        assert_eq!(late.collect::<Vec<_>>().await, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn dropping_every_branch_releases_the_source() {
        struct Flag(Arc<AtomicBool>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let released = Arc::new(AtomicBool::new(false));
        let flag = Flag(released.clone());
        let source = async_stream::stream! {
            let _flag = flag;
            yield 1;
            futures::future::pending::<()>().await;
        };

        let mut first = tee(source);
        let second = first.fork();
        assert_eq!(first.next().await, Some(1));
        drop(first);
        assert!(!released.load(Ordering::SeqCst));
        drop(second);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn other_branch_takes_over_after_puller_drops() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<i32>();
        let source = tokio_stream_from(rx);
        let mut puller = tee(source);
        let mut parked = puller.fork();

        let first = tokio::time::timeout(std::time::Duration::from_millis(10), puller.next()).await;
        assert!(first.is_err());
        drop(puller);

        let reader = tokio::spawn(async move { parked.next().await });
        tx.send(5).unwrap();
        assert_eq!(reader.await.unwrap(), Some(5));
    }

    fn tokio_stream_from(
        mut rx: tokio::sync::mpsc::UnboundedReceiver<i32>,
    ) -> impl Stream<Item = i32> + Send {
        async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        }
    }

    proptest! {
        #[test]
        fn tee_fidelity(items in proptest::collection::vec(any::<u16>(), 0..64), branches in 1usize..5) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let expected = items.clone();
            let collected = rt.block_on(async move {
                let origin = tee(stream::iter(items));
                let readers: Vec<_> = (0..branches).map(|_| origin.fork()).collect();
                drop(origin);
                futures::future::join_all(readers.into_iter().map(|r| r.collect::<Vec<_>>())).await
            });
            for seq in collected {
                prop_assert_eq!(&seq, &expected);
            }
        }
    }
}
