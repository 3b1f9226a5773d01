//! Concatenation of an open-ended sequence of sub-streams.
//!
//! A run does not know up front how many steps it will take, so its output is
//! built by appending one sub-stream per step while the previous one is still
//! being read. The [`StitchableHandle`] appends, closes or terminates; the
//! [`StitchableStream`] is the single consumable sequence.
//!
//! The active sub-stream is owned by the reader and polled outside the shared
//! lock, so a sub-stream may call [`StitchableHandle::add_stream`] from inside
//! its own body.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use futures::Stream;

use crate::error::LlmError;
use crate::utils::lock;

/// Boxed sub-stream type.
pub type BoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

struct Shared<T> {
    queue: VecDeque<BoxedStream<T>>,
    closed: bool,
    terminated: bool,
    waker: Option<Waker>,
}

impl<T> Shared<T> {
    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// Producer side: append sub-streams, close or terminate.
pub struct StitchableHandle<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for StitchableHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Consumer side: the concatenated sequence.
pub struct StitchableStream<T> {
    shared: Arc<Mutex<Shared<T>>>,
    active: Option<BoxedStream<T>>,
}

/// Create an empty stitchable stream.
pub fn stitchable_stream<T>() -> (StitchableHandle<T>, StitchableStream<T>) {
    let shared = Arc::new(Mutex::new(Shared {
        queue: VecDeque::new(),
        closed: false,
        terminated: false,
        waker: None,
    }));
    (
        StitchableHandle {
            shared: shared.clone(),
        },
        StitchableStream {
            shared,
            active: None,
        },
    )
}

impl<T> StitchableHandle<T> {
    /// Queue a sub-stream after the ones already added.
    pub fn add_stream<S>(&self, stream: S) -> Result<(), LlmError>
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let mut shared = lock(&self.shared);
        if shared.closed || shared.terminated {
            return Err(LlmError::InternalError(
                "cannot add a stream after the outer stream is closed".into(),
            ));
        }
        shared.queue.push_back(Box::pin(stream));
        shared.wake();
        Ok(())
    }

    /// No more sub-streams will be added; the output ends once the queued
    /// ones are drained. Closing twice is a no-op.
    pub fn close(&self) {
        let mut shared = lock(&self.shared);
        if !shared.closed {
            shared.closed = true;
            shared.wake();
        }
    }

    /// Abandon the active sub-stream and everything queued, ending the output
    /// without an error.
    pub fn terminate(&self) {
        let dropped = {
            let mut shared = lock(&self.shared);
            shared.closed = true;
            shared.terminated = true;
            shared.wake();
            std::mem::take(&mut shared.queue)
        };
        drop(dropped);
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared).closed
    }
}

impl<T> Stream for StitchableStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        loop {
            {
                let mut shared = lock(&this.shared);
                if shared.terminated {
                    drop(shared);
                    this.active = None;
                    return Poll::Ready(None);
                }
                if this.active.is_none() {
                    match shared.queue.pop_front() {
                        Some(next) => this.active = Some(next),
                        None if shared.closed => return Poll::Ready(None),
                        None => {
                            shared.waker = Some(cx.waker().clone());
                            return Poll::Pending;
                        }
                    }
                }
                // terminate() must be able to wake a reader parked on the
                // active sub-stream.
                shared.waker = Some(cx.waker().clone());
            }

            let Some(active) = this.active.as_mut() else {
                continue;
            };
            match active.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    if lock(&this.shared).terminated {
                        this.active = None;
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(item));
                }
                Poll::Ready(None) => this.active = None,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T> Drop for StitchableStream<T> {
    fn drop(&mut self) {
        // The reader is gone: nothing queued will ever be read.
        let dropped = {
            let mut shared = lock(&self.shared);
            shared.closed = true;
            shared.terminated = true;
            shared.waker = None;
            std::mem::take(&mut shared.queue)
        };
        drop(dropped);
    }
}
