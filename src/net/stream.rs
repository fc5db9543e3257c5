//! Pull-based byte stream shared by both transport bridges.
//!
//! [`ByteStream::channel`] hands out a `(Producer, ByteStream)` pair. The bridge that is active
//! for a response owns the [`Producer`] and pushes chunks as the transport delivers them; the
//! consumer drains the [`ByteStream`] at its own pace through [`futures::Stream`].
//!
//! Backpressure works like a readable stream with a high-water mark: a push reports `false`
//! once the buffered byte count reaches the mark. A writer that must wait parks on a single
//! resume slot, and the next poll that finds the buffer below the mark (a "pull") resolves it.
//! Destroying the stream drops the slot so the parked writer sees an error instead of hanging.

use crate::config::BridgeConfig;
use crate::errors::ResponseError;
use crate::event::{ResponseEvent, ResponseId, ResponseState};
use crate::runtime::Spawner;
use bytes::Bytes;
use futures::{FutureExt, Stream};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use tokio::sync::{broadcast, oneshot};

/// Result of [`Producer::push_or_park`]
#[derive(Debug)]
pub enum PushOutcome {
    /// Chunk buffered, keep going
    Accepted,
    /// Chunk buffered, but the buffer is full. Wait on the receiver before producing more; it
    /// errors when the stream is destroyed.
    Parked(oneshot::Receiver<()>),
    /// Stream already ended or destroyed, chunk dropped
    Rejected,
}

struct Inner {
    state: ResponseState,
    buffer: VecDeque<Bytes>,
    buffered: usize,
    high_water_mark: usize,
    /// End sentinel pushed (or the transport failed)
    ended: bool,
    /// `End` already emitted to listeners
    end_emitted: bool,
    destroyed: bool,
    failed: bool,
    /// Failure waiting to be yielded after the buffered chunks
    error: Option<ResponseError>,
    /// Resolved by the next pull
    resume: Option<oneshot::Sender<()>>,
    waker: Option<Waker>,
}

impl Inner {
    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }

    fn below_high_water(&self) -> bool {
        self.buffered < self.high_water_mark
    }

    fn enqueue(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.buffered += chunk.len();
        self.buffer.push_back(chunk);
    }

    /// Consumer is ready for more: resume a parked writer if there is room.
    fn pull(&mut self) {
        if !self.below_high_water() {
            return;
        }
        if let Some(resume) = self.resume.take() {
            let _ = resume.send(());
        }
    }

    fn set_state(&mut self, to: ResponseState) -> bool {
        match self.state.transition(to) {
            Some(next) => {
                self.state = next;
                true
            }
            None => false,
        }
    }
}

struct Shared {
    id: ResponseId,
    inner: Mutex<Inner>,
    event_tx: broadcast::Sender<ResponseEvent>,
    spawner: Arc<dyn Spawner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves `Inner` consistent, so a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ResponseEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn destroy(&self) {
        let mut inner = self.lock();
        if inner.destroyed || inner.end_emitted || inner.state == ResponseState::Closed {
            return;
        }

        inner.destroyed = true;
        // A failed stream keeps reporting the failure
        if !inner.failed {
            inner.state = ResponseState::Destroyed;
        }
        inner.buffer.clear();
        inner.buffered = 0;
        inner.error = None;
        // Dropping the sender rejects a parked writer
        inner.resume = None;
        inner.wake();

        log::debug!("Response[{}]: destroyed by consumer", self.id);
    }

    /// Consumer reached the end: emit `End` now and `Close` on a later turn.
    fn finish(self: &Arc<Self>) {
        self.emit(ResponseEvent::End { id: self.id });

        let shared = self.clone();
        self.spawner.spawn(
            async move {
                let closed = shared.lock().set_state(ResponseState::Closed);
                if closed {
                    shared.emit(ResponseEvent::Close { id: shared.id });
                }
            }
            .boxed(),
        );
    }
}

/// Producer half, owned by the active bridge.
#[derive(Clone)]
pub struct Producer {
    shared: Arc<Shared>,
}

/// Consumer half.
pub struct ByteStream {
    shared: Arc<Shared>,
}

impl ByteStream {
    /// Create a fresh `(producer, stream)` pair in the `Unstarted` state.
    pub fn channel(
        id: ResponseId,
        config: &BridgeConfig,
        event_tx: broadcast::Sender<ResponseEvent>,
        spawner: Arc<dyn Spawner>,
    ) -> (Producer, ByteStream) {
        let shared = Arc::new(Shared {
            id,
            inner: Mutex::new(Inner {
                state: ResponseState::Unstarted,
                buffer: VecDeque::new(),
                buffered: 0,
                high_water_mark: config.high_water_mark.max(1),
                ended: false,
                end_emitted: false,
                destroyed: false,
                failed: false,
                error: None,
                resume: None,
                waker: None,
            }),
            event_tx,
            spawner,
        });

        (
            Producer {
                shared: shared.clone(),
            },
            ByteStream { shared },
        )
    }

    /// Abort consumption. Buffered bytes are dropped, a parked writer is rejected and every
    /// later push is ignored. Does not emit end-of-data.
    pub fn destroy(&self) {
        self.shared.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.lock().destroyed
    }

    pub fn state(&self) -> ResponseState {
        self.shared.lock().state
    }

    /// Bytes pushed but not yet read
    pub fn buffered_len(&self) -> usize {
        self.shared.lock().buffered
    }
}

impl Stream for ByteStream {
    type Item = Result<Bytes, ResponseError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let shared = self.shared.clone();
        let mut inner = shared.lock();

        if let Some(chunk) = inner.buffer.pop_front() {
            inner.buffered -= chunk.len();
            inner.pull();
            return Poll::Ready(Some(Ok(chunk)));
        }

        if let Some(error) = inner.error.take() {
            return Poll::Ready(Some(Err(error)));
        }

        if inner.destroyed {
            return Poll::Ready(None);
        }

        if inner.ended {
            let first_end = !inner.failed && !inner.end_emitted;
            inner.end_emitted = true;
            drop(inner);

            if first_end {
                shared.finish();
            }
            return Poll::Ready(None);
        }

        inner.pull();
        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for ByteStream {
    fn drop(&mut self) {
        self.shared.destroy();
    }
}

impl Producer {
    pub fn id(&self) -> ResponseId {
        self.shared.id
    }

    /// Metadata is normalized: move to `Active` and announce it.
    pub(crate) fn activate(&self) {
        let activated = self.shared.lock().set_state(ResponseState::Active);
        if activated {
            self.shared.emit(ResponseEvent::MetadataReady { id: self.shared.id });
        }
    }

    /// Push a chunk, or `None` for end-of-data. Returns `false` when the producer should slow
    /// down: the buffer reached the high-water mark, or the stream no longer accepts data.
    pub fn push(&self, chunk: Option<Bytes>) -> bool {
        let mut inner = self.shared.lock();
        if inner.destroyed || inner.ended {
            log::debug!(
                "Response[{}]: dropping push after {}",
                self.shared.id,
                if inner.destroyed { "destroy" } else { "end" }
            );
            return false;
        }

        match chunk {
            None => {
                inner.ended = true;
                inner.set_state(ResponseState::Ended);
                inner.wake();
                false
            }
            Some(chunk) => {
                inner.enqueue(chunk);
                inner.wake();
                inner.below_high_water()
            }
        }
    }

    /// Push a chunk and, when the buffer is full, install the resume slot in the same step so a
    /// pull cannot slip in between.
    pub fn push_or_park(&self, chunk: Bytes) -> PushOutcome {
        let mut inner = self.shared.lock();
        if inner.destroyed || inner.ended {
            return PushOutcome::Rejected;
        }

        inner.enqueue(chunk);
        inner.wake();
        if inner.below_high_water() {
            return PushOutcome::Accepted;
        }

        debug_assert!(
            inner.resume.is_none(),
            "resume slot overwritten while a writer is still parked"
        );
        let (tx, rx) = oneshot::channel();
        inner.resume = Some(tx);
        PushOutcome::Parked(rx)
    }

    /// Surface a transport failure. Swallowed when the consumer already destroyed the stream or
    /// end-of-data was already pushed; only the first failure counts.
    pub fn fail(&self, error: ResponseError) {
        let mut inner = self.shared.lock();
        if inner.destroyed {
            log::debug!("Response[{}]: ignoring error after destroy: {}", self.shared.id, error);
            return;
        }
        if inner.failed || inner.ended {
            log::debug!("Response[{}]: ignoring late error: {}", self.shared.id, error);
            return;
        }

        log::warn!("Response[{}]: transport failed: {}", self.shared.id, error);
        inner.failed = true;
        inner.ended = true;
        inner.set_state(ResponseState::Failed);
        inner.error = Some(error.clone());
        inner.resume = None;
        inner.wake();
        drop(inner);

        self.shared.emit(ResponseEvent::Error {
            id: self.shared.id,
            error,
        });
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.lock().destroyed
    }

    /// End sentinel pushed or transport failed
    pub fn is_ended(&self) -> bool {
        self.shared.lock().ended
    }
}
