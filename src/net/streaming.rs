//! Streaming bridge: fetch-style transports.
//!
//! The preferred path pipes the response body into a [`WritableSink`]. A write that hits the
//! high-water mark stays pending until the consumer pulls again, which is what propagates
//! backpressure back to the body. Bodies that cannot pipe (or hosts without writable streams)
//! fall back to a manual reader loop, which waits for a pull the same way before requesting
//! the next chunk.
//!
//! The externally supplied [`TimeoutGuard`] is cleared exactly once, on whichever exit is
//! reached first.

use crate::capability::Capabilities;
use crate::errors::{PipeUnsupported, ResponseError};
use crate::net::bridge::Feed;
use crate::net::stream::{Producer, PushOutcome};
use crate::net::timer::TimeoutGuard;
use crate::runtime::Spawner;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use std::sync::Arc;

/// Future returned by a pipe; resolves when the body is fully written or the pipe failed
pub type PipeFuture = BoxFuture<'static, Result<(), ResponseError>>;

/// What the bridge needs from a fetch-like response
pub trait FetchSource: Send {
    fn url(&self) -> String;
    fn status(&self) -> u16;
    fn status_text(&self) -> String;
    /// The host's header collection, one pair per name
    fn header_pairs(&self) -> Vec<(String, String)>;
    fn into_body(self: Box<Self>) -> Box<dyn FetchBody>;
}

pub trait FetchBody: Send {
    /// Pipe the body into `sink`. A body without a native pipe returns [`PipeUnsupported`] and
    /// must stay readable through [`into_reader`](FetchBody::into_reader).
    fn pipe_to(&mut self, sink: WritableSink) -> Result<PipeFuture, PipeUnsupported>;

    fn into_reader(self: Box<Self>) -> Box<dyn BodyReader>;
}

pub trait BodyReader: Send {
    /// Next chunk, or `None` once the body is complete
    fn read(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, ResponseError>>;
}

/// Destination a body is piped into.
#[derive(Clone)]
pub struct WritableSink {
    producer: Producer,
    timer: TimeoutGuard,
}

impl WritableSink {
    pub(crate) fn new(producer: Producer, timer: TimeoutGuard) -> Self {
        Self { producer, timer }
    }

    fn rejection(&self) -> ResponseError {
        if self.producer.is_destroyed() {
            ResponseError::Destroyed
        } else {
            ResponseError::Transport("write after end of stream".into())
        }
    }

    /// Push one chunk. Completes immediately while there is room, otherwise after the next
    /// pull. Fails when the response is (or becomes) destroyed so the pipe unwinds.
    pub async fn write(&self, chunk: Bytes) -> Result<(), ResponseError> {
        match self.producer.push_or_park(chunk) {
            PushOutcome::Accepted => Ok(()),
            PushOutcome::Parked(resume) => resume.await.map_err(|_| self.rejection()),
            PushOutcome::Rejected => Err(self.rejection()),
        }
    }

    /// Body complete
    pub fn close(&self) {
        self.timer.clear();
        if !self.producer.is_destroyed() {
            self.producer.push(None);
        }
    }

    /// Body failed upstream
    pub fn abort(&self, error: ResponseError) {
        self.timer.clear();
        self.producer.fail(error);
    }
}

/// A [`FetchBody`] over any stream of byte chunks.
pub struct StreamBody {
    stream: Option<BoxStream<'static, Result<Bytes, ResponseError>>>,
    pipe: bool,
}

impl StreamBody {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ResponseError>> + Send + 'static,
    {
        Self {
            stream: Some(stream.boxed()),
            pipe: true,
        }
    }

    /// Same body, but refusing to pipe (as on hosts without a native pipe)
    pub fn without_pipe<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ResponseError>> + Send + 'static,
    {
        Self {
            pipe: false,
            ..Self::new(stream)
        }
    }
}

impl FetchBody for StreamBody {
    fn pipe_to(&mut self, sink: WritableSink) -> Result<PipeFuture, PipeUnsupported> {
        if !self.pipe {
            return Err(PipeUnsupported);
        }
        let mut stream = self.stream.take().ok_or(PipeUnsupported)?;

        Ok(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(chunk) => sink.write(chunk).await?,
                    Err(e) => {
                        sink.abort(e.clone());
                        return Err(e);
                    }
                }
            }
            sink.close();
            Ok(())
        }
        .boxed())
    }

    fn into_reader(self: Box<Self>) -> Box<dyn BodyReader> {
        Box::new(StreamReader {
            stream: self.stream,
        })
    }
}

struct StreamReader {
    stream: Option<BoxStream<'static, Result<Bytes, ResponseError>>>,
}

impl BodyReader for StreamReader {
    fn read(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, ResponseError>> {
        async move {
            match self.stream.as_mut() {
                Some(stream) => stream.next().await.transpose(),
                None => Err(ResponseError::Transport("body already consumed".into())),
            }
        }
        .boxed()
    }
}

pub struct StreamingBridge {
    /// Taken when the bridge starts
    body: Option<Box<dyn FetchBody>>,
    timer: TimeoutGuard,
    writable_stream: bool,
    spawner: Arc<dyn Spawner>,
}

impl StreamingBridge {
    pub fn new(
        body: Box<dyn FetchBody>,
        timer: TimeoutGuard,
        caps: &Capabilities,
        spawner: Arc<dyn Spawner>,
    ) -> Self {
        Self {
            body: Some(body),
            timer,
            writable_stream: caps.writable_stream,
            spawner,
        }
    }

    pub fn is_started(&self) -> bool {
        self.body.is_none()
    }
}

impl Feed for StreamingBridge {
    /// Starts draining the body; the bridge then drives itself. Later calls do nothing.
    fn feed(&mut self, producer: &Producer) {
        let Some(body) = self.body.take() else {
            return;
        };

        let producer = producer.clone();
        let timer = self.timer.clone();
        let writable_stream = self.writable_stream;

        self.spawner.spawn(
            async move {
                drain(body, &producer, &timer, writable_stream).await;
                // Also covers exits where the consumer destroyed the response first
                timer.clear();
            }
            .boxed(),
        );
    }
}

async fn drain(mut body: Box<dyn FetchBody>, producer: &Producer, timer: &TimeoutGuard, writable_stream: bool) {
    if writable_stream {
        match body.pipe_to(WritableSink::new(producer.clone(), timer.clone())) {
            Ok(pipe) => {
                if let Err(e) = pipe.await {
                    timer.clear();
                    producer.fail(e);
                }
                return;
            }
            Err(PipeUnsupported) => {
                log::debug!("Response[{}]: body cannot pipe, reading manually", producer.id());
            }
        }
    }

    read_loop(body.into_reader(), producer, timer).await;
}

async fn read_loop(mut reader: Box<dyn BodyReader>, producer: &Producer, timer: &TimeoutGuard) {
    loop {
        match reader.read().await {
            Ok(Some(chunk)) => {
                if producer.is_destroyed() {
                    return;
                }
                match producer.push_or_park(chunk) {
                    PushOutcome::Accepted => {}
                    PushOutcome::Parked(resume) => {
                        if resume.await.is_err() {
                            return;
                        }
                    }
                    PushOutcome::Rejected => return,
                }
            }
            Ok(None) => {
                if producer.is_destroyed() {
                    return;
                }
                timer.clear();
                producer.push(None);
                return;
            }
            Err(e) => {
                timer.clear();
                producer.fail(e);
                return;
            }
        }
    }
}
