//! Incoming HTTP response.
//!
//! An [`IncomingResponse`] is created as soon as the host transport has response metadata
//! (headers received). Status, url and headers are normalized once, during construction, and
//! are read-only afterwards. The body is a pull-based byte stream fed by the bridge selected
//! through [`ResponseMode`].
//!
//! ## Notes
//! - Poll modes need the host to call [`ProgressHandle::notify`] for every XHR progress event
//!   and once more when the request completes.
//! - The streaming mode drives itself; it is started during construction.
//! - `trailers` are always empty: neither transport exposes them. They exist so the response
//!   looks like a regular HTTP client response.
//! - Dropping the response before the end aborts it, like [`IncomingResponse::destroy`].

use crate::capability::ResponseMode;
use crate::config::ResponseContext;
use crate::errors::ResponseError;
use crate::event::{ResponseId, ResponseState};
use crate::net::bridge::{Bridge, Feed};
use crate::net::headers::{self, HeaderMapping, RawHeaders};
use crate::net::poll::{Charset, PollBridge, XhrTransport};
use crate::net::stream::{ByteStream, Producer};
use crate::net::streaming::{FetchSource, StreamingBridge};
use crate::net::timer::TimeoutGuard;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use url::Url;

/// The host transport a response is built from
pub enum Transport {
    /// XHR-like object, used by every poll mode
    Xhr(Arc<dyn XhrTransport>),
    /// Fetch-like response plus the timer bounding its body
    Fetch {
        source: Box<dyn FetchSource>,
        timer: TimeoutGuard,
    },
}

impl Transport {
    pub fn xhr<X: XhrTransport + 'static>(xhr: X) -> Self {
        Transport::Xhr(Arc::new(xhr))
    }

    pub fn fetch<F: FetchSource + 'static>(source: F, timer: TimeoutGuard) -> Self {
        Transport::Fetch {
            source: Box::new(source),
            timer,
        }
    }
}

/// Handle the host uses to report transport progress. Cheap to clone.
#[derive(Clone)]
pub struct ProgressHandle {
    bridge: Arc<Mutex<Bridge>>,
    producer: Producer,
}

impl ProgressHandle {
    /// The transport made progress (or completed)
    pub fn notify(&self) {
        let mut bridge = self.bridge.lock().unwrap_or_else(PoisonError::into_inner);
        bridge.feed(&self.producer);
    }
}

pub struct IncomingResponse {
    id: ResponseId,
    url: String,
    status_code: u16,
    status_message: String,
    headers: HeaderMapping,
    raw_headers: RawHeaders,
    trailers: HeaderMapping,
    raw_trailers: RawHeaders,
    mode: ResponseMode,
    body: ByteStream,
    progress: ProgressHandle,
}

impl IncomingResponse {
    /// Build a response over `transport`. Poll modes need an XHR transport, the streaming mode
    /// a fetch transport.
    pub fn new(transport: Transport, mode: ResponseMode, ctx: &ResponseContext) -> Result<Self, ResponseError> {
        match (&transport, mode.is_poll()) {
            (Transport::Xhr(_), false) => {
                return Err(ResponseError::ModeMismatch { mode, expected: "fetch" });
            }
            (Transport::Fetch { timer, .. }, true) => {
                timer.clear();
                return Err(ResponseError::ModeMismatch { mode, expected: "xhr" });
            }
            _ => {}
        }

        let id = ResponseId::new();
        let (producer, body) = ByteStream::channel(id, &ctx.config, ctx.event_tx.clone(), ctx.spawner.clone());

        let (url, status_code, status_message, (headers, raw_headers), bridge) = match transport {
            Transport::Xhr(xhr) => {
                let (headers, raw) = headers::parse_raw(&xhr.all_response_headers());
                let charset = Charset::negotiate(&ctx.capabilities, &headers);

                (
                    xhr.response_url(),
                    xhr.status(),
                    xhr.status_text(),
                    (headers, raw),
                    Bridge::Poll(PollBridge::new(xhr, mode, charset)),
                )
            }
            Transport::Fetch { source, timer } => {
                let url = source.url();
                let status = source.status();
                let status_text = source.status_text();
                let normalized = headers::from_pairs(source.header_pairs());
                let body = source.into_body();

                (
                    url,
                    status,
                    status_text,
                    normalized,
                    Bridge::Streaming(StreamingBridge::new(body, timer, &ctx.capabilities, ctx.spawner.clone())),
                )
            }
        };

        producer.activate();
        log::debug!("Response[{}]: {} {} ({} mode)", id, status_code, url, mode);

        let progress = ProgressHandle {
            bridge: Arc::new(Mutex::new(bridge)),
            producer,
        };

        if mode == ResponseMode::Streaming {
            progress.notify();
        }

        Ok(Self {
            id,
            url,
            status_code,
            status_message,
            headers,
            raw_headers,
            trailers: HeaderMapping::new(),
            raw_trailers: RawHeaders::new(),
            mode,
            body,
            progress,
        })
    }

    pub fn id(&self) -> ResponseId {
        self.id
    }

    /// Final URL as reported by the transport
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL parsed, when the transport reported a valid one
    pub fn parsed_url(&self) -> Option<Url> {
        Url::parse(&self.url).ok()
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// The status code as an `http::StatusCode`, when it is a valid one
    pub fn status(&self) -> Option<http::StatusCode> {
        http::StatusCode::from_u16(self.status_code).ok()
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn headers(&self) -> &HeaderMapping {
        &self.headers
    }

    pub fn raw_headers(&self) -> &RawHeaders {
        &self.raw_headers
    }

    pub fn trailers(&self) -> &HeaderMapping {
        &self.trailers
    }

    pub fn raw_trailers(&self) -> &RawHeaders {
        &self.raw_trailers
    }

    /// Headers as a case-insensitive `http::HeaderMap`
    pub fn header_map(&self) -> http::HeaderMap {
        headers::to_header_map(&self.raw_headers)
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn state(&self) -> ResponseState {
        self.body.state()
    }

    /// Handle for the host's progress notifications
    pub fn progress_handle(&self) -> ProgressHandle {
        self.progress.clone()
    }

    /// Shortcut for `progress_handle().notify()`
    pub fn on_progress(&self) {
        self.progress.notify();
    }

    /// Abort consumption. The bridge stops pushing; no end-of-data is produced.
    pub fn destroy(&self) {
        self.body.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.body.is_destroyed()
    }

    /// Drain the body into a single buffer.
    pub async fn read_to_end(mut self) -> Result<Bytes, ResponseError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Stream for IncomingResponse {
    type Item = Result<Bytes, ResponseError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.body).poll_next(cx)
    }
}

impl std::fmt::Debug for IncomingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingResponse")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("status_code", &self.status_code)
            .field("status_message", &self.status_message)
            .field("headers", &self.headers)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish()
    }
}
