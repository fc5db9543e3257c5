//! Poll bridge: XHR-style transports.
//!
//! An XHR reports progress through notifications and exposes its data in one of four shapes,
//! chosen up front through the response mode:
//!
//! - `Text`: cumulative `responseText`; only the part past `position` is new.
//! - `ArrayBuffer`: the whole body, available once the transport is done.
//! - `ChunkedArrayBuffer`: a fresh chunk per notification while loading.
//! - `PlatformStream`: an opaque stream read by a nested reader with its own progress/load
//!   callbacks, reported through [`PlatformStreamSink`].
//!
//! The host calls [`ProgressHandle::notify`](crate::net::ProgressHandle::notify) for every
//! progress event and once more at completion; each call runs [`PollBridge::feed`].

use crate::capability::{Capabilities, ResponseMode};
use crate::errors::ResponseError;
use crate::net::bridge::Feed;
use crate::net::headers::{declared_charset, HeaderMapping};
use crate::net::stream::Producer;
use bytes::Bytes;
use encoding_rs::Encoding;
use std::sync::Arc;

/// Label of the one-byte-per-character charset
pub const RAW_CHARSET_LABEL: &str = "x-user-defined";

/// XHR `readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

impl TryFrom<u8> for ReadyState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReadyState::Unsent),
            1 => Ok(ReadyState::Opened),
            2 => Ok(ReadyState::HeadersReceived),
            3 => Ok(ReadyState::Loading),
            4 => Ok(ReadyState::Done),
            other => Err(other),
        }
    }
}

/// What the bridge needs from an XHR-like object
pub trait XhrTransport: Send + Sync {
    fn status(&self) -> u16;
    fn status_text(&self) -> String;
    /// Final URL after redirects (may be empty when the host does not expose it)
    fn response_url(&self) -> String;
    fn ready_state(&self) -> ReadyState;
    /// Everything received so far, as text
    fn response_text(&self) -> String;
    /// Binary response: the whole body for array-buffer mode, the latest chunk for chunked mode
    fn response_bytes(&self) -> Option<Bytes>;
    /// The raw header block
    fn all_response_headers(&self) -> String;

    /// Start the nested platform reader over the response. The host keeps `sink` and calls
    /// `progress` with the cumulative result, then `load` (or `error`).
    fn read_platform_stream(&self, sink: PlatformStreamSink) {
        sink.error("platform stream reader is not available on this host");
    }
}

/// How text from the transport becomes bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// One byte per character: the low 8 bits of each code point
    Raw,
    Encoding(&'static Encoding),
}

impl Charset {
    /// Pick the charset for a text-mode response. With MIME override the host delivers the body
    /// undecoded, so it must be read back raw. Without it, trust a declared charset; with none
    /// declared still read raw.
    pub fn negotiate(caps: &Capabilities, headers: &HeaderMapping) -> Self {
        if caps.override_mime_type {
            return Charset::Raw;
        }

        match declared_charset(headers) {
            Some(label) => Charset::from_label(&label),
            None => Charset::Raw,
        }
    }

    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case(RAW_CHARSET_LABEL) {
            return Charset::Raw;
        }

        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => Charset::Encoding(encoding),
            None => {
                log::warn!("Unknown charset {:?}, using utf-8", label);
                Charset::Encoding(encoding_rs::UTF_8)
            }
        }
    }

    /// Turn received text back into bytes.
    pub fn encode(&self, text: &str) -> Bytes {
        match self {
            Charset::Raw => text.chars().map(|c| (c as u32 & 0xff) as u8).collect(),
            Charset::Encoding(encoding) if *encoding == encoding_rs::UTF_8 => {
                Bytes::copy_from_slice(text.as_bytes())
            }
            Charset::Encoding(encoding) => {
                // utf-16 labels encode as utf-8 (encoding_rs output encoding)
                let (bytes, _, had_errors) = encoding.encode(text);
                if had_errors {
                    log::warn!(
                        "text not representable in {}, unmappable characters replaced",
                        encoding.name()
                    );
                }
                Bytes::copy_from_slice(&bytes)
            }
        }
    }
}

/// Receives the nested platform reader's callbacks.
pub struct PlatformStreamSink {
    producer: Producer,
    /// Length of the cumulative result already pushed
    recorded: usize,
}

impl PlatformStreamSink {
    pub(crate) fn new(producer: Producer) -> Self {
        Self {
            producer,
            recorded: 0,
        }
    }

    /// Reader progress with everything read so far
    pub fn progress(&mut self, result: &[u8]) {
        if self.producer.is_destroyed() {
            return;
        }
        if result.len() > self.recorded {
            self.producer
                .push(Some(Bytes::copy_from_slice(&result[self.recorded..])));
            self.recorded = result.len();
        }
    }

    /// Reader finished
    pub fn load(&mut self) {
        if self.producer.is_destroyed() {
            return;
        }
        self.producer.push(None);
    }

    /// Reader failed. Treated as a fatal transport error rather than a stall.
    pub fn error(&self, message: impl Into<String>) {
        self.producer
            .fail(ResponseError::PlatformReader(message.into()));
    }
}

pub struct PollBridge {
    transport: Arc<dyn XhrTransport>,
    mode: ResponseMode,
    charset: Charset,
    /// Offset into the cumulative text already pushed
    position: usize,
    platform_started: bool,
    /// End sentinel pushed; later notifications are no-ops
    finished: bool,
}

impl PollBridge {
    pub fn new(transport: Arc<dyn XhrTransport>, mode: ResponseMode, charset: Charset) -> Self {
        Self {
            transport,
            mode,
            charset,
            position: 0,
            platform_started: false,
            finished: false,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    fn feed_text(&mut self, producer: &Producer) {
        let text = self.transport.response_text();
        if text.len() <= self.position {
            return;
        }

        let Some(delta) = text.get(self.position..) else {
            log::warn!(
                "Response[{}]: cumulative text no longer extends what was already read",
                producer.id()
            );
            return;
        };

        producer.push(Some(self.charset.encode(delta)));
        self.position = text.len();
    }
}

impl Feed for PollBridge {
    fn feed(&mut self, producer: &Producer) {
        if self.finished || producer.is_destroyed() {
            return;
        }

        let ready_state = self.transport.ready_state();

        match self.mode {
            ResponseMode::Text => self.feed_text(producer),
            ResponseMode::ArrayBuffer => {
                if ready_state == ReadyState::Done {
                    if let Some(body) = self.transport.response_bytes().filter(|b| !b.is_empty()) {
                        producer.push(Some(body));
                    }
                }
            }
            ResponseMode::ChunkedArrayBuffer => {
                if ready_state == ReadyState::Loading {
                    if let Some(chunk) = self.transport.response_bytes().filter(|b| !b.is_empty()) {
                        producer.push(Some(chunk));
                    }
                }
            }
            ResponseMode::PlatformStream => {
                if ready_state == ReadyState::Loading && !self.platform_started {
                    self.platform_started = true;
                    self.transport
                        .read_platform_stream(PlatformStreamSink::new(producer.clone()));
                }
            }
            ResponseMode::Streaming => {
                log::error!("Response[{}]: poll bridge used in streaming mode", producer.id());
                return;
            }
        }

        // The platform reader ends the stream from its own load callback
        if ready_state == ReadyState::Done && self.mode != ResponseMode::PlatformStream {
            self.finished = true;
            producer.push(None);
        }
    }
}
