//! Host capability detection.
//!
//! The host environment is probed once at startup. The resulting [`Capabilities`] table is
//! immutable and is handed by reference to whatever needs it (mode selection, charset
//! negotiation and the streaming bridge). There is no global state: a host that wants a
//! process-wide table keeps its own copy.
//!
//! # Main Types
//!
//! - [`HostProbe`]: raw facts about the host, answered by the embedder.
//! - [`HostFacts`]: plain-data probe that can be deserialized from JSON.
//! - [`Capabilities`]: derived feature flags.
//! - [`ResponseMode`]: how response bytes are pulled out of the transport.

use crate::errors::ResponseError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// XHR `responseType` values that are probed for.
pub const RESPONSE_TYPE_ARRAY_BUFFER: &str = "arraybuffer";
pub const RESPONSE_TYPE_MS_STREAM: &str = "ms-stream";
pub const RESPONSE_TYPE_MOZ_CHUNKED: &str = "moz-chunked-arraybuffer";

/// Raw questions asked of the host environment.
pub trait HostProbe {
    /// Both a fetch function and readable streams are present
    fn has_fetch(&self) -> bool;
    /// A writable stream constructor is present
    fn has_writable_stream(&self) -> bool;
    /// An abort controller constructor is present
    fn has_abort_controller(&self) -> bool;
    /// An XHR object accepts (and keeps) the given `responseType`
    fn supports_response_type(&self, response_type: &str) -> bool;
    /// An XHR object exposes `overrideMimeType`
    fn has_override_mime_type(&self) -> bool;
}

/// Host probe results as plain data, usually shipped over from the host as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostFacts {
    pub fetch: bool,
    pub writable_stream: bool,
    pub abort_controller: bool,
    /// Response types the XHR object accepted
    pub response_types: Vec<String>,
    pub override_mime_type: bool,
}

impl HostFacts {
    pub fn from_json(json: &str) -> Result<Self, ResponseError> {
        serde_json::from_str(json).map_err(|e| ResponseError::InvalidHostFacts(e.to_string()))
    }
}

impl HostProbe for HostFacts {
    fn has_fetch(&self) -> bool {
        self.fetch
    }

    fn has_writable_stream(&self) -> bool {
        self.writable_stream
    }

    fn has_abort_controller(&self) -> bool {
        self.abort_controller
    }

    fn supports_response_type(&self, response_type: &str) -> bool {
        self.response_types.iter().any(|t| t == response_type)
    }

    fn has_override_mime_type(&self) -> bool {
        self.override_mime_type
    }
}

/// Feature flags derived from a single host probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Fetch with streaming response bodies
    pub fetch: bool,
    /// Response bodies can be piped into a writable sink
    pub writable_stream: bool,
    pub abort_controller: bool,
    pub array_buffer: bool,
    pub ms_stream: bool,
    pub moz_chunked_array_buffer: bool,
    /// Automatic MIME sniffing can be overridden, so text responses arrive undecoded
    pub override_mime_type: bool,
}

impl Capabilities {
    /// Probe the host once. Fetch support implies array buffers and MIME override, and turns off
    /// the legacy incremental XHR response types.
    pub fn detect(probe: &dyn HostProbe) -> Self {
        let fetch = probe.has_fetch();

        let caps = Self {
            fetch,
            writable_stream: probe.has_writable_stream(),
            abort_controller: probe.has_abort_controller(),
            array_buffer: fetch || probe.supports_response_type(RESPONSE_TYPE_ARRAY_BUFFER),
            ms_stream: !fetch && probe.supports_response_type(RESPONSE_TYPE_MS_STREAM),
            moz_chunked_array_buffer: !fetch && probe.supports_response_type(RESPONSE_TYPE_MOZ_CHUNKED),
            override_mime_type: fetch || probe.has_override_mime_type(),
        };

        log::debug!("Host capabilities detected: {:?}", caps);
        caps
    }
}

/// Selects which bridge logic pulls bytes out of the transport. Fixed for the lifetime of a
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseMode {
    /// Cumulative `responseText`
    Text,
    /// Whole buffer, only once the transport is done
    ArrayBuffer,
    /// One fresh chunk per progress notification
    ChunkedArrayBuffer,
    /// Proprietary incremental binary reader
    PlatformStream,
    /// Fetch body stream
    Streaming,
}

impl ResponseMode {
    /// Pick the best mode the host supports.
    pub fn decide(caps: &Capabilities, prefer_binary: bool, use_fetch: bool) -> Self {
        if caps.fetch && use_fetch {
            ResponseMode::Streaming
        } else if caps.moz_chunked_array_buffer {
            ResponseMode::ChunkedArrayBuffer
        } else if caps.ms_stream {
            ResponseMode::PlatformStream
        } else if caps.array_buffer && prefer_binary {
            ResponseMode::ArrayBuffer
        } else {
            ResponseMode::Text
        }
    }

    /// Is this one of the poll (XHR) modes
    pub fn is_poll(&self) -> bool {
        !matches!(self, ResponseMode::Streaming)
    }

    /// The XHR `responseType` to request for this mode
    pub fn response_type(&self) -> &'static str {
        match self {
            ResponseMode::Text => "text",
            ResponseMode::ArrayBuffer => RESPONSE_TYPE_ARRAY_BUFFER,
            ResponseMode::ChunkedArrayBuffer => RESPONSE_TYPE_MOZ_CHUNKED,
            ResponseMode::PlatformStream => RESPONSE_TYPE_MS_STREAM,
            ResponseMode::Streaming => "stream",
        }
    }
}

impl Display for ResponseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseMode::Text => write!(f, "text"),
            ResponseMode::ArrayBuffer => write!(f, "array-buffer"),
            ResponseMode::ChunkedArrayBuffer => write!(f, "chunked-array-buffer"),
            ResponseMode::PlatformStream => write!(f, "platform-stream"),
            ResponseMode::Streaming => write!(f, "streaming"),
        }
    }
}
