//! Native fetch transport backed by reqwest.
//!
//! Hosts that run the bridge outside a browser use this to get a streaming-mode
//! [`IncomingResponse`] straight from a URL. The optional timeout plays the role of the
//! request-side body timer: it is armed before the request is sent and cleared by the
//! streaming bridge once the body is done.

use crate::capability::ResponseMode;
use crate::config::ResponseContext;
use crate::errors::ResponseError;
use crate::net::response::{IncomingResponse, Transport};
use crate::net::streaming::{FetchBody, FetchSource, StreamBody};
use crate::net::timer::TimeoutGuard;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::oneshot;
use url::Url;

/// Loads an URL and returns the response as soon as its headers are in.
pub async fn fetch(url: Url, timeout: Option<Duration>, ctx: &ResponseContext) -> Result<IncomingResponse, ResponseError> {
    let (timer, mut deadline) = match timeout {
        Some(after) => {
            let (tx, rx) = oneshot::channel();
            let timer = TimeoutGuard::arm(after, move || {
                let _ = tx.send(());
            });
            (timer, Some(rx))
        }
        None => (TimeoutGuard::inert(), None),
    };

    let client = reqwest::Client::new();
    let request = client.get(url.clone()).send();

    let sent = match deadline.as_mut() {
        Some(rx) => tokio::select! {
            res = request => res,
            _ = rx => {
                log::warn!("fetch of {} timed out before headers arrived", url);
                return Err(ResponseError::Timeout);
            }
        },
        None => request.await,
    };

    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            timer.clear();
            log::error!("fetch of {} failed: {}", url, e);
            return Err(transport_error(e));
        }
    };

    let source = ReqwestSource { response, deadline };
    IncomingResponse::new(Transport::fetch(source, timer), ResponseMode::Streaming, ctx)
}

fn transport_error(e: reqwest::Error) -> ResponseError {
    if e.is_timeout() {
        ResponseError::Timeout
    } else {
        ResponseError::Transport(e.to_string())
    }
}

struct ReqwestSource {
    response: reqwest::Response,
    /// Fires when the body timer runs out
    deadline: Option<oneshot::Receiver<()>>,
}

impl FetchSource for ReqwestSource {
    fn url(&self) -> String {
        self.response.url().to_string()
    }

    fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    fn status_text(&self) -> String {
        self.response
            .status()
            .canonical_reason()
            .unwrap_or("Unknown")
            .to_string()
    }

    /// Fetch header semantics: one entry per name, repeated values joined with ", "
    fn header_pairs(&self) -> Vec<(String, String)> {
        let headers = self.response.headers();
        headers
            .keys()
            .map(|name| {
                let values: Vec<String> = headers
                    .get_all(name)
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect();
                (name.to_string(), values.join(", "))
            })
            .collect()
    }

    fn into_body(self: Box<Self>) -> Box<dyn FetchBody> {
        let ReqwestSource { response, deadline } = *self;
        let chunks = response.bytes_stream().map(|r| r.map_err(transport_error)).boxed();

        match deadline {
            Some(deadline) => Box::new(StreamBody::new(with_deadline(chunks, deadline))),
            None => Box::new(StreamBody::new(chunks)),
        }
    }
}

type Chunks = BoxStream<'static, Result<Bytes, ResponseError>>;

enum Next {
    Chunk(Option<Result<Bytes, ResponseError>>),
    Expired,
    Disarmed,
}

/// Ends the body with [`ResponseError::Timeout`] when `deadline` fires first. A dropped sender
/// means the timer was cleared, after which the body is read without a deadline.
fn with_deadline(chunks: Chunks, deadline: oneshot::Receiver<()>) -> Chunks {
    futures::stream::unfold(Some((chunks, Some(deadline))), |state| async move {
        let (mut chunks, mut deadline) = state?;

        loop {
            let next = match deadline.as_mut() {
                None => Next::Chunk(chunks.next().await),
                Some(rx) => tokio::select! {
                    chunk = chunks.next() => Next::Chunk(chunk),
                    fired = rx => if fired.is_ok() { Next::Expired } else { Next::Disarmed },
                },
            };

            match next {
                Next::Chunk(chunk) => return chunk.map(|chunk| (chunk, Some((chunks, deadline)))),
                Next::Expired => return Some((Err(ResponseError::Timeout), None)),
                Next::Disarmed => deadline = None,
            }
        }
    })
    .boxed()
}
