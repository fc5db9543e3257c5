mod common;

use futures::StreamExt;
use gosub_http_bridge::net::headers::HeaderValue;
use gosub_http_bridge::{Capabilities, ResponseContext, ResponseError, ResponseEvent, ResponseMode, ResponseState};
use std::time::Duration;
use url::Url;

const HEAD: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Set-Cookie: a=1\r\n\
Set-Cookie: b=2\r\n\
X-Test: yes\r\n\
Content-Length: 5\r\n\
Connection: close\r\n\r\n";

fn context() -> ResponseContext {
    ResponseContext::new(
        Capabilities {
            fetch: true,
            writable_stream: true,
            abort_controller: true,
            ..Default::default()
        },
        None,
    )
}

#[tokio::test]
async fn fetch_streams_body_from_backend() {
    common::init_logging();
    let addr = common::start_mock_backend(HEAD, "hello", false).await;
    let ctx = context();
    let mut events = ctx.subscribe();

    let url = Url::parse(&format!("http://{}/greeting", addr)).unwrap();
    let res = gosub_http_bridge::net::fetch(url, Some(Duration::from_secs(5)), &ctx)
        .await
        .unwrap();

    assert_eq!(res.mode(), ResponseMode::Streaming);
    assert_eq!(res.status_code(), 200);
    assert_eq!(res.status_message(), "OK");
    assert!(res.url().ends_with("/greeting"));
    assert_eq!(
        res.headers().get("set-cookie").map(|v| v.values()),
        Some(vec!["a=1, b=2"])
    );
    assert_eq!(res.headers().get("x-test"), Some(&HeaderValue::from("yes")));
    let id = res.id();

    let body = res.read_to_end().await.unwrap();
    assert_eq!(&body[..], b"hello");

    assert_eq!(events.recv().await.unwrap(), ResponseEvent::MetadataReady { id });
    assert_eq!(events.recv().await.unwrap(), ResponseEvent::End { id });
    assert_eq!(events.recv().await.unwrap(), ResponseEvent::Close { id });
}

#[tokio::test]
async fn fetch_without_writable_stream_reads_manually() {
    common::init_logging();
    let addr = common::start_mock_backend(HEAD, "hello", false).await;
    let ctx = ResponseContext::new(Capabilities::default(), None);

    let url = Url::parse(&format!("http://{}/", addr)).unwrap();
    let mut res = gosub_http_bridge::net::fetch(url, None, &ctx).await.unwrap();

    let mut body = Vec::new();
    while let Some(chunk) = res.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, b"hello");

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(res.state(), ResponseState::Closed);
}

#[tokio::test]
async fn stalled_body_times_out() {
    common::init_logging();
    let head = "HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n";
    let addr = common::start_mock_backend(head, "hello", true).await;
    let ctx = context();
    let mut events = ctx.subscribe();

    let url = Url::parse(&format!("http://{}/", addr)).unwrap();
    let mut res = gosub_http_bridge::net::fetch(url, Some(Duration::from_millis(200)), &ctx)
        .await
        .unwrap();
    let id = res.id();

    let mut received = Vec::new();
    let mut error = None;
    while let Some(chunk) = res.next().await {
        match chunk {
            Ok(chunk) => received.extend_from_slice(&chunk),
            Err(e) => error = Some(e),
        }
    }

    assert_eq!(received, b"hello");
    assert_eq!(error, Some(ResponseError::Timeout));
    assert_eq!(events.recv().await.unwrap(), ResponseEvent::MetadataReady { id });
    assert_eq!(
        events.recv().await.unwrap(),
        ResponseEvent::Error {
            id,
            error: ResponseError::Timeout
        }
    );
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    common::init_logging();
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{}/", addr)).unwrap();
    let err = gosub_http_bridge::net::fetch(url, None, &context()).await.unwrap_err();
    assert!(matches!(err, ResponseError::Transport(_)));
}
