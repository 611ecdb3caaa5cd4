//! Tests for the remote stream passthrough

use bridge_traits::fakes::FakeHttpClient;
use core_playback::error::PlaybackError;
use core_playback::proxy::RemoteStreamProxy;
use futures::StreamExt;
use std::sync::Arc;

const URL: &str = "https://cdn.example.com/track.m4a?sig=abc";

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 199) as u8).collect()
}

fn proxy_for(http: FakeHttpClient) -> (RemoteStreamProxy, Arc<FakeHttpClient>) {
    let http = Arc::new(http);
    (RemoteStreamProxy::new(http.clone()), http)
}

#[tokio::test]
async fn test_full_relay_strips_hop_by_hop_headers() {
    let content = body(20_000);
    let (proxy, _) = proxy_for(FakeHttpClient::new().with_body(URL, "audio/mp4", content.clone()));

    let stream = proxy.open(URL, None).await.unwrap();
    assert_eq!(stream.status, 200);
    assert_eq!(stream.content_type, "audio/mp4");
    assert!(stream
        .headers
        .iter()
        .all(|(name, _)| name != "content-length" && name != "connection"));
    assert!(stream
        .headers
        .iter()
        .any(|(name, value)| name == "accept-ranges" && value == "bytes"));

    let chunks: Vec<_> = stream.body.map(|chunk| chunk.unwrap()).collect().await;
    assert!(chunks.iter().all(|chunk| chunk.len() <= 8192));
    assert_eq!(chunks[0].len(), 8192);
    assert_eq!(chunks.concat(), content);
}

#[tokio::test]
async fn test_range_is_forwarded() {
    let content = body(1000);
    let (proxy, http) =
        proxy_for(FakeHttpClient::new().with_body(URL, "audio/mp4", content.clone()));

    let stream = proxy.open(URL, Some("bytes=100-199")).await.unwrap();
    assert_eq!(stream.status, 206);
    assert!(stream
        .headers
        .iter()
        .any(|(name, value)| name == "content-range" && value == "bytes 100-199/1000"));

    let requests = http.requests();
    assert_eq!(requests[0].header_value("range"), Some("bytes=100-199"));

    let chunks: Vec<_> = stream.body.map(|chunk| chunk.unwrap()).collect().await;
    assert_eq!(chunks.concat(), content[100..200]);
}

#[tokio::test]
async fn test_upstream_status_is_forwarded() {
    let (proxy, _) = proxy_for(FakeHttpClient::new().with_status(URL, 403));

    let stream = proxy.open(URL, None).await.unwrap();
    assert_eq!(stream.status, 403);
}

#[tokio::test]
async fn test_transport_failure_is_upstream_error() {
    let (proxy, _) = proxy_for(FakeHttpClient::new().with_transport_failure(URL));

    let err = proxy.open(URL, None).await.unwrap_err();
    assert!(matches!(err, PlaybackError::Upstream(_)));
}

#[tokio::test]
async fn test_non_http_url_is_rejected() {
    let (proxy, http) = proxy_for(FakeHttpClient::new());

    let err = proxy.open("file:///etc/passwd", None).await.unwrap_err();
    assert!(matches!(err, PlaybackError::InvalidInput(_)));
    assert_eq!(http.request_count(), 0);
}
