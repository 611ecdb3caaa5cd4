//! In-memory bridge implementations for tests.
//!
//! Enabled with the `test-support` feature. Nothing here touches the network
//! or spawns processes.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

use crate::error::{BridgeError, Result};
use crate::http::{HttpClient, HttpRequest, HttpStreamResponse};
use crate::resolver::{MediaResolver, ResolvedMedia};
use crate::time::Clock;

// =============================================================================
// Resolver
// =============================================================================

/// Resolver backed by a fixed (artist, title) → URL table.
pub struct FakeResolver {
    tracks: Mutex<HashMap<(String, String), String>>,
    failures_remaining: AtomicUsize,
    calls: AtomicUsize,
    gate: Option<watch::Receiver<bool>>,
}

/// Releases a gated fake ([`FakeResolver::gated`], [`FakeHttpClient::gated_body`]).
pub struct Gate {
    sender: watch::Sender<bool>,
}

impl Gate {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, receiver)
    }

    pub fn release(&self) {
        let _ = self.sender.send(true);
    }
}

async fn wait_released(mut gate: watch::Receiver<bool>) {
    loop {
        let released = *gate.borrow_and_update();
        if released || gate.changed().await.is_err() {
            return;
        }
    }
}

impl FakeResolver {
    pub fn new() -> Self {
        Self {
            tracks: Mutex::new(HashMap::new()),
            failures_remaining: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Every `resolve` call blocks until the returned gate is released.
    pub fn gated() -> (Self, Gate) {
        let (gate, receiver) = Gate::new();
        let mut resolver = Self::new();
        resolver.gate = Some(receiver);
        (resolver, gate)
    }

    pub fn with_track(self, artist: &str, title: &str, url: &str) -> Self {
        self.insert_track(artist, title, url);
        self
    }

    /// The next `count` calls fail before the table is consulted.
    pub fn failing_first(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    pub fn insert_track(&self, artist: &str, title: &str, url: &str) {
        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.insert((artist.to_string(), title.to_string()), url.to_string());
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn resolve(&self, artist: &str, title: &str) -> Result<ResolvedMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            wait_released(gate.clone()).await;
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BridgeError::OperationFailed(format!(
                "simulated resolver failure for {} - {}",
                artist, title
            )));
        }

        let tracks = self
            .tracks
            .lock()
            .map_err(|_| BridgeError::OperationFailed("resolver table poisoned".to_string()))?;
        tracks
            .get(&(artist.to_string(), title.to_string()))
            .map(|url| ResolvedMedia::new(url.clone()).with_format("m4a"))
            .ok_or_else(|| {
                BridgeError::NotAvailable(format!("no match for {} - {}", artist, title))
            })
    }
}

// =============================================================================
// HTTP
// =============================================================================

#[derive(Clone)]
enum FakeResource {
    Body { content_type: String, body: Bytes },
    Status(u16),
    TransportFailure,
}

/// HTTP client serving canned bodies, honoring single `Range` requests.
pub struct FakeHttpClient {
    resources: Mutex<HashMap<String, FakeResource>>,
    requests: Mutex<Vec<HttpRequest>>,
    chunk_size: usize,
    body_gate: Option<watch::Receiver<bool>>,
}

impl FakeHttpClient {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            chunk_size: 1000,
            body_gate: None,
        }
    }

    /// Response bodies yield their first chunk, then stall until the
    /// returned gate is released.
    pub fn gated_body() -> (Self, Gate) {
        let (gate, receiver) = Gate::new();
        let mut client = Self::new();
        client.body_gate = Some(receiver);
        (client, gate)
    }

    pub fn with_body(self, url: &str, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.insert(
            url,
            FakeResource::Body {
                content_type: content_type.to_string(),
                body: body.into(),
            },
        );
        self
    }

    /// Respond with `status` and an empty body.
    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.insert(url, FakeResource::Status(status));
        self
    }

    pub fn with_transport_failure(self, url: &str) -> Self {
        self.insert(url, FakeResource::TransportFailure);
        self
    }

    /// Size of the body chunks yielded by the response stream.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn insert(&self, url: &str, resource: FakeResource) {
        if let Ok(mut resources) = self.resources.lock() {
            resources.insert(url.to_string(), resource);
        }
    }

    fn chunked(&self, body: Bytes) -> crate::http::ByteStream {
        let chunks: Vec<Bytes> = body
            .chunks(self.chunk_size)
            .map(Bytes::copy_from_slice)
            .collect();
        let state = (chunks.into_iter(), self.body_gate.clone(), 0usize);

        Box::pin(futures::stream::unfold(
            state,
            |(mut chunks, gate, sent)| async move {
                if sent == 1 {
                    if let Some(gate) = &gate {
                        wait_released(gate.clone()).await;
                    }
                }
                let chunk = chunks.next()?;
                Some((Ok(chunk), (chunks, gate, sent + 1)))
            },
        ))
    }
}

impl Default for FakeHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// `bytes=a-b` / `bytes=a-` only; anything else is ignored.
fn simple_range(header: &str, len: usize) -> Option<(usize, usize)> {
    let range_set = header.trim().strip_prefix("bytes=")?;
    let (start, end) = range_set.split_once('-')?;
    let start: usize = start.trim().parse().ok()?;
    let end: usize = match end.trim() {
        "" => len.checked_sub(1)?,
        value => value.parse::<usize>().ok()?.min(len.checked_sub(1)?),
    };
    (start <= end && start < len).then_some((start, end))
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn stream(&self, request: HttpRequest) -> Result<HttpStreamResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let resource = self
            .resources
            .lock()
            .map_err(|_| BridgeError::OperationFailed("resource table poisoned".to_string()))?
            .get(&request.url)
            .cloned();

        let connection = ("connection".to_string(), "keep-alive".to_string());
        match resource {
            None => Ok(HttpStreamResponse {
                status: 404,
                headers: vec![connection],
                body: Box::pin(futures::stream::empty()),
            }),
            Some(FakeResource::Status(status)) => Ok(HttpStreamResponse {
                status,
                headers: vec![connection],
                body: Box::pin(futures::stream::empty()),
            }),
            Some(FakeResource::TransportFailure) => Err(BridgeError::OperationFailed(format!(
                "connection reset while fetching {}",
                request.url
            ))),
            Some(FakeResource::Body { content_type, body }) => {
                let range = request
                    .header_value("range")
                    .and_then(|value| simple_range(value, body.len()));
                let mut headers = vec![
                    ("content-type".to_string(), content_type),
                    ("accept-ranges".to_string(), "bytes".to_string()),
                    connection,
                ];
                let (status, payload) = match range {
                    Some((start, end)) => {
                        headers.push((
                            "content-range".to_string(),
                            format!("bytes {}-{}/{}", start, end, body.len()),
                        ));
                        (206, body.slice(start..=end))
                    }
                    None => (200, body),
                };
                headers.push(("content-length".to_string(), payload.len().to_string()));

                Ok(HttpStreamResponse {
                    status,
                    headers,
                    body: self.chunked(payload),
                })
            }
        }
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_millis),
        }
    }

    pub fn advance_millis(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
