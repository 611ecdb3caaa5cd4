//! # Remote Stream Proxy
//!
//! Relays a remote audio URL to the client without touching the cache. Used
//! for immediate playback while a download runs, and for every request when
//! caching is disabled.

use crate::error::{PlaybackError, Result};
use bridge_traits::http::{ByteStream, HttpClient, HttpRequest};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Headers that describe the upstream hop and are invalid after rechunking.
pub const HOP_BY_HOP_HEADERS: [&str; 4] = [
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
];

pub const DEFAULT_CHUNK_SIZE: usize = 8192;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Upstream response ready to be relayed.
pub struct ProxiedStream {
    /// Upstream status, forwarded unchanged
    pub status: u16,
    pub content_type: String,
    /// Remaining upstream headers, lowercase names, hop-by-hop removed
    pub headers: Vec<(String, String)>,
    /// Body in chunks of at most the configured size
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for ProxiedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxiedStream")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Passthrough relay over an [`HttpClient`].
#[derive(Clone)]
pub struct RemoteStreamProxy {
    http: Arc<dyn HttpClient>,
    chunk_size: usize,
}

impl RemoteStreamProxy {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Open `url`, forwarding the client's `Range` header if any.
    ///
    /// Only `http` and `https` URLs are accepted. Any status the upstream
    /// answers with is passed through; only transport failures are errors.
    #[instrument(skip(self, url), fields(url = %core_runtime::logging::redact_url(url)))]
    pub async fn open(&self, url: &str, range: Option<&str>) -> Result<ProxiedStream> {
        validate_url(url)?;

        let request = HttpRequest::get(url).range(range);
        let response = self
            .http
            .stream(request)
            .await
            .map_err(|e| PlaybackError::Upstream(e.to_string()))?;

        if !response.is_success() {
            warn!(status = response.status, "Upstream answered with an error status");
        }

        let content_type = response
            .content_type()
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        let headers = response
            .headers
            .iter()
            .filter(|(name, _)| {
                !HOP_BY_HOP_HEADERS
                    .iter()
                    .any(|excluded| name.eq_ignore_ascii_case(excluded))
                    && !name.eq_ignore_ascii_case("content-type")
            })
            .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
            .collect();

        debug!(status = response.status, %content_type, "Relaying upstream stream");
        Ok(ProxiedStream {
            status: response.status,
            content_type,
            headers,
            body: rechunk(response.body, self.chunk_size),
        })
    }
}

fn validate_url(url: &str) -> Result<()> {
    let scheme = url.split_once("://").map(|(scheme, _)| scheme);
    match scheme {
        Some(scheme)
            if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") =>
        {
            Ok(())
        }
        _ => Err(PlaybackError::InvalidInput(
            "only http and https URLs can be proxied".to_string(),
        )),
    }
}

struct Rechunker {
    upstream: ByteStream,
    buffer: BytesMut,
    chunk_size: usize,
    finished: bool,
}

/// Re-slice an upstream body into chunks of exactly `chunk_size` bytes,
/// except for the last one. Never holds more than one chunk plus one
/// upstream frame in memory.
fn rechunk(upstream: ByteStream, chunk_size: usize) -> BoxStream<'static, Result<Bytes>> {
    let state = Rechunker {
        upstream,
        buffer: BytesMut::new(),
        chunk_size,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.buffer.len() >= state.chunk_size {
                let chunk = state.buffer.split_to(state.chunk_size).freeze();
                return Some((Ok(chunk), state));
            }
            if state.finished {
                if state.buffer.is_empty() {
                    return None;
                }
                let rest = state.buffer.split().freeze();
                return Some((Ok(rest), state));
            }

            match state.upstream.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    // Surface the error once, then end the stream.
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(PlaybackError::Upstream(e.to_string())), state));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}
