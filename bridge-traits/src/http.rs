//! HTTP Client Abstraction
//!
//! Streaming HTTP GET used both to fill the local cache and to relay remote
//! audio to clients without buffering whole tracks in memory.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// A GET request; the only verb the cache and the passthrough need.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Attach a `Range` header when one was supplied by the caller.
    pub fn range(self, range: Option<&str>) -> Self {
        match range {
            Some(value) => self.header("Range", value),
            None => self,
        }
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Body of a streamed response, yielded chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Response whose body has not been read yet.
pub struct HttpStreamResponse {
    pub status: u16,
    /// Header names are lower-cased; repeated headers keep every value.
    pub headers: Vec<(String, String)>,
    pub body: ByteStream,
}

impl HttpStreamResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for HttpStreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// HTTP client trait
///
/// Implementations must not buffer the body: `stream` returns as soon as the
/// status line and headers are available.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn first_chunk(client: &dyn HttpClient, url: &str) -> Result<()> {
///     let mut response = client.stream(HttpRequest::get(url)).await?;
///     let chunk = response.body.next().await;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue the request and return the response with an unread body stream.
    async fn stream(&self, request: HttpRequest) -> Result<HttpStreamResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::get("https://media.example.com/audio")
            .range(Some("bytes=0-99"))
            .timeout(Duration::from_secs(30));

        assert_eq!(request.url, "https://media.example.com/audio");
        assert_eq!(request.header_value("range"), Some("bytes=0-99"));
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_range_none_leaves_headers_empty() {
        let request = HttpRequest::get("https://media.example.com/audio").range(None);
        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_stream_response_header_lookup() {
        let response = HttpStreamResponse {
            status: 206,
            headers: vec![("content-type".to_string(), "audio/mp4".to_string())],
            body: Box::pin(futures::stream::empty()),
        };

        assert!(response.is_success());
        assert_eq!(response.content_type(), Some("audio/mp4"));
        assert_eq!(response.header("Content-Type"), Some("audio/mp4"));
        assert_eq!(response.header("content-length"), None);
    }
}
