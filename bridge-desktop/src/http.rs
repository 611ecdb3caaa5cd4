//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpRequest, HttpStreamResponse},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Reqwest-based HTTP client implementation
///
/// Provides HTTP operations with:
/// - Connection pooling via reqwest
/// - TLS support via rustls
/// - Incremental body streaming
///
/// No client-wide total timeout is set: a full track download can take far
/// longer than any sensible request timeout. Per-request timeouts are applied
/// when the request carries one.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_connect_timeout(Duration::from_secs(10))
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(10)
            .user_agent(concat!("tunecache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut req = self.client.get(&request.url);
        for (key, value) in request.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }
        req
    }

    fn map_send_error(error: reqwest::Error) -> BridgeError {
        if error.is_timeout() {
            BridgeError::Timeout(error.to_string())
        } else if error.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", error))
        } else {
            BridgeError::OperationFailed(error.to_string())
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn stream(&self, request: HttpRequest) -> Result<HttpStreamResponse> {
        debug!(has_range = request.header_value("range").is_some(), "Opening HTTP stream");

        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "HTTP request failed");
                Self::map_send_error(e)
            })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let body = response
            .bytes_stream()
            .map_err(|e| BridgeError::OperationFailed(format!("Body stream failed: {}", e)));

        Ok(HttpStreamResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_client_creation() {
        assert!(ReqwestHttpClient::new().is_ok());
    }

    #[test]
    fn test_build_request_carries_range_and_timeout() {
        let client = ReqwestHttpClient::new().unwrap();
        let request = client
            .build_request(
                HttpRequest::get("https://media.example.com/a.m4a")
                    .range(Some("bytes=10-"))
                    .timeout(Duration::from_secs(5)),
            )
            .build()
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.headers()["range"], "bytes=10-");
        assert_eq!(request.timeout(), Some(&Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_unreachable_host_maps_to_bridge_error() {
        let client = ReqwestHttpClient::with_connect_timeout(Duration::from_millis(200)).unwrap();
        let result = client
            .stream(HttpRequest::get("http://127.0.0.1:9/unreachable"))
            .await;

        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }
}
