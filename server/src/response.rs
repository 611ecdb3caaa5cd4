use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use core_playback::range::unsatisfiable_content_range;
use core_playback::PlaybackError;
use core_service::CoreError;
use serde_json::json;
use tracing::{error, warn};

/// Error type returned by every handler; renders as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(CoreError::InvalidInput(message.into()))
    }
}

#[must_use]
pub(crate) fn error_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        CoreError::Unavailable(_) | CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Playback(playback) => match playback {
            PlaybackError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PlaybackError::NotCached(_) | PlaybackError::Resolver(_) => StatusCode::NOT_FOUND,
            PlaybackError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            PlaybackError::Upstream(_) | PlaybackError::DownloadFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = error_status(&self.0);
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        let mut resp = (status, Json(json!({"error": self.0.to_string()}))).into_response();
        let headers = resp.headers_mut();

        if status == StatusCode::SERVICE_UNAVAILABLE {
            headers.insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        if let CoreError::Playback(PlaybackError::RangeNotSatisfiable { size, .. }) = &self.0 {
            if let Ok(value) = HeaderValue::from_str(&unsatisfiable_content_range(*size)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
        }
        resp
    }
}
