use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use core_playback::{CacheStats, RangedBody};
use core_service::{BulkCacheSummary, LikedTrackStatus, PlayRequest, PlaybackOutcome};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::response::ApiError;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

fn range_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
}

pub(crate) async fn ping() -> &'static str {
    "pong"
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PlayQuery {
    id: String,
    artist: String,
    title: String,
}

pub(crate) async fn play(
    State(state): State<AppState>,
    Query(query): Query<PlayQuery>,
) -> ApiResult<Json<PlaybackOutcome>> {
    let outcome = state
        .service
        .play(PlayRequest::new(query.id, query.artist, query.title))
        .await?;
    Ok(Json(outcome))
}

pub(crate) async fn media(
    State(state): State<AppState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let body = state
        .service
        .open_cached(&file, range_header(&headers))
        .await?;
    Ok(ranged_response(body))
}

fn ranged_response(body: RangedBody) -> Response {
    let status = if body.is_partial() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let content_range = body.content_range();
    debug!(status = status.as_u16(), length = body.content_length, "Serving media");

    let mut resp = Response::new(Body::from_stream(ReaderStream::new(body.reader)));
    *resp.status_mut() = status;

    let headers = resp.headers_mut();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.content_length));
    if let Ok(value) = HeaderValue::from_str(&body.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(value) = content_range.and_then(|range| HeaderValue::from_str(&range).ok()) {
        headers.insert(header::CONTENT_RANGE, value);
    }
    resp
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProxyQuery {
    url: Option<String>,
}

pub(crate) async fn stream_proxy(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let url = query
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("url is required"))?;

    let upstream = state
        .service
        .proxy_stream(&url, range_header(&headers))
        .await?;

    let mut resp = Response::new(Body::from_stream(upstream.body));
    *resp.status_mut() = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let out = resp.headers_mut();
    for (name, value) in &upstream.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            out.append(name, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&upstream.content_type) {
        out.insert(header::CONTENT_TYPE, value);
    }
    Ok(resp)
}

/// Body of `POST /likes` and `POST /cache`.
#[derive(Debug, Deserialize)]
pub(crate) struct TrackBody {
    id: String,
    #[serde(default)]
    artist: String,
    title: String,
}

pub(crate) async fn list_likes(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<LikedTrackStatus>>> {
    Ok(Json(state.service.liked_tracks().await?))
}

pub(crate) async fn like(
    State(state): State<AppState>,
    Json(body): Json<TrackBody>,
) -> ApiResult<impl IntoResponse> {
    let track = state
        .service
        .like_track(&body.id, &body.artist, &body.title)
        .await?;
    Ok((StatusCode::CREATED, Json(track)))
}

pub(crate) async fn unlike(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let removed = state.service.unlike_track(&id).await?;
    Ok(Json(json!({ "removed": removed })))
}

pub(crate) async fn cache_track(
    State(state): State<AppState>,
    Json(body): Json<TrackBody>,
) -> ApiResult<Json<Value>> {
    let status = state
        .service
        .cache_track(&body.id, &body.artist, &body.title)?;
    Ok(Json(json!({ "status": status })))
}

pub(crate) async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.service.cache_stats())
}

pub(crate) async fn cache_liked(
    State(state): State<AppState>,
) -> ApiResult<Json<BulkCacheSummary>> {
    Ok(Json(state.service.cache_all_liked().await?))
}

pub(crate) async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let removed = state.service.clear_cache().await?;
    Ok(Json(json!({ "removed": removed })))
}

pub(crate) async fn delete_cached(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let removed = state.service.delete_cached(&id).await?;
    Ok(Json(json!({ "removed": removed })))
}
