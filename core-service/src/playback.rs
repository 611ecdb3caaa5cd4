//! Playback decision: serve from disk, relay the remote source, or defer.

use crate::error::{CoreError, Result};
use crate::CoreService;
use core_library::TrackKey;
use core_playback::range::parse_range;
use core_playback::{DownloadRequest, JobStatus, PlaybackError, ProxiedStream, RangedBody};
use core_runtime::config::InProgressPolicy;
use core_runtime::events::{CoreEvent, PlaybackEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Route prefix under which cached files are served.
pub const MEDIA_ROUTE: &str = "/media";

/// A client asking to play one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRequest {
    /// Raw catalog identifier; sanitized before it touches the cache
    pub track_id: String,
    #[serde(default)]
    pub artist: String,
    pub title: String,
}

impl PlayRequest {
    pub fn new(
        track_id: impl Into<String>,
        artist: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            artist: artist.into(),
            title: title.into(),
        }
    }

    fn track_key(&self) -> Result<TrackKey> {
        if self.track_id.trim().is_empty() {
            return Err(CoreError::InvalidInput("track id is required".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(CoreError::InvalidInput("title is required".to_string()));
        }

        let key = TrackKey::sanitize(&self.track_id);
        if key.is_empty() {
            return Err(CoreError::InvalidInput(format!(
                "track id '{}' has no alphanumeric characters",
                self.track_id
            )));
        }
        Ok(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Queued,
    Downloading,
}

/// What the client should do to start playback.
///
/// Serializes as `{"source": "local"|"remote", "url": ...}` or
/// `{"status": "queued"|"downloading"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlaybackOutcome {
    Ready { source: PlaybackSource, url: String },
    Pending { status: PendingStatus },
}

impl PlaybackOutcome {
    pub fn local(url: impl Into<String>) -> Self {
        Self::Ready {
            source: PlaybackSource::Local,
            url: url.into(),
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::Ready {
            source: PlaybackSource::Remote,
            url: url.into(),
        }
    }

    pub fn pending(status: PendingStatus) -> Self {
        Self::Pending { status }
    }
}

impl CoreService {
    /// Decide how the client should play `request`.
    ///
    /// A cache hit returns the local media URL. A miss schedules a download
    /// and then, depending on [`InProgressPolicy`], either returns the
    /// resolver's direct URL or asks the caller to retry later.
    #[instrument(skip(self, request), fields(track_id = %request.track_id))]
    pub async fn play(&self, request: PlayRequest) -> Result<PlaybackOutcome> {
        let key = request.track_key()?;

        if !self.inner.config.cache_enabled {
            return self.play_remote(&key, &request).await;
        }

        if self.inner.store.lookup(&key).await.is_some() {
            return Ok(self.play_local(&key));
        }
        if self.inner.store.contains(&key) {
            warn!("Cached file vanished, dropping its index entry");
            self.inner.store.remove(&key).await?;
        }

        let status = self.inner.coordinator.ensure_cached(DownloadRequest::new(
            key.clone(),
            request.artist.clone(),
            request.title.clone(),
        ))?;
        debug!(?status, "Cache miss");

        match (status, self.inner.config.in_progress_policy) {
            (JobStatus::AlreadyCached, _) => Ok(self.play_local(&key)),
            (_, InProgressPolicy::StreamRemote) => self.play_remote(&key, &request).await,
            (JobStatus::Queued, InProgressPolicy::RetryLater) => {
                self.emit(PlaybackEvent::Deferred {
                    track_key: key.to_string(),
                });
                Ok(PlaybackOutcome::pending(PendingStatus::Queued))
            }
            (JobStatus::AlreadyInProgress, InProgressPolicy::RetryLater) => {
                self.emit(PlaybackEvent::Deferred {
                    track_key: key.to_string(),
                });
                Ok(PlaybackOutcome::pending(PendingStatus::Downloading))
            }
        }
    }

    /// Local URL a cached entry is served at.
    pub fn media_url(&self, key: &TrackKey) -> String {
        format!(
            "{}/{}",
            MEDIA_ROUTE,
            key.file_name(self.inner.store.extension())
        )
    }

    fn play_local(&self, key: &TrackKey) -> PlaybackOutcome {
        self.emit(PlaybackEvent::ServedLocal {
            track_key: key.to_string(),
        });
        PlaybackOutcome::local(self.media_url(key))
    }

    async fn play_remote(&self, key: &TrackKey, request: &PlayRequest) -> Result<PlaybackOutcome> {
        match self
            .inner
            .resolver
            .resolve(&request.artist, &request.title)
            .await
        {
            Ok(media) => {
                self.emit(PlaybackEvent::ServedRemote {
                    track_key: key.to_string(),
                });
                Ok(PlaybackOutcome::remote(media.url))
            }
            Err(e) => {
                warn!(error = %e, "Resolver failed");
                self.emit(PlaybackEvent::Unavailable {
                    track_key: key.to_string(),
                    message: e.to_string(),
                });
                Err(CoreError::Unavailable(e.to_string()))
            }
        }
    }

    /// Open a cached file by its media file name, positioned for `range`.
    ///
    /// The file name is reduced to a track key, so nothing outside the cache
    /// directory can be named.
    #[instrument(skip(self))]
    pub async fn open_cached(&self, file_name: &str, range: Option<&str>) -> Result<RangedBody> {
        let extension = self.inner.store.extension();
        let stem = file_name
            .strip_suffix(extension)
            .and_then(|rest| rest.strip_suffix('.'))
            .unwrap_or(file_name);
        let key = TrackKey::sanitize(stem);
        if key.is_empty() {
            return Err(CoreError::NotFound(file_name.to_string()));
        }

        let entry = self
            .inner
            .store
            .lookup(&key)
            .await
            .ok_or_else(|| PlaybackError::NotCached(key.to_string()))?;

        Ok(self
            .inner
            .responder
            .respond(&entry, parse_range(range))
            .await?)
    }

    /// Relay `url` without caching it.
    pub async fn proxy_stream(&self, url: &str, range: Option<&str>) -> Result<ProxiedStream> {
        Ok(self.inner.proxy.open(url, range).await?)
    }

    pub(crate) fn emit(&self, event: PlaybackEvent) {
        let _ = self.inner.events.emit(CoreEvent::Playback(event));
    }
}
