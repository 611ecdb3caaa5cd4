//! Liked tracks and cache administration.

use crate::error::{CoreError, Result};
use crate::CoreService;
use core_library::{LibraryError, LikedTrack, TrackKey};
use core_playback::{CacheStats, DownloadRequest, JobStatus};
use core_runtime::events::{CacheEvent, CoreEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// A liked track as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikedTrackStatus {
    #[serde(flatten)]
    pub track: LikedTrack,
    /// A complete cache entry exists for the track
    pub cached: bool,
}

/// Outcome of queueing every liked track for caching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCacheSummary {
    pub queued: usize,
    pub already_cached: usize,
    pub already_in_progress: usize,
    /// Tracks whose id sanitizes to nothing or that could not be scheduled
    pub skipped: usize,
}

impl CoreService {
    /// Add a track to the liked list, or refresh it if already liked.
    ///
    /// With `cache_on_like` set, the track is also queued for caching. A
    /// failure to queue is logged and does not undo the like.
    #[instrument(skip(self, artist, title))]
    pub async fn like_track(
        &self,
        track_id: &str,
        artist: &str,
        title: &str,
    ) -> Result<LikedTrack> {
        let track = LikedTrack::new(
            track_id.trim(),
            artist.trim(),
            title.trim(),
            self.inner.clock.unix_timestamp_millis(),
        );

        self.inner.liked.like(&track).await.map_err(|e| match e {
            LibraryError::InvalidInput { message, .. } => CoreError::InvalidInput(message),
            other => other.into(),
        })?;

        if self.inner.config.cache_enabled && self.inner.config.cache_on_like {
            let request =
                DownloadRequest::new(track.track_key(), track.artist.clone(), track.title.clone());
            match self.inner.coordinator.ensure_cached(request) {
                Ok(status) => debug!(?status, "Liked track queued for caching"),
                Err(e) => warn!(error = %e, "Could not queue liked track"),
            }
        }
        Ok(track)
    }

    /// Queue one track for caching.
    #[instrument(skip(self, artist, title))]
    pub fn cache_track(&self, track_id: &str, artist: &str, title: &str) -> Result<JobStatus> {
        let key = TrackKey::sanitize(track_id);
        if key.is_empty() {
            return Err(CoreError::InvalidInput(format!(
                "track id '{}' has no alphanumeric characters",
                track_id
            )));
        }
        if title.trim().is_empty() {
            return Err(CoreError::InvalidInput("title is required".to_string()));
        }

        let request = DownloadRequest::new(key, artist.trim(), title.trim());
        Ok(self.inner.coordinator.ensure_cached(request)?)
    }

    /// Returns `true` if the track was liked.
    pub async fn unlike_track(&self, track_id: &str) -> Result<bool> {
        Ok(self.inner.liked.unlike(track_id.trim()).await?)
    }

    /// Liked tracks, newest first, each flagged with whether it is cached.
    pub async fn liked_tracks(&self) -> Result<Vec<LikedTrackStatus>> {
        let tracks = self.inner.liked.list().await?;
        Ok(tracks
            .into_iter()
            .map(|track| LikedTrackStatus {
                cached: self.inner.store.contains(&track.track_key()),
                track,
            })
            .collect())
    }

    /// Call `ensure_cached` for every liked track.
    #[instrument(skip(self))]
    pub async fn cache_all_liked(&self) -> Result<BulkCacheSummary> {
        let mut summary = BulkCacheSummary::default();

        for track in self.inner.liked.list().await? {
            let key = track.track_key();
            if key.is_empty() {
                summary.skipped += 1;
                continue;
            }

            let request = DownloadRequest::new(key, track.artist, track.title);
            match self.inner.coordinator.ensure_cached(request) {
                Ok(JobStatus::Queued) => summary.queued += 1,
                Ok(JobStatus::AlreadyCached) => summary.already_cached += 1,
                Ok(JobStatus::AlreadyInProgress) => summary.already_in_progress += 1,
                Err(e) => {
                    warn!(track_id = %track.track_id, error = %e, "Could not queue liked track");
                    summary.skipped += 1;
                }
            }
        }

        info!(
            queued = summary.queued,
            already_cached = summary.already_cached,
            already_in_progress = summary.already_in_progress,
            skipped = summary.skipped,
            "Queued liked tracks"
        );
        Ok(summary)
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.store.len(),
            total_bytes: self.inner.store.total_size_bytes(),
            budget_bytes: self.inner.config.cache_budget_bytes,
            active_downloads: self.inner.coordinator.active_jobs(),
        }
    }

    /// Remove every cached entry and every abandoned partial file.
    /// In-flight downloads keep running and recreate their entry when they
    /// finish.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<usize> {
        let removed = self.inner.coordinator.clear_cache().await?;
        let _ = self.inner.events.emit(CoreEvent::Cache(CacheEvent::Cleared {
            entries_removed: removed,
        }));
        Ok(removed)
    }

    /// Remove one cached entry. Returns `false` if it was not cached.
    #[instrument(skip(self))]
    pub async fn delete_cached(&self, track_id: &str) -> Result<bool> {
        let key = TrackKey::sanitize(track_id);
        if key.is_empty() {
            return Err(CoreError::InvalidInput(format!(
                "track id '{}' has no alphanumeric characters",
                track_id
            )));
        }

        let removed = self.inner.store.remove(&key).await?.is_some();
        if removed {
            let _ = self.inner.events.emit(CoreEvent::Cache(CacheEvent::EntryRemoved {
                track_key: key.to_string(),
            }));
        }
        Ok(removed)
    }
}
