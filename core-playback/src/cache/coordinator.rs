//! # Download Coordinator
//!
//! Single-flight scheduling of background downloads into the cache.
//!
//! ## Overview
//!
//! [`DownloadCoordinator::ensure_cached`] decides, under one registry lock,
//! whether a track is already cached, already being fetched, or needs a new
//! job. New jobs run as spawned tasks that each hold one permit of a shared
//! semaphore, so at most `max_concurrent_downloads` fetches run at once.
//!
//! A job resolves the track, streams it into the store's partial file, and on
//! success promotes it and runs an eviction pass. Retries happen inside the
//! job. Whatever the outcome, the job leaves the registry as its last action.

use crate::cache::config::CacheConfig;
use crate::cache::eviction::CacheEvictor;
use crate::cache::store::{remove_file_if_exists, CacheStore};
use crate::error::{PlaybackError, Result};
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::resolver::MediaResolver;
use bridge_traits::time::Clock;
use core_library::TrackKey;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, instrument, warn, Instrument};

/// What to fetch, and how to find it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub track_key: TrackKey,
    pub artist: String,
    pub title: String,
}

impl DownloadRequest {
    pub fn new(track_key: TrackKey, artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            track_key,
            artist: artist.into(),
            title: title.into(),
        }
    }
}

/// Result of [`DownloadCoordinator::ensure_cached`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// A complete entry exists; nothing was scheduled.
    AlreadyCached,
    /// A new job was registered and submitted.
    Queued,
    /// A job for this key is already registered.
    AlreadyInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a download slot
    Pending,
    InProgress,
    Done,
    Failed,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Pending | JobState::InProgress)
    }
}

/// Point-in-time view of a registered job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub track_key: TrackKey,
    pub state: JobState,
    /// Current attempt, starting at 1; 0 while pending
    pub attempt: u32,
    /// Bytes written to the partial file by the current attempt
    pub bytes_written: u64,
    /// Unix milliseconds
    pub queued_at: i64,
}

struct CoordinatorInner {
    store: Arc<CacheStore>,
    evictor: Arc<CacheEvictor>,
    resolver: Arc<dyn MediaResolver>,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    jobs: Mutex<HashMap<TrackKey, JobSnapshot>>,
    permits: Arc<Semaphore>,
    idle: Notify,
    events: Option<EventBus>,
}

/// Schedules at most one download per track key.
///
/// Cheap to clone; clones share the registry and the worker pool.
#[derive(Clone)]
pub struct DownloadCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl DownloadCoordinator {
    /// Job lifecycle events are published on `events` when one is given.
    pub fn new(
        store: Arc<CacheStore>,
        evictor: Arc<CacheEvictor>,
        resolver: Arc<dyn MediaResolver>,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
        events: Option<EventBus>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1)));
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                evictor,
                resolver,
                http,
                clock,
                config,
                jobs: Mutex::new(HashMap::new()),
                permits,
                idle: Notify::new(),
                events,
            }),
        }
    }

    /// Make sure `request.track_key` ends up in the cache.
    ///
    /// The cache check, the registry check and the registry insert happen
    /// under one lock, so concurrent callers for the same key get exactly
    /// one `Queued`. Must be called from within a Tokio runtime.
    #[instrument(skip(self, request), fields(track_key = %request.track_key))]
    pub fn ensure_cached(&self, request: DownloadRequest) -> Result<JobStatus> {
        if request.track_key.is_empty() {
            return Err(PlaybackError::InvalidInput(
                "track identifier has no alphanumeric characters".to_string(),
            ));
        }

        {
            let mut jobs = self.inner.jobs.lock();

            if self.inner.store.contains(&request.track_key) {
                return Ok(JobStatus::AlreadyCached);
            }

            // A job stays registered until its task has fully finished, so
            // Done/Failed entries still count as in progress here.
            if jobs.contains_key(&request.track_key) {
                return Ok(JobStatus::AlreadyInProgress);
            }

            jobs.insert(
                request.track_key.clone(),
                JobSnapshot {
                    track_key: request.track_key.clone(),
                    state: JobState::Pending,
                    attempt: 0,
                    bytes_written: 0,
                    queued_at: self.inner.clock.unix_timestamp_millis(),
                },
            );
        }

        debug!("Download queued");
        self.inner.emit(CacheEvent::DownloadQueued {
            track_key: request.track_key.to_string(),
        });

        let inner = self.inner.clone();
        let span = tracing::info_span!("download_job", track_key = %request.track_key);
        tokio::spawn(run_job(inner, request).instrument(span));

        Ok(JobStatus::Queued)
    }

    /// Snapshots of all registered jobs.
    pub fn active_jobs(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<JobSnapshot> = self.inner.jobs.lock().values().cloned().collect();
        jobs.sort_by_key(|job| job.queued_at);
        jobs
    }

    pub fn active_count(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    pub fn job_state(&self, key: &TrackKey) -> Option<JobState> {
        self.inner.jobs.lock().get(key).map(|job| job.state)
    }

    /// `true` while a job for `key` is registered.
    pub fn is_in_progress(&self, key: &TrackKey) -> bool {
        self.inner.jobs.lock().contains_key(key)
    }

    /// Resolves once no job is registered.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.jobs.lock().is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Empty the cache without disturbing registered jobs.
    ///
    /// Partial files of registered jobs survive, so each of those jobs still
    /// promotes its entry when it finishes.
    pub async fn clear_cache(&self) -> Result<usize> {
        let inner = self.inner.clone();
        self.inner
            .store
            .clear_except(move |key| inner.jobs.lock().contains_key(key))
            .await
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("active_jobs", &self.active_count())
            .field("available_permits", &self.inner.permits.available_permits())
            .finish()
    }
}

/// Drops the job from the registry when the task ends, including on panic.
struct JobGuard {
    inner: Arc<CoordinatorInner>,
    key: TrackKey,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let now_idle = {
            let mut jobs = self.inner.jobs.lock();
            jobs.remove(&self.key);
            jobs.is_empty()
        };
        if now_idle {
            self.inner.idle.notify_waiters();
        }
    }
}

async fn run_job(inner: Arc<CoordinatorInner>, request: DownloadRequest) {
    let key = request.track_key.clone();
    let _guard = JobGuard {
        inner: inner.clone(),
        key: key.clone(),
    };

    let _permit = match inner.permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            error!("Download pool closed");
            inner.set_state(&key, JobState::Failed);
            return;
        }
    };

    // Another path may have filled the entry while this job waited.
    if inner.store.contains(&key) {
        debug!("Entry already cached, skipping download");
        inner.set_state(&key, JobState::Done);
        return;
    }

    inner.set_state(&key, JobState::InProgress);
    let partial_path = inner.store.partial_path(&key);

    let outcome = match inner.download_with_retry(&request, &partial_path).await {
        Ok(_) => inner.store.promote(&key, &partial_path).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(entry) => {
            info!(size_bytes = entry.size_bytes, "Download cached");
            inner.set_state(&key, JobState::Done);
            inner.emit(CacheEvent::DownloadCompleted {
                track_key: key.to_string(),
                size_bytes: entry.size_bytes,
            });

            if let Err(e) = inner
                .evictor
                .evict_if_over_budget(inner.config.max_cache_size_bytes)
                .await
            {
                warn!(error = %e, "Eviction after download failed");
            }
        }
        Err(e) => {
            warn!(error = %e, "Download failed");
            if let Err(cleanup) = remove_file_if_exists(&partial_path).await {
                warn!(error = %cleanup, "Failed to remove partial download");
            }
            let attempts = inner.jobs.lock().get(&key).map(|job| job.attempt).unwrap_or(0);
            inner.set_state(&key, JobState::Failed);
            inner.emit(CacheEvent::DownloadFailed {
                track_key: key.to_string(),
                message: e.to_string(),
                attempts,
            });
        }
    }
}

impl CoordinatorInner {
    fn emit(&self, event: CacheEvent) {
        if let Some(events) = &self.events {
            let _ = events.emit(CoreEvent::Cache(event));
        }
    }

    fn update_job(&self, key: &TrackKey, update: impl FnOnce(&mut JobSnapshot)) {
        if let Some(job) = self.jobs.lock().get_mut(key) {
            update(job);
        }
    }

    fn set_state(&self, key: &TrackKey, state: JobState) {
        self.update_job(key, |job| job.state = state);
    }

    /// Download with retry logic.
    async fn download_with_retry(
        &self,
        request: &DownloadRequest,
        partial_path: &Path,
    ) -> Result<u64> {
        let max_attempts = self.config.max_retry_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            self.update_job(&request.track_key, |job| {
                job.attempt = attempt;
                job.bytes_written = 0;
            });
            self.emit(CacheEvent::DownloadStarted {
                track_key: request.track_key.to_string(),
                attempt,
            });

            match self.fetch_once(request, partial_path).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Download attempt failed"
                    );
                    last_error = Some(e);

                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_delay(attempt)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PlaybackError::DownloadFailed("Download failed after retries".to_string())
        }))
    }

    /// One attempt: resolve, then stream the body into a truncated partial file.
    async fn fetch_once(&self, request: &DownloadRequest, partial_path: &Path) -> Result<u64> {
        let media = self
            .resolver
            .resolve(&request.artist, &request.title)
            .await
            .map_err(|e| PlaybackError::Resolver(e.to_string()))?;

        let response = self
            .http
            .stream(HttpRequest::get(media.url))
            .await
            .map_err(|e| PlaybackError::Upstream(e.to_string()))?;
        if !response.is_success() {
            return Err(PlaybackError::DownloadFailed(format!(
                "upstream returned status {}",
                response.status
            )));
        }

        let file = File::create(partial_path)
            .await
            .map_err(|e| PlaybackError::Store(format!("create partial file: {}", e)))?;
        let mut writer = BufWriter::new(file);
        let mut body = response.body;
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| PlaybackError::Upstream(e.to_string()))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| PlaybackError::Store(format!("write partial file: {}", e)))?;
            written += chunk.len() as u64;
            self.update_job(&request.track_key, |job| job.bytes_written = written);
        }

        writer
            .flush()
            .await
            .map_err(|e| PlaybackError::Store(format!("flush partial file: {}", e)))?;
        writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| PlaybackError::Store(format!("sync partial file: {}", e)))?;

        if written == 0 {
            return Err(PlaybackError::DownloadFailed(
                "upstream returned an empty body".to_string(),
            ));
        }

        Ok(written)
    }
}
