//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP client, media
//! resolver, clock) and a [`CoreConfig`] into the media cache. Servers
//! typically enable the `desktop-shims` feature, which builds the bridges from
//! `bridge-desktop`; tests inject the in-memory fakes from `bridge-traits`.

pub mod admin;
pub mod error;
pub mod playback;

pub use admin::{BulkCacheSummary, LikedTrackStatus};
pub use error::{CoreError, Result};
pub use playback::{PendingStatus, PlayRequest, PlaybackOutcome, PlaybackSource};

use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    resolver::MediaResolver,
    time::{Clock, SystemClock},
};
use core_library::db::{create_pool, health_check, DatabaseConfig};
use core_library::repositories::{
    LikedTrackRepository, SqliteCacheIndexRepository, SqliteLikedTrackRepository,
};
use core_playback::{
    CacheConfig, CacheEvictor, CacheStore, DownloadCoordinator, RangeResponder,
    RemoteStreamProxy,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use sqlx::SqlitePool;
use tracing::info;

const EVENT_BUS_CAPACITY: usize = 256;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub resolver: Arc<dyn MediaResolver>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles, using the
    /// system clock.
    pub fn new(http_client: Arc<dyn HttpClient>, resolver: Arc<dyn MediaResolver>) -> Self {
        Self {
            http_client,
            resolver,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Desktop bridges: reqwest for HTTP, `yt-dlp` for resolution.
    #[cfg(feature = "desktop-shims")]
    pub fn desktop(config: &CoreConfig) -> Result<Self> {
        use bridge_desktop::{ReqwestHttpClient, YtDlpResolver};

        let http_client = ReqwestHttpClient::new()?;
        let resolver = YtDlpResolver::new(config.resolver.executable.clone())
            .with_format(config.resolver.format.clone())
            .with_timeout(config.resolver.timeout);

        Ok(Self::new(Arc::new(http_client), Arc::new(resolver)))
    }
}

/// Cache settings derived from the service configuration.
pub fn cache_config(config: &CoreConfig) -> CacheConfig {
    CacheConfig::new()
        .with_max_size(config.cache_budget_bytes)
        .with_max_concurrent_downloads(config.downloads.max_concurrent)
        .with_max_retry_attempts(config.downloads.max_retry_attempts)
        .with_retry_base_delay(config.downloads.retry_base_delay)
        .with_format(config.audio.extension.clone(), config.audio.content_type.clone())
}

struct ServiceInner {
    config: CoreConfig,
    pool: SqlitePool,
    store: Arc<CacheStore>,
    coordinator: DownloadCoordinator,
    responder: RangeResponder,
    proxy: RemoteStreamProxy,
    resolver: Arc<dyn MediaResolver>,
    liked: Arc<dyn LikedTrackRepository>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

/// Primary façade exposed to the HTTP layer.
///
/// Cheap to clone; all clones share one cache store and one download pool.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Open the database and cache directory and start the download pool.
    pub async fn bootstrap(config: CoreConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;

        let cache_config = cache_config(&config);
        cache_config
            .validate()
            .map_err(CoreError::InitializationFailed)?;

        let events = EventBus::new(EVENT_BUS_CAPACITY);
        let store = Arc::new(
            CacheStore::open(
                &config.cache_dir,
                cache_config.file_extension.clone(),
                Arc::new(SqliteCacheIndexRepository::new(pool.clone())),
                deps.clock.clone(),
            )
            .await?,
        );
        let evictor = Arc::new(CacheEvictor::new(store.clone()).with_events(events.clone()));
        let responder = RangeResponder::new(cache_config.content_type.clone());
        let proxy = RemoteStreamProxy::new(deps.http_client.clone())
            .with_chunk_size(config.proxy_chunk_size);
        let coordinator = DownloadCoordinator::new(
            store.clone(),
            evictor,
            deps.resolver.clone(),
            deps.http_client.clone(),
            deps.clock.clone(),
            cache_config,
            Some(events.clone()),
        );

        info!(
            cache_dir = %store.dir().display(),
            entries = store.len(),
            budget_bytes = config.cache_budget_bytes,
            cache_enabled = config.cache_enabled,
            "Core service ready"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                liked: Arc::new(SqliteLikedTrackRepository::new(pool.clone())),
                pool,
                store,
                coordinator,
                responder,
                proxy,
                resolver: deps.resolver,
                clock: deps.clock,
                events,
            }),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Subscribe to cache and playback events.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    pub fn coordinator(&self) -> &DownloadCoordinator {
        &self.inner.coordinator
    }

    /// Verify the database answers.
    pub async fn health_check(&self) -> Result<()> {
        health_check(&self.inner.pool).await?;
        Ok(())
    }

    /// Wait for in-flight downloads, then close the database pool.
    pub async fn shutdown(&self) {
        info!(
            active_downloads = self.inner.coordinator.active_count(),
            "Waiting for downloads before shutdown"
        );
        self.inner.coordinator.wait_idle().await;
        self.inner.pool.close().await;
        info!("Core service stopped");
    }
}
