//! # Core Configuration Module
//!
//! Provides configuration management for the cache service.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance holding every setting the core needs. Validation is fail-fast:
//! an invalid value is rejected before any directory or database is touched.
//!
//! Host capabilities (HTTP client, media resolver, clock) are not part of the
//! configuration; they are injected separately when the service is built.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/tunecache/index.db")
//!     .cache_dir("/var/cache/tunecache")
//!     .cache_size_mb(4096)
//!     .build()?;
//! ```
//!
//! ## Environment
//!
//! [`CoreConfig::from_env`] starts from the defaults and overlays the
//! `TUNECACHE_*` variables listed in [`env_keys`].

use crate::error::{Error, Result};
use crate::logging::{parse_log_level, LogFormat, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum accepted cache budget (100 GB).
const MAX_CACHE_SIZE_MB: u64 = 100_000;
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Environment variable names read by [`CoreConfig::from_env`].
pub mod env_keys {
    pub const CACHE_DIR: &str = "TUNECACHE_CACHE_DIR";
    pub const DATABASE: &str = "TUNECACHE_DATABASE";
    pub const CACHE_MB: &str = "TUNECACHE_CACHE_MB";
    pub const CACHE_ENABLED: &str = "TUNECACHE_CACHE_ENABLED";
    pub const CACHE_ON_LIKE: &str = "TUNECACHE_CACHE_ON_LIKE";
    pub const WORKERS: &str = "TUNECACHE_WORKERS";
    pub const RETRIES: &str = "TUNECACHE_RETRIES";
    pub const IN_PROGRESS_POLICY: &str = "TUNECACHE_IN_PROGRESS_POLICY";
    pub const BIND: &str = "TUNECACHE_BIND";
    pub const YTDLP: &str = "TUNECACHE_YTDLP";
    pub const LOG_FORMAT: &str = "TUNECACHE_LOG_FORMAT";
    pub const LOG_LEVEL: &str = "TUNECACHE_LOG_LEVEL";
}

/// What a playback request gets while its track is still being downloaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InProgressPolicy {
    /// Queue the download and hand back the resolver's direct URL right away.
    #[default]
    StreamRemote,
    /// Queue the download and tell the caller to retry later.
    RetryLater,
}

impl std::str::FromStr for InProgressPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" | "stream_remote" | "remote" => Ok(Self::StreamRemote),
            "retry" | "retry_later" => Ok(Self::RetryLater),
            other => Err(Error::Config(format!(
                "Unknown in-progress policy '{}'; expected 'stream' or 'retry'",
                other
            ))),
        }
    }
}

/// Download worker pool settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Concurrent fetches (worker pool size)
    pub max_concurrent: usize,
    /// Attempts per job before it is declared failed
    pub max_retry_attempts: u32,
    /// First backoff delay; doubles on each retry
    pub retry_base_delay: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            max_retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Stored audio format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormat {
    /// File extension of complete cache entries (no leading dot)
    pub extension: String,
    /// Content type served for cached files
    pub content_type: String,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            extension: "m4a".to_string(),
            content_type: "audio/mp4".to_string(),
        }
    }
}

/// External `yt-dlp` resolver settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub executable: PathBuf,
    pub format: String,
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("yt-dlp"),
            format: "bestaudio[ext=m4a]/best".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Core configuration for the cache service.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file holding the cache index
    pub database_path: PathBuf,

    /// Directory owned by the cache store
    pub cache_dir: PathBuf,

    /// Size budget enforced by eviction
    pub cache_budget_bytes: u64,

    /// When false every playback is served from the remote URL
    pub cache_enabled: bool,

    /// Queue a download whenever a track is liked
    pub cache_on_like: bool,

    pub in_progress_policy: InProgressPolicy,

    pub downloads: DownloadSettings,

    pub audio: AudioFormat,

    /// Chunk size used when relaying remote streams
    pub proxy_chunk_size: usize,

    /// Address the HTTP surface listens on
    pub bind_address: SocketAddr,

    pub resolver: ResolverConfig,

    pub logging: LoggingConfig,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Build a configuration from `TUNECACHE_*` environment variables.
    ///
    /// Paths default to `./cache` and `./cache/index.db` when unset.
    pub fn from_env() -> Result<CoreConfig> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<CoreConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let cache_dir = get(env_keys::CACHE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("cache"));
        let database_path = get(env_keys::DATABASE)
            .map(PathBuf::from)
            .unwrap_or_else(|| cache_dir.join("index.db"));

        let mut builder = CoreConfig::builder()
            .database_path(database_path)
            .cache_dir(cache_dir);

        if let Some(value) = get(env_keys::CACHE_MB) {
            builder = builder.cache_size_mb(parse_number(env_keys::CACHE_MB, &value)?);
        }
        if let Some(value) = get(env_keys::CACHE_ENABLED) {
            builder = builder.cache_enabled(parse_bool(env_keys::CACHE_ENABLED, &value)?);
        }
        if let Some(value) = get(env_keys::CACHE_ON_LIKE) {
            builder = builder.cache_on_like(parse_bool(env_keys::CACHE_ON_LIKE, &value)?);
        }
        if let Some(value) = get(env_keys::WORKERS) {
            builder = builder.max_concurrent_downloads(parse_number(env_keys::WORKERS, &value)?);
        }
        if let Some(value) = get(env_keys::RETRIES) {
            builder = builder.max_retry_attempts(parse_number(env_keys::RETRIES, &value)?);
        }
        if let Some(value) = get(env_keys::IN_PROGRESS_POLICY) {
            builder = builder.in_progress_policy(value.parse()?);
        }
        if let Some(value) = get(env_keys::BIND) {
            let addr = value.trim().parse().map_err(|e| {
                Error::Config(format!("{} is not a socket address: {}", env_keys::BIND, e))
            })?;
            builder = builder.bind_address(addr);
        }
        if let Some(value) = get(env_keys::YTDLP) {
            builder = builder.resolver(ResolverConfig {
                executable: PathBuf::from(value),
                ..ResolverConfig::default()
            });
        }

        let mut logging = LoggingConfig::default();
        if let Some(value) = get(env_keys::LOG_FORMAT) {
            logging = logging.with_format(value.parse::<LogFormat>()?);
        }
        if let Some(value) = get(env_keys::LOG_LEVEL) {
            logging = logging.with_level(parse_log_level(&value)?);
        }

        builder.logging(logging).build()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path and cache directory are not empty
    /// - Cache budget is > 0 and at most 100 GB
    /// - Worker pool and retry counts are at least 1
    /// - Audio extension is a plain alphanumeric extension
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.cache_budget_bytes == 0 {
            return Err(Error::Config("Cache size must be greater than 0 bytes".to_string()));
        }

        if self.cache_budget_bytes > MAX_CACHE_SIZE_MB * BYTES_PER_MB {
            return Err(Error::Config(
                "Cache size exceeds maximum of 100GB (100,000 MB)".to_string(),
            ));
        }

        if self.downloads.max_concurrent == 0 {
            return Err(Error::Config("At least one download worker is required".to_string()));
        }

        if self.downloads.max_retry_attempts == 0 {
            return Err(Error::Config("Retry attempts must be at least 1".to_string()));
        }

        let extension = &self.audio.extension;
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Config(format!(
                "Audio extension '{}' must be non-empty and alphanumeric",
                extension
            )));
        }

        if self.proxy_chunk_size == 0 {
            return Err(Error::Config("Proxy chunk size must be greater than 0".to_string()));
        }

        Ok(())
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{} must be a number: {}", key, e)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    cache_budget_bytes: Option<u64>,
    cache_enabled: Option<bool>,
    cache_on_like: Option<bool>,
    in_progress_policy: Option<InProgressPolicy>,
    downloads: DownloadSettings,
    audio: Option<AudioFormat>,
    proxy_chunk_size: Option<usize>,
    bind_address: Option<SocketAddr>,
    resolver: Option<ResolverConfig>,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    /// Sets the database path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the cache directory (required).
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Sets the cache budget in megabytes. Default: 2048 MB.
    pub fn cache_size_mb(mut self, size_mb: u64) -> Self {
        self.cache_budget_bytes = Some(size_mb.saturating_mul(BYTES_PER_MB));
        self
    }

    /// Sets the cache budget in bytes.
    pub fn cache_budget_bytes(mut self, bytes: u64) -> Self {
        self.cache_budget_bytes = Some(bytes);
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }

    /// Queue a download when a track is liked. Default: true.
    pub fn cache_on_like(mut self, enabled: bool) -> Self {
        self.cache_on_like = Some(enabled);
        self
    }

    pub fn in_progress_policy(mut self, policy: InProgressPolicy) -> Self {
        self.in_progress_policy = Some(policy);
        self
    }

    pub fn max_concurrent_downloads(mut self, workers: usize) -> Self {
        self.downloads.max_concurrent = workers;
        self
    }

    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.downloads.max_retry_attempts = attempts;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.downloads.retry_base_delay = delay;
        self
    }

    pub fn audio_format(
        mut self,
        extension: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        self.audio = Some(AudioFormat {
            extension: extension.into(),
            content_type: content_type.into(),
        });
        self
    }

    pub fn proxy_chunk_size(mut self, size: usize) -> Self {
        self.proxy_chunk_size = Some(size);
        self
    }

    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    pub fn resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if a required path is missing or a value is invalid.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let config = CoreConfig {
            database_path,
            cache_dir,
            cache_budget_bytes: self.cache_budget_bytes.unwrap_or(2048 * BYTES_PER_MB),
            cache_enabled: self.cache_enabled.unwrap_or(true),
            cache_on_like: self.cache_on_like.unwrap_or(true),
            in_progress_policy: self.in_progress_policy.unwrap_or_default(),
            downloads: self.downloads,
            audio: self.audio.unwrap_or_default(),
            proxy_chunk_size: self.proxy_chunk_size.unwrap_or(8192),
            bind_address: self
                .bind_address
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 4999))),
            resolver: self.resolver.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
