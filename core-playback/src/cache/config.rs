//! Cache configuration

use std::time::Duration;

/// Configuration for the cache store, download coordinator and evictor.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Size budget enforced after every promotion (default: 2GB)
    pub max_cache_size_bytes: u64,

    /// Number of concurrent downloads allowed (default: 2)
    pub max_concurrent_downloads: usize,

    /// Attempts per download job (default: 3)
    pub max_retry_attempts: u32,

    /// Delay before the second attempt; doubles for each later one
    pub retry_base_delay: Duration,

    /// Extension of complete entries, without the dot (default: m4a)
    pub file_extension: String,

    /// Content type served for cached files (default: audio/mp4)
    pub content_type: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size_bytes: 2 * 1024 * 1024 * 1024, // 2GB
            max_concurrent_downloads: 2,
            max_retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            file_extension: "m4a".to_string(),
            content_type: "audio/mp4".to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum cache size.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_cache_size_bytes = bytes;
        self
    }

    /// Set maximum concurrent downloads.
    pub fn with_max_concurrent_downloads(mut self, count: usize) -> Self {
        self.max_concurrent_downloads = count;
        self
    }

    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Set the stored audio format.
    pub fn with_format(
        mut self,
        extension: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        self.file_extension = extension.into();
        self.content_type = content_type.into();
        self
    }

    /// Backoff before attempt `attempt + 1`, given that `attempt` just failed.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_base_delay.saturating_mul(2u32.pow(exponent))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_cache_size_bytes == 0 {
            return Err("max_cache_size_bytes must be greater than 0".to_string());
        }

        if self.max_concurrent_downloads == 0 {
            return Err("max_concurrent_downloads must be at least 1".to_string());
        }

        if self.max_retry_attempts == 0 {
            return Err("max_retry_attempts must be at least 1".to_string());
        }

        if self.file_extension.is_empty()
            || !self.file_extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err("file_extension must be non-empty and alphanumeric".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_cache_size_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.max_concurrent_downloads, 2);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.file_extension, "m4a");
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new()
            .with_max_size(1024 * 1024 * 1024)
            .with_max_concurrent_downloads(4)
            .with_max_retry_attempts(5)
            .with_format("webm", "audio/webm");

        assert_eq!(config.max_cache_size_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.max_concurrent_downloads, 4);
        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.content_type, "audio/webm");
    }

    #[test]
    fn test_config_validation() {
        let valid_config = CacheConfig::default();
        assert!(valid_config.validate().is_ok());

        let invalid_size = CacheConfig::default().with_max_size(0);
        assert!(invalid_size.validate().is_err());

        let invalid_downloads = CacheConfig::default().with_max_concurrent_downloads(0);
        assert!(invalid_downloads.validate().is_err());

        let invalid_ext = CacheConfig::default().with_format("m4a/..", "audio/mp4");
        assert!(invalid_ext.validate().is_err());
    }

    #[test]
    fn test_retry_delay_doubles() {
        let config = CacheConfig::default().with_retry_base_delay(Duration::from_millis(100));

        assert_eq!(config.retry_delay(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay(2), Duration::from_millis(200));
        assert_eq!(config.retry_delay(3), Duration::from_millis(400));
    }
}
