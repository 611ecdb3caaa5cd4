//! # Playback Error Types
//!
//! Error types for the cache store, download pipeline and byte serving.

use thiserror::Error;

/// Errors that can occur in the cache subsystem.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Input Errors
    // ========================================================================
    /// Caller supplied something unusable (empty id, non-http URL, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // Source Errors
    // ========================================================================
    /// The media resolver could not produce a source (no match, geo-block,
    /// network failure).
    #[error("Track unavailable: {0}")]
    Resolver(String),

    /// Upstream transport failed while opening or relaying a stream.
    #[error("Upstream stream failed: {0}")]
    Upstream(String),

    /// Upstream answered but the body was unusable (error status, empty).
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    // ========================================================================
    // Cache Errors
    // ========================================================================
    /// Disk full, permission denied, failed rename.
    #[error("Cache store error: {0}")]
    Store(String),

    /// No complete entry exists for the key.
    #[error("Track not cached: {0}")]
    NotCached(String),

    // ========================================================================
    // Range Errors
    // ========================================================================
    /// Requested start is at or beyond the end of the file.
    #[error("Range not satisfiable: start {start} for size {size}")]
    RangeNotSatisfiable { start: u64, size: u64 },

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cache index error: {0}")]
    LibraryError(#[from] core_library::error::LibraryError),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::Upstream(_) | PlaybackError::Store(_) | PlaybackError::IoError(_) => {
                true
            }
            PlaybackError::LibraryError(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if this error is due to network issues.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::Upstream(_)
                | PlaybackError::Resolver(_)
                | PlaybackError::DownloadFailed(_)
        )
    }

    /// Returns `true` if the caller can fix the request.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::InvalidInput(_) | PlaybackError::RangeNotSatisfiable { .. }
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
