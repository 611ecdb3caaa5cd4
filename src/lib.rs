//! Workspace façade crate.
//!
//! Re-exports the pieces a host needs to embed the media cache without
//! depending on each workspace crate individually. The HTTP server lives in
//! the `tunecache-server` package.

pub use core_library::{CacheEntry, LikedTrack, TrackKey};
pub use core_playback::{
    CacheConfig, CacheStats, DownloadCoordinator, DownloadRequest, JobStatus, PlaybackError,
};
pub use core_runtime::config::{CoreConfig, InProgressPolicy};
pub use core_service::{
    CoreDependencies, CoreError, CoreService, PlayRequest, PlaybackOutcome,
};
