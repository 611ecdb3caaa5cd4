//! # Media Cache Module
//!
//! Turns remote media resolution into a local, idempotent asset.
//!
//! ## Overview
//!
//! Key features:
//! - Complete files and in-flight partial files in disjoint namespaces
//! - Atomic promotion by rename, then index write
//! - Single-flight background downloads on a bounded worker pool
//! - Oldest-first eviction against a byte budget
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │     DownloadCoordinator                │
//! │  - ensure_cached()                     │
//! │  - active_jobs()                       │
//! │  - wait_idle()                         │
//! └────────┬───────────────────────────────┘
//!          │
//!          ├──> MediaResolver (artist, title → URL)
//!          ├──> HttpClient (streaming fetch)
//!          ├──> CacheStore (partial → complete, index)
//!          └──> CacheEvictor (budget enforcement)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_playback::cache::{DownloadCoordinator, DownloadRequest, JobStatus};
//! use core_library::TrackKey;
//!
//! # fn example(coordinator: &DownloadCoordinator) -> core_playback::Result<()> {
//! let key = TrackKey::sanitize("1234567");
//! match coordinator.ensure_cached(DownloadRequest::new(key, "Artist", "Title"))? {
//!     JobStatus::AlreadyCached => println!("Serve from disk"),
//!     JobStatus::Queued | JobStatus::AlreadyInProgress => println!("Stream remote for now"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod eviction;
pub mod stats;
pub mod store;

// Re-export commonly used types
pub use config::CacheConfig;
pub use coordinator::{DownloadCoordinator, DownloadRequest, JobSnapshot, JobState, JobStatus};
pub use eviction::{CacheEvictor, EvictionReport};
pub use stats::CacheStats;
pub use store::CacheStore;
