//! # Media Cache & Serving Module
//!
//! The local media cache and the two ways audio bytes reach a client.
//!
//! ## Overview
//!
//! This module handles:
//! - The cache store: complete files, partial downloads and the index
//! - Single-flight background downloads with bounded concurrency
//! - Oldest-first eviction against a size budget
//! - Byte-range serving of cached files
//! - Passthrough relay of remote streams

pub mod cache;
pub mod error;
pub mod proxy;
pub mod range;

pub use cache::{
    CacheConfig, CacheEvictor, CacheStats, CacheStore, DownloadCoordinator, DownloadRequest,
    EvictionReport, JobSnapshot, JobState, JobStatus,
};
pub use error::{PlaybackError, Result};
pub use proxy::{ProxiedStream, RemoteStreamProxy};
pub use range::{parse_range, ByteRange, RangeRequest, RangeResponder, RangedBody};
