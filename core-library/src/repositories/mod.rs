//! # Repository Pattern Implementation
//!
//! Traits define the interface for each repository; SQLite implementations
//! use sqlx for async database access. All operations return `Result<T>`.
//!
//! ## Available Repositories
//!
//! - `CacheIndexRepository` - Durable index of complete cache files
//! - `LikedTrackRepository` - Liked tracks, the source list for bulk caching

pub mod cache;
pub mod liked;

pub use cache::{CacheIndexRepository, SqliteCacheIndexRepository};
pub use liked::{LikedTrackRepository, SqliteLikedTrackRepository};
