//! # Library Persistence Module
//!
//! Owns the SQLite database behind the media cache and provides repository
//! patterns for data access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pooling and embedded migrations
//! - Domain models: [`TrackKey`](models::TrackKey), [`CacheEntry`](models::CacheEntry),
//!   [`LikedTrack`](models::LikedTrack)
//! - The durable cache index and the liked-tracks list

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{CacheEntry, LikedTrack, TrackKey};
