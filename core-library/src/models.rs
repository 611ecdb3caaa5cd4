//! Domain models for the media cache
//!
//! This module contains the cache key, index records and liked tracks, with
//! validation and database mapping.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::path::PathBuf;

// =============================================================================
// Track Key
// =============================================================================

/// Filesystem-safe identifier naming one cache entry and one download job.
///
/// Built only through [`TrackKey::sanitize`], so the contained string is
/// always drawn from `[A-Za-z0-9]`. Distinct raw identifiers that differ only
/// in stripped characters map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct TrackKey(String);

impl TrackKey {
    /// Keep only ASCII alphanumeric characters, in order.
    ///
    /// Never fails. An identifier with no alphanumeric characters yields an
    /// empty key; callers reject those before touching the cache.
    pub fn sanitize(raw: &str) -> Self {
        Self(raw.chars().filter(char::is_ascii_alphanumeric).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `<key>.<ext>`
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0, extension)
    }

    /// `<key>.<ext>.part`
    pub fn partial_file_name(&self, extension: &str) -> String {
        format!("{}.{}{}", self.0, extension, PARTIAL_SUFFIX)
    }

    /// Recover the key from a complete entry's file name.
    ///
    /// Returns `None` for partial files, other extensions, or names that are
    /// not already sanitized.
    pub fn from_file_name(file_name: &str, extension: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(extension)?.strip_suffix('.')?;
        if stem.is_empty() || !stem.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(stem.to_string()))
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TrackKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::sanitize(&raw))
    }
}

/// Suffix reserved for in-flight downloads.
pub const PARTIAL_SUFFIX: &str = ".part";

// =============================================================================
// Cache Entry
// =============================================================================

/// Index record for one complete file in the cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub track_key: TrackKey,
    /// Absolute path of the complete file
    pub file_path: PathBuf,
    pub size_bytes: u64,
    /// Unix milliseconds at promotion time
    pub created_at: i64,
}

impl CacheEntry {
    pub fn new(track_key: TrackKey, file_path: PathBuf, size_bytes: u64, created_at: i64) -> Self {
        Self {
            track_key,
            file_path,
            size_bytes,
            created_at,
        }
    }

    /// File name relative to the cache directory.
    pub fn file_name(&self) -> Option<&str> {
        self.file_path.file_name().and_then(|name| name.to_str())
    }
}

/// Row shape of `cache_entries`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct CacheEntryRow {
    pub track_key: TrackKey,
    pub file_path: String,
    pub size_bytes: i64,
    pub created_at: i64,
}

impl From<CacheEntryRow> for CacheEntry {
    fn from(row: CacheEntryRow) -> Self {
        Self {
            track_key: row.track_key,
            file_path: PathBuf::from(row.file_path),
            size_bytes: u64::try_from(row.size_bytes).unwrap_or(0),
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Liked Track
// =============================================================================

/// A track the user liked; the source list for bulk caching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LikedTrack {
    /// Raw identifier as supplied by the catalog
    pub track_id: String,
    pub artist: String,
    pub title: String,
    /// Unix milliseconds
    pub liked_at: i64,
}

impl LikedTrack {
    pub fn new(
        track_id: impl Into<String>,
        artist: impl Into<String>,
        title: impl Into<String>,
        liked_at: i64,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            artist: artist.into(),
            title: title.into(),
            liked_at,
        }
    }

    pub fn track_key(&self) -> TrackKey {
        TrackKey::sanitize(&self.track_id)
    }

    /// Validate liked track data
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.track_id.trim().is_empty() {
            return Err("Track id cannot be empty".to_string());
        }
        if self.track_key().is_empty() {
            return Err(format!(
                "Track id '{}' contains no alphanumeric characters",
                self.track_id
            ));
        }
        if self.title.trim().is_empty() {
            return Err("Title cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_traversal() {
        let key = TrackKey::sanitize("../../etc/passwd");
        assert_eq!(key.as_str(), "etcpasswd");
        assert!(!key.file_name("m4a").contains('/'));
    }

    #[test]
    fn test_sanitize_is_deterministic() {
        assert_eq!(TrackKey::sanitize("31-35 556"), TrackKey::sanitize("31-35 556"));
        assert_eq!(TrackKey::sanitize("31-35 556").as_str(), "3135556");
    }

    #[test]
    fn test_sanitize_drops_non_ascii() {
        assert_eq!(TrackKey::sanitize("café-42").as_str(), "caf42");
        assert_eq!(TrackKey::sanitize("١٢٣").as_str(), "");
    }

    #[test]
    fn test_sanitize_empty_result_is_valid() {
        let key = TrackKey::sanitize("/../..");
        assert!(key.is_empty());
    }

    #[test]
    fn test_collision_is_same_key() {
        assert_eq!(TrackKey::sanitize("12-34"), TrackKey::sanitize("1234"));
    }

    #[test]
    fn test_file_names() {
        let key = TrackKey::sanitize("123");
        assert_eq!(key.file_name("m4a"), "123.m4a");
        assert_eq!(key.partial_file_name("m4a"), "123.m4a.part");
    }

    #[test]
    fn test_from_file_name() {
        assert_eq!(
            TrackKey::from_file_name("123.m4a", "m4a"),
            Some(TrackKey::sanitize("123"))
        );
        assert_eq!(TrackKey::from_file_name("123.m4a.part", "m4a"), None);
        assert_eq!(TrackKey::from_file_name("12-3.m4a", "m4a"), None);
        assert_eq!(TrackKey::from_file_name(".m4a", "m4a"), None);
        assert_eq!(TrackKey::from_file_name("123.mp3", "m4a"), None);
    }

    #[test]
    fn test_deserialize_sanitizes() {
        let key: TrackKey = serde_json::from_str("\"../99\"").unwrap();
        assert_eq!(key.as_str(), "99");
    }

    #[test]
    fn test_liked_track_validation() {
        assert!(LikedTrack::new("42", "Artist", "Title", 0).validate().is_ok());
        assert!(LikedTrack::new("", "Artist", "Title", 0).validate().is_err());
        assert!(LikedTrack::new("--", "Artist", "Title", 0).validate().is_err());
        assert!(LikedTrack::new("42", "Artist", " ", 0).validate().is_err());
    }
}
