//! Database repository for the cache index
//!
//! One row per complete file in the cache directory. Rows are written by the
//! cache store only, in the same operation that renames or deletes the file.

use crate::error::{LibraryError, Result};
use crate::models::{CacheEntry, CacheEntryRow, TrackKey};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

/// Repository trait for cache index operations.
#[async_trait]
pub trait CacheIndexRepository: Send + Sync {
    /// Insert a row, or replace the existing row for the same key.
    async fn upsert(&self, entry: &CacheEntry) -> Result<()>;

    async fn find(&self, track_key: &TrackKey) -> Result<Option<CacheEntry>>;

    /// All rows, oldest first; ties keep insertion order.
    async fn find_all(&self) -> Result<Vec<CacheEntry>>;

    /// Returns `true` if a row was deleted.
    async fn delete(&self, track_key: &TrackKey) -> Result<bool>;

    /// Delete every row, returning how many were removed.
    async fn clear(&self) -> Result<u64>;

    async fn total_size(&self) -> Result<u64>;

    async fn count(&self) -> Result<u64>;
}

/// SQLite implementation of CacheIndexRepository.
pub struct SqliteCacheIndexRepository {
    pool: SqlitePool,
}

impl SqliteCacheIndexRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn size_to_db(size_bytes: u64) -> Result<i64> {
        i64::try_from(size_bytes).map_err(|_| {
            LibraryError::invalid(
                "size_bytes",
                format!("{} does not fit in a SQLite integer", size_bytes),
            )
        })
    }
}

#[async_trait]
impl CacheIndexRepository for SqliteCacheIndexRepository {
    #[instrument(skip(self, entry), fields(track_key = %entry.track_key))]
    async fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        if entry.track_key.is_empty() {
            return Err(LibraryError::invalid("track_key", "cache key cannot be empty"));
        }

        let file_path = entry.file_path.to_string_lossy().into_owned();
        sqlx::query(
            r#"
            INSERT INTO cache_entries (track_key, file_path, size_bytes, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(track_key) DO UPDATE SET
                file_path = excluded.file_path,
                size_bytes = excluded.size_bytes,
                created_at = excluded.created_at
            "#,
        )
        .bind(&entry.track_key)
        .bind(&file_path)
        .bind(Self::size_to_db(entry.size_bytes)?)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        debug!(size_bytes = entry.size_bytes, "Cache index row written");
        Ok(())
    }

    async fn find(&self, track_key: &TrackKey) -> Result<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, CacheEntryRow>(
            "SELECT track_key, file_path, size_bytes, created_at FROM cache_entries
             WHERE track_key = ?",
        )
        .bind(track_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CacheEntry::from))
    }

    async fn find_all(&self) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            SELECT track_key, file_path, size_bytes, created_at
            FROM cache_entries
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CacheEntry::from).collect())
    }

    #[instrument(skip(self), fields(track_key = %track_key))]
    async fn delete(&self, track_key: &TrackKey) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE track_key = ?")
            .bind(track_key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn total_size(&self) -> Result<u64> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries")
                .fetch_one(&self.pool)
                .await?;

        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}
