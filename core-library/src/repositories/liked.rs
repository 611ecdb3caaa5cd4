//! Database repository for liked tracks

use crate::error::{LibraryError, Result};
use crate::models::LikedTrack;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Repository trait for liked track operations.
#[async_trait]
pub trait LikedTrackRepository: Send + Sync {
    /// Like a track. Liking it again refreshes artist, title and timestamp.
    async fn like(&self, track: &LikedTrack) -> Result<()>;

    /// Returns `true` if the track was liked.
    async fn unlike(&self, track_id: &str) -> Result<bool>;

    async fn find(&self, track_id: &str) -> Result<Option<LikedTrack>>;

    /// All liked tracks, most recently liked first.
    async fn list(&self) -> Result<Vec<LikedTrack>>;

    async fn count(&self) -> Result<u64>;
}

/// SQLite implementation of LikedTrackRepository.
pub struct SqliteLikedTrackRepository {
    pool: SqlitePool,
}

impl SqliteLikedTrackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LikedTrackRepository for SqliteLikedTrackRepository {
    async fn like(&self, track: &LikedTrack) -> Result<()> {
        track
            .validate()
            .map_err(|msg| LibraryError::invalid("liked_track", msg))?;

        sqlx::query(
            r#"
            INSERT INTO liked_tracks (track_id, artist, title, liked_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(track_id) DO UPDATE SET
                artist = excluded.artist,
                title = excluded.title,
                liked_at = excluded.liked_at
            "#,
        )
        .bind(&track.track_id)
        .bind(&track.artist)
        .bind(&track.title)
        .bind(track.liked_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unlike(&self, track_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM liked_tracks WHERE track_id = ?")
            .bind(track_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, track_id: &str) -> Result<Option<LikedTrack>> {
        let track = sqlx::query_as::<_, LikedTrack>(
            "SELECT track_id, artist, title, liked_at FROM liked_tracks WHERE track_id = ?",
        )
        .bind(track_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(track)
    }

    async fn list(&self) -> Result<Vec<LikedTrack>> {
        let tracks = sqlx::query_as::<_, LikedTrack>(
            "SELECT track_id, artist, title, liked_at FROM liked_tracks
             ORDER BY liked_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tracks)
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM liked_tracks")
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn repository() -> SqliteLikedTrackRepository {
        let pool = create_test_pool().await.unwrap();
        SqliteLikedTrackRepository::new(pool)
    }

    #[tokio::test]
    async fn test_like_and_list_newest_first() {
        let repo = repository().await;
        repo.like(&LikedTrack::new("1", "Daft Punk", "One More Time", 100))
            .await
            .unwrap();
        repo.like(&LikedTrack::new("2", "Justice", "D.A.N.C.E.", 200))
            .await
            .unwrap();

        let tracks = repo.list().await.unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].track_id, "2");
        assert_eq!(tracks[1].title, "One More Time");
    }

    #[tokio::test]
    async fn test_like_twice_updates() {
        let repo = repository().await;
        repo.like(&LikedTrack::new("1", "Artist", "Old", 1)).await.unwrap();
        repo.like(&LikedTrack::new("1", "Artist", "New", 2)).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.find("1").await.unwrap().unwrap().title, "New");
    }

    #[tokio::test]
    async fn test_unlike() {
        let repo = repository().await;
        repo.like(&LikedTrack::new("1", "Artist", "Song", 1)).await.unwrap();

        assert!(repo.unlike("1").await.unwrap());
        assert!(!repo.unlike("1").await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_like_rejects_invalid_track() {
        let repo = repository().await;
        let result = repo.like(&LikedTrack::new("", "Artist", "Song", 1)).await;

        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }
}
