//! Cache store: complete files on disk plus their index rows.
//!
//! Two disjoint namespaces share one directory: `<key>.<ext>` for complete
//! entries and `<key>.<ext>.part` for in-flight downloads. A file only becomes
//! visible to [`CacheStore::lookup`] through a single rename in
//! [`CacheStore::promote`], followed by the index write.
//!
//! The durable index lives in SQLite; an in-memory mirror of it answers
//! lookups, listings and the running byte total without touching the
//! filesystem or the database.

use crate::error::{PlaybackError, Result};
use bridge_traits::time::Clock;
use core_library::models::PARTIAL_SUFFIX;
use core_library::repositories::CacheIndexRepository;
use core_library::{CacheEntry, TrackKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<TrackKey, IndexedEntry>,
    total_bytes: u64,
    next_seq: u64,
}

#[derive(Debug, Clone)]
struct IndexedEntry {
    entry: CacheEntry,
    seq: u64,
}

impl IndexState {
    fn insert(&mut self, entry: CacheEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.total_bytes = self.total_bytes.saturating_add(entry.size_bytes);
        if let Some(previous) = self
            .entries
            .insert(entry.track_key.clone(), IndexedEntry { entry, seq })
        {
            self.total_bytes = self.total_bytes.saturating_sub(previous.entry.size_bytes);
        }
    }

    fn remove(&mut self, key: &TrackKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(removed.entry.size_bytes);
        Some(removed.entry)
    }
}

/// Owner of the cache directory and its index.
///
/// Constructed once at startup and shared by handle; nothing else builds
/// paths inside the cache directory.
pub struct CacheStore {
    dir: PathBuf,
    extension: String,
    repository: Arc<dyn CacheIndexRepository>,
    clock: Arc<dyn Clock>,
    state: RwLock<IndexState>,
    /// Serializes every mutation of directory + index.
    write_lock: Mutex<()>,
}

impl CacheStore {
    /// Open the store rooted at `dir`, creating the directory if needed and
    /// reconciling the durable index with what is actually on disk.
    #[instrument(skip(dir, extension, repository, clock), fields(dir = %dir.as_ref().display()))]
    pub async fn open(
        dir: impl AsRef<Path>,
        extension: impl Into<String>,
        repository: Arc<dyn CacheIndexRepository>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_error("create cache directory", e))?;
        let dir = fs::canonicalize(&dir)
            .await
            .map_err(|e| store_error("resolve cache directory", e))?;

        let store = Self {
            dir,
            extension: extension.into(),
            repository,
            clock,
            state: RwLock::new(IndexState::default()),
            write_lock: Mutex::new(()),
        };
        store.reconcile().await?;

        info!(
            entries = store.len(),
            total_bytes = store.total_size_bytes(),
            "Cache store opened"
        );
        Ok(store)
    }

    async fn reconcile(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries: Vec<CacheEntry> = Vec::new();
        for mut entry in self.repository.find_all().await? {
            let path = self.entry_path(&entry.track_key);
            match fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {
                    let real_size = metadata.len();
                    if real_size != entry.size_bytes || entry.file_path != path {
                        debug!(
                            track_key = %entry.track_key,
                            indexed = entry.size_bytes,
                            real_size,
                            "Correcting cache index row"
                        );
                        entry.size_bytes = real_size;
                        entry.file_path = path;
                        self.repository.upsert(&entry).await?;
                    }
                    entries.push(entry);
                }
                _ => {
                    warn!(track_key = %entry.track_key, "Dropping index row without a file");
                    self.repository.delete(&entry.track_key).await?;
                }
            }
        }

        let mut dir = fs::read_dir(&self.dir)
            .await
            .map_err(|e| store_error("read cache directory", e))?;
        while let Some(dirent) = dir
            .next_entry()
            .await
            .map_err(|e| store_error("read cache directory", e))?
        {
            let Some(name) = dirent.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let path = dirent.path();

            if name.ends_with(PARTIAL_SUFFIX) {
                debug!(file = %name, "Removing stale partial download");
                remove_file_if_exists(&path).await?;
                continue;
            }

            let Some(key) = TrackKey::from_file_name(&name, &self.extension) else {
                continue;
            };
            if entries.iter().any(|entry| entry.track_key == key) {
                continue;
            }

            let metadata = match dirent.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let created_at = metadata
                .modified()
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .and_then(|age| i64::try_from(age.as_millis()).ok())
                .unwrap_or_else(|| self.clock.unix_timestamp_millis());

            let entry = CacheEntry::new(key, path, metadata.len(), created_at);
            info!(track_key = %entry.track_key, "Adopting unindexed cache file");
            self.repository.upsert(&entry).await?;
            entries.push(entry);
        }

        // Adopted files slot in by timestamp; indexed rows keep their order.
        entries.sort_by_key(|entry| entry.created_at);
        let mut ordered = IndexState::default();
        for entry in entries {
            ordered.insert(entry);
        }

        *self.state.write() = ordered;
        Ok(())
    }

    /// Directory holding both namespaces.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Extension of complete entries, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path a complete entry for `key` lives at.
    pub fn entry_path(&self, key: &TrackKey) -> PathBuf {
        self.dir.join(key.file_name(&self.extension))
    }

    /// Path an in-flight download for `key` writes to.
    pub fn partial_path(&self, key: &TrackKey) -> PathBuf {
        self.dir.join(key.partial_file_name(&self.extension))
    }

    /// Index-only presence check. Never blocks on I/O.
    pub fn contains(&self, key: &TrackKey) -> bool {
        self.state.read().entries.contains_key(key)
    }

    /// The complete entry for `key`, if both its index row and file exist.
    pub async fn lookup(&self, key: &TrackKey) -> Option<CacheEntry> {
        let entry = self.state.read().entries.get(key).map(|indexed| indexed.entry.clone())?;
        match fs::try_exists(&entry.file_path).await {
            Ok(true) => Some(entry),
            _ => None,
        }
    }

    /// Move a finished partial file into the complete namespace and record
    /// it in the index.
    ///
    /// The rename is the only step that makes data visible. If the partial
    /// file is missing or the rename fails, the index is left untouched; if
    /// the index write fails, the renamed file is removed again.
    #[instrument(skip(self, partial_path), fields(track_key = %key))]
    pub async fn promote(&self, key: &TrackKey, partial_path: &Path) -> Result<CacheEntry> {
        if key.is_empty() {
            return Err(PlaybackError::InvalidInput("cache key cannot be empty".to_string()));
        }

        let _guard = self.write_lock.lock().await;

        let metadata = fs::metadata(partial_path)
            .await
            .map_err(|e| store_error("stat partial file", e))?;
        let final_path = self.entry_path(key);
        fs::rename(partial_path, &final_path)
            .await
            .map_err(|e| store_error("rename partial file", e))?;

        let entry = CacheEntry::new(
            key.clone(),
            final_path.clone(),
            metadata.len(),
            self.clock.unix_timestamp_millis(),
        );

        if let Err(e) = self.repository.upsert(&entry).await {
            warn!(error = %e, "Index write failed after rename, discarding file");
            if let Err(remove_err) = remove_file_if_exists(&final_path).await {
                warn!(error = %remove_err, "Failed to remove orphaned cache file");
            }
            // A previous row for this key now points at a deleted file.
            if let Err(delete_err) = self.repository.delete(key).await {
                warn!(error = %delete_err, "Failed to drop stale index row");
            }
            self.state.write().remove(key);
            return Err(e.into());
        }

        self.state.write().insert(entry.clone());
        debug!(size_bytes = entry.size_bytes, "Promoted cache entry");
        Ok(entry)
    }

    /// Delete the file and index row for `key`.
    ///
    /// Absent file or absent row is not an error. Returns the entry that was
    /// indexed, if any.
    #[instrument(skip(self), fields(track_key = %key))]
    pub async fn remove(&self, key: &TrackKey) -> Result<Option<CacheEntry>> {
        let _guard = self.write_lock.lock().await;

        remove_file_if_exists(&self.entry_path(key)).await?;
        self.repository.delete(key).await?;
        let removed = self.state.write().remove(key);

        if removed.is_some() {
            debug!("Removed cache entry");
        }
        Ok(removed)
    }

    /// Snapshot of all complete entries, oldest first.
    ///
    /// Entries with equal timestamps keep the order they were indexed in.
    /// The snapshot is detached from the store and can be iterated any
    /// number of times.
    pub fn list_all(&self) -> Vec<CacheEntry> {
        let state = self.state.read();
        let mut indexed: Vec<&IndexedEntry> = state.entries.values().collect();
        indexed.sort_by_key(|item| (item.entry.created_at, item.seq));
        indexed.into_iter().map(|item| item.entry.clone()).collect()
    }

    /// Sum of sizes of all complete entries.
    pub fn total_size_bytes(&self) -> u64 {
        self.state.read().total_bytes
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every complete entry and every partial file currently in the
    /// directory. Returns the number of complete entries removed.
    pub async fn clear(&self) -> Result<usize> {
        self.clear_except(|_| false).await
    }

    /// Like [`clear`](Self::clear), but keeps the partial file of every key
    /// for which `in_flight` returns `true`.
    ///
    /// Downloads still writing those files are not interrupted; their later
    /// promotion recreates the entry.
    #[instrument(skip(self, in_flight))]
    pub async fn clear_except<F>(&self, in_flight: F) -> Result<usize>
    where
        F: Fn(&TrackKey) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;

        let keys: Vec<TrackKey> = self.state.read().entries.keys().cloned().collect();
        for key in &keys {
            remove_file_if_exists(&self.entry_path(key)).await?;
        }

        let mut dir = fs::read_dir(&self.dir)
            .await
            .map_err(|e| store_error("read cache directory", e))?;
        while let Some(dirent) = dir
            .next_entry()
            .await
            .map_err(|e| store_error("read cache directory", e))?
        {
            let file_name = dirent.file_name();
            let Some(complete_name) = file_name
                .to_str()
                .and_then(|name| name.strip_suffix(PARTIAL_SUFFIX))
            else {
                continue;
            };

            let owner = TrackKey::from_file_name(complete_name, &self.extension);
            if owner.as_ref().is_some_and(&in_flight) {
                debug!(file = %complete_name, "Keeping partial file of running download");
                continue;
            }
            remove_file_if_exists(&dirent.path()).await?;
        }

        self.repository.clear().await?;
        *self.state.write() = IndexState::default();

        info!(removed = keys.len(), "Cache cleared");
        Ok(keys.len())
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("dir", &self.dir)
            .field("extension", &self.extension)
            .field("entries", &self.len())
            .finish()
    }
}

pub(crate) async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(store_error("remove file", e)),
    }
}

fn store_error(action: &str, err: std::io::Error) -> PlaybackError {
    PlaybackError::Store(format!("{}: {}", action, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::fakes::ManualClock;
    use core_library::db::create_test_pool;
    use core_library::repositories::SqliteCacheIndexRepository;
    use core_library::LibraryError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// SQLite index whose writes can be switched to fail.
    struct FailingWrites {
        inner: SqliteCacheIndexRepository,
        fail_upserts: AtomicBool,
    }

    #[async_trait]
    impl CacheIndexRepository for FailingWrites {
        async fn upsert(&self, entry: &CacheEntry) -> core_library::Result<()> {
            if self.fail_upserts.load(Ordering::SeqCst) {
                return Err(LibraryError::InvalidInput {
                    field: "track_key".to_string(),
                    message: "write rejected".to_string(),
                });
            }
            self.inner.upsert(entry).await
        }

        async fn find(&self, track_key: &TrackKey) -> core_library::Result<Option<CacheEntry>> {
            self.inner.find(track_key).await
        }

        async fn find_all(&self) -> core_library::Result<Vec<CacheEntry>> {
            self.inner.find_all().await
        }

        async fn delete(&self, track_key: &TrackKey) -> core_library::Result<bool> {
            self.inner.delete(track_key).await
        }

        async fn clear(&self) -> core_library::Result<u64> {
            self.inner.clear().await
        }

        async fn total_size(&self) -> core_library::Result<u64> {
            self.inner.total_size().await
        }

        async fn count(&self) -> core_library::Result<u64> {
            self.inner.count().await
        }
    }

    async fn open_store(dir: &Path, clock: Arc<ManualClock>) -> CacheStore {
        let pool = create_test_pool().await.unwrap();
        let repository = Arc::new(SqliteCacheIndexRepository::new(pool));
        CacheStore::open(dir, "m4a", repository, clock).await.unwrap()
    }

    async fn write_partial(store: &CacheStore, key: &TrackKey, len: usize) -> PathBuf {
        let path = store.partial_path(key);
        fs::write(&path, vec![7u8; len]).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_promote_makes_entry_visible() {
        let temp = TempDir::new().unwrap();
        let store = open_store(temp.path(), Arc::new(ManualClock::new(1_000))).await;
        let key = TrackKey::sanitize("123");

        assert!(store.lookup(&key).await.is_none());
        let partial = write_partial(&store, &key, 64).await;
        let entry = store.promote(&key, &partial).await.unwrap();

        assert_eq!(entry.size_bytes, 64);
        assert_eq!(entry.created_at, 1_000);
        assert!(!partial.exists());
        assert!(store.contains(&key));
        assert_eq!(store.lookup(&key).await, Some(entry));
        assert_eq!(store.total_size_bytes(), 64);
    }

    #[tokio::test]
    async fn test_promote_missing_partial_leaves_index_alone() {
        let temp = TempDir::new().unwrap();
        let store = open_store(temp.path(), Arc::new(ManualClock::new(0))).await;
        let key = TrackKey::sanitize("404");

        let result = store.promote(&key, &store.partial_path(&key)).await;
        assert!(matches!(result, Err(PlaybackError::Store(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = open_store(temp.path(), Arc::new(ManualClock::new(0))).await;
        let key = TrackKey::sanitize("5");
        let partial = write_partial(&store, &key, 10).await;
        store.promote(&key, &partial).await.unwrap();

        assert!(store.remove(&key).await.unwrap().is_some());
        assert!(store.remove(&key).await.unwrap().is_none());
        assert!(!store.entry_path(&key).exists());
        assert_eq!(store.total_size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_list_all_orders_by_timestamp_then_insertion() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(500));
        let store = open_store(temp.path(), clock.clone()).await;

        for raw in ["b", "a"] {
            let key = TrackKey::sanitize(raw);
            let partial = write_partial(&store, &key, 1).await;
            store.promote(&key, &partial).await.unwrap();
        }
        clock.set_millis(100);
        let key = TrackKey::sanitize("c");
        let partial = write_partial(&store, &key, 1).await;
        store.promote(&key, &partial).await.unwrap();

        let order: Vec<String> = store
            .list_all()
            .iter()
            .map(|entry| entry.track_key.to_string())
            .collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_clear_removes_entries_and_partials() {
        let temp = TempDir::new().unwrap();
        let store = open_store(temp.path(), Arc::new(ManualClock::new(0))).await;
        let key = TrackKey::sanitize("1");
        let partial = write_partial(&store, &key, 3).await;
        store.promote(&key, &partial).await.unwrap();
        let in_flight = write_partial(&store, &TrackKey::sanitize("2"), 3).await;

        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.is_empty());
        assert!(!in_flight.exists());
        assert!(!store.entry_path(&key).exists());
    }

    #[tokio::test]
    async fn test_clear_keeps_partials_of_running_downloads() {
        let temp = TempDir::new().unwrap();
        let store = open_store(temp.path(), Arc::new(ManualClock::new(0))).await;
        let running = TrackKey::sanitize("7");
        let abandoned = TrackKey::sanitize("8");
        let kept = write_partial(&store, &running, 5).await;
        let dropped = write_partial(&store, &abandoned, 5).await;

        assert_eq!(store.clear_except(|key| *key == running).await.unwrap(), 0);
        assert!(kept.exists());
        assert!(!dropped.exists());

        let entry = store.promote(&running, &kept).await.unwrap();
        assert_eq!(entry.size_bytes, 5);
        assert!(store.contains(&running));
    }

    #[tokio::test]
    async fn test_failed_index_write_drops_previous_row() {
        let temp = TempDir::new().unwrap();
        let pool = create_test_pool().await.unwrap();
        let repository = Arc::new(FailingWrites {
            inner: SqliteCacheIndexRepository::new(pool),
            fail_upserts: AtomicBool::new(false),
        });
        let store = CacheStore::open(
            temp.path(),
            "m4a",
            repository.clone(),
            Arc::new(ManualClock::new(0)),
        )
        .await
        .unwrap();
        let key = TrackKey::sanitize("42");
        let partial = write_partial(&store, &key, 3).await;
        store.promote(&key, &partial).await.unwrap();

        repository.fail_upserts.store(true, Ordering::SeqCst);
        let partial = write_partial(&store, &key, 9).await;
        assert!(store.promote(&key, &partial).await.is_err());

        assert!(!store.contains(&key));
        assert!(!store.entry_path(&key).exists());
        assert!(repository.find(&key).await.unwrap().is_none());
        assert_eq!(store.total_size_bytes(), 0);
    }
}
