//! Oldest-first eviction against a byte budget.

use crate::cache::store::CacheStore;
use crate::error::Result;
use core_library::CacheEntry;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// Removed entries, oldest first
    pub evicted: Vec<CacheEntry>,
    pub bytes_freed: u64,
    /// Store total after the pass
    pub remaining_bytes: u64,
}

impl EvictionReport {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty()
    }
}

/// Removes the oldest entries until the store fits its budget.
///
/// All passes share one lock, so two concurrent passes never pick the same
/// entry or count the same bytes twice.
pub struct CacheEvictor {
    store: Arc<CacheStore>,
    lock: Mutex<()>,
    events: Option<EventBus>,
}

impl CacheEvictor {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Evict oldest-first until the total is at most `budget_bytes`.
    ///
    /// A single entry larger than the budget is evicted too, even if it was
    /// just promoted. Entries that fail to delete are logged and skipped.
    #[instrument(skip(self))]
    pub async fn evict_if_over_budget(&self, budget_bytes: u64) -> Result<EvictionReport> {
        let _guard = self.lock.lock().await;

        let mut running_total = self.store.total_size_bytes();
        let mut report = EvictionReport {
            remaining_bytes: running_total,
            ..EvictionReport::default()
        };
        if running_total <= budget_bytes {
            return Ok(report);
        }

        debug!(running_total, budget_bytes, "Cache over budget, evicting");

        for entry in self.store.list_all() {
            if running_total <= budget_bytes {
                break;
            }

            match self.store.remove(&entry.track_key).await {
                Ok(Some(removed)) => {
                    running_total = running_total.saturating_sub(removed.size_bytes);
                    report.bytes_freed += removed.size_bytes;
                    debug!(
                        track_key = %removed.track_key,
                        size_bytes = removed.size_bytes,
                        "Evicted cache entry"
                    );
                    self.emit(CacheEvent::EntryEvicted {
                        track_key: removed.track_key.to_string(),
                        size_bytes: removed.size_bytes,
                    });
                    report.evicted.push(removed);
                }
                // Already gone (e.g. a concurrent delete); nothing to count.
                Ok(None) => {}
                Err(e) => {
                    warn!(track_key = %entry.track_key, error = %e, "Failed to evict cache entry");
                }
            }
        }

        report.remaining_bytes = self.store.total_size_bytes();
        info!(
            evicted = report.evicted.len(),
            bytes_freed = report.bytes_freed,
            remaining_bytes = report.remaining_bytes,
            "Eviction pass complete"
        );
        Ok(report)
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(events) = &self.events {
            let _ = events.emit(CoreEvent::Cache(event));
        }
    }
}
