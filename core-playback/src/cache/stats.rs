//! Cache statistics and monitoring

use crate::cache::coordinator::JobSnapshot;
use serde::{Deserialize, Serialize};

/// Point-in-time view of the cache, served by the admin stats endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of complete entries
    pub entry_count: usize,

    /// Sum of complete entry sizes
    pub total_bytes: u64,

    /// Configured size budget
    pub budget_bytes: u64,

    /// Jobs currently registered with the download coordinator
    pub active_downloads: Vec<JobSnapshot>,
}

impl CacheStats {
    /// Cache usage as a percentage of the budget.
    pub fn usage_percentage(&self) -> f64 {
        if self.budget_bytes == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / self.budget_bytes as f64) * 100.0
    }

    /// Returns true if the cache is near capacity (>90%).
    pub fn is_near_capacity(&self) -> bool {
        self.usage_percentage() > 90.0
    }

    /// Returns average bytes per entry.
    pub fn average_entry_size(&self) -> u64 {
        if self.entry_count == 0 {
            0
        } else {
            self.total_bytes / self.entry_count as u64
        }
    }

    /// Human-readable total, e.g. `1.50 MB`.
    pub fn total_size_string(&self) -> String {
        format_bytes(self.total_bytes)
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
