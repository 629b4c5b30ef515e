use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Storage file statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub opened_at: DateTime<Utc>,

    // Space
    pub next_free: u64,
    pub file_len: u64,

    // Cache metrics
    pub cache: CacheStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub cached_segments: usize,
    pub pinned_segments: usize,
    pub dirty_segments: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub evicted_count: u64,
    pub flushed_count: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
