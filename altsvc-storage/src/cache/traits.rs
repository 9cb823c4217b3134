//! Persistence store trait and cache statistics.

use altsvc_core::AltSvcResult;

/// Durable key/value backend behind an alternate-protocols cache.
///
/// Keys are canonical origin strings (`scheme://hostname:port`) and values
/// are versioned records produced by [`super::codec`]. A store belongs to
/// exactly one cache; implementations need not coordinate concurrent writers.
pub trait KeyValueStore: Send + Sync {
    /// Enumerate every persisted pair.
    fn load_all(&self) -> AltSvcResult<Vec<(String, String)>>;

    /// Insert or overwrite a record.
    fn set(&self, key: &str, value: &str) -> AltSvcResult<()>;

    /// Delete a record. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> AltSvcResult<()>;

    /// Push buffered writes to the durable medium.
    fn flush(&self) -> AltSvcResult<()>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned at least one usable alternative.
    pub hits: u64,
    /// Lookups that returned nothing.
    pub misses: u64,
    /// Number of origins currently tracked.
    pub entry_count: u64,
    /// Number of origins dropped to respect capacity.
    pub evictions: u64,
    /// Number of origins dropped because every alternative expired.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
