use async_trait::async_trait;
use icp_cache::domain::CacheEntry;
use icp_cache::ports::CacheStore;
use moka::Expiry;
use moka::future::Cache;
use shared::Result;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct StoredValue {
    value: String,
    ttl: Duration,
    written_at: Instant,
}

impl StoredValue {
    fn remaining(&self) -> Duration {
        self.ttl.saturating_sub(self.written_at.elapsed())
    }
}

/// Expires every entry after the duration given to its most recent write.
struct WriteExpiry;

impl Expiry<String, Arc<StoredValue>> for WriteExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<StoredValue>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<StoredValue>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Moka-based backing store with per-entry write expiry
/// Provides lock-free, concurrent storage with optional size bounds
pub struct MokaCache {
    cache: Cache<String, Arc<StoredValue>>,
}

impl MokaCache {
    /// Create a new unbounded Moka store
    pub fn new_unbounded() -> Self {
        Self {
            cache: Cache::builder().expire_after(WriteExpiry).build(),
        }
    }

    /// Create a new bounded Moka store holding at most `max_entries` keys
    pub fn new_bounded(max_entries: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(WriteExpiry)
                .build(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl CacheStore for MokaCache {
    async fn get(&self, key: &str, _read_ttl: Option<Duration>) -> Result<Option<CacheEntry>> {
        // Either doesn't exist or expired
        Ok(self
            .cache
            .get(key)
            .await
            .map(|stored| CacheEntry::new(stored.value.clone(), Some(stored.remaining()))))
    }

    async fn put(&self, key: &str, value: String, expiry: Duration) -> Result<()> {
        let stored = StoredValue {
            value,
            ttl: expiry,
            written_at: Instant::now(),
        };
        self.cache.insert(key.to_string(), Arc::new(stored)).await;
        Ok(())
    }
}

impl Debug for MokaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCache")
            .field("entry_count", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .finish()
    }
}
