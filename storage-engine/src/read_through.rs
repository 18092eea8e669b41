use async_trait::async_trait;
use icp_cache::domain::CacheEntry;
use icp_cache::ports::CacheStore;
use moka::Expiry;
use moka::future::Cache;
use shared::Result;
use std::fmt::Debug;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone, Debug)]
struct LocalCopy {
    value: String,
    backing_expires_in: Option<Duration>,
    keep_for: Duration,
    cached_at: Instant,
}

impl LocalCopy {
    fn to_entry(&self) -> CacheEntry {
        let elapsed = self.cached_at.elapsed();
        CacheEntry::new(
            self.value.clone(),
            self.backing_expires_in.map(|d| d.saturating_sub(elapsed)),
        )
    }
}

struct KeepFor;

impl Expiry<String, LocalCopy> for KeepFor {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &LocalCopy,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.keep_for)
    }
}

/// Client-side read cache in front of a backing store.
///
/// Reads that carry a `read_ttl` keep the value locally for
/// `min(read_ttl, remaining backing ttl)`, so a local copy never outlives the
/// backing entry it was read from. Writes go straight to the backing store
/// and drop the local copy.
pub struct ReadThroughCache<S: CacheStore> {
    backing: S,
    local: Cache<String, LocalCopy>,
}

impl<S: CacheStore> ReadThroughCache<S> {
    pub fn new(backing: S, max_local_entries: u64) -> Self {
        Self {
            backing,
            local: Cache::builder()
                .max_capacity(max_local_entries)
                .expire_after(KeepFor)
                .build(),
        }
    }

    pub fn backing(&self) -> &S {
        &self.backing
    }
}

#[async_trait]
impl<S: CacheStore> CacheStore for ReadThroughCache<S> {
    async fn get(&self, key: &str, read_ttl: Option<Duration>) -> Result<Option<CacheEntry>> {
        let Some(read_ttl) = read_ttl else {
            return self.backing.get(key, None).await;
        };

        if let Some(copy) = self.local.get(key).await {
            debug!("Local read cache hit for '{}'", key);
            return Ok(Some(copy.to_entry()));
        }

        let entry = self.backing.get(key, None).await?;

        if let Some(entry) = &entry {
            let keep_for = entry
                .expires_in
                .map_or(read_ttl, |remaining| remaining.min(read_ttl));

            if !keep_for.is_zero() {
                let copy = LocalCopy {
                    value: entry.value.clone(),
                    backing_expires_in: entry.expires_in,
                    keep_for,
                    cached_at: Instant::now(),
                };
                self.local.insert(key.to_string(), copy).await;
            }
        }

        Ok(entry)
    }

    async fn put(&self, key: &str, value: String, expiry: Duration) -> Result<()> {
        self.local.invalidate(key).await;
        self.backing.put(key, value, expiry).await
    }
}

impl<S: CacheStore + Debug> Debug for ReadThroughCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("backing", &self.backing)
            .field("local_entries", &self.local.entry_count())
            .finish()
    }
}
