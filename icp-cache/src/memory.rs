use crate::domain::CacheEntry;
use crate::ports::CacheStore;
use async_trait::async_trait;
use dashmap::DashMap;
use shared::Result;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::Instant;

struct StoredValue {
    value: String,
    expires_at: Instant,
}

/// In-memory store that measures expiry on the tokio clock.
///
/// Paused or advanced test time drives expiry deterministically, which makes
/// this the store of choice for exercising TTL behaviour.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing was ever written or every entry has been evicted on read.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str, _read_ttl: Option<Duration>) -> Result<Option<CacheEntry>> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(CacheEntry::new(
                    entry.value.clone(),
                    Some(entry.expires_at - now),
                )));
            }
            // Expired, remove it
            drop(entry);
            self.entries
                .remove_if(key, |_, stored| stored.expires_at <= now);
        }

        Ok(None)
    }

    async fn put(&self, key: &str, value: String, expiry: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: Instant::now() + expiry,
            },
        );
        Ok(())
    }
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entry_count", &self.entries.len())
            .finish()
    }
}
