//! Fresh/stale slot pairs shared by the token and query refresh paths.
//!
//! Every logical item lives under two keys: the fresh slot (`key`) with a short
//! write expiry, and the stale slot (`stale:key`) that outlives it and serves
//! as a fallback while a refresh is in flight.

use crate::domain::CacheEntry;
use crate::ports::CacheStore;
use shared::{Error, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

pub const STALE_PREFIX: &str = "stale:";
pub const TOKEN_KEY: &str = "token";
pub const QUERY_PREFIX: &str = "queryIcp:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotKeys {
    pub fresh: String,
    pub stale: String,
}

impl SlotKeys {
    pub fn new(key: impl Into<String>) -> Self {
        let fresh = key.into();
        let stale = format!("{STALE_PREFIX}{fresh}");
        Self { fresh, stale }
    }

    pub fn token() -> Self {
        Self::new(TOKEN_KEY)
    }

    pub fn query(subject: &str) -> Self {
        Self::new(format!("{QUERY_PREFIX}{subject}"))
    }
}

/// Both slots of a pair, read concurrently.
pub struct SlotRead {
    pub fresh: Option<CacheEntry>,
    pub stale: Option<CacheEntry>,
}

pub async fn read_pair(
    store: &dyn CacheStore,
    keys: &SlotKeys,
    read_ttl: Option<Duration>,
) -> Result<SlotRead> {
    let (fresh, stale) = tokio::try_join!(
        store.get(&keys.fresh, read_ttl),
        store.get(&keys.stale, read_ttl),
    )?;

    debug!(
        "Read slots for '{}': fresh={}, stale={}",
        keys.fresh,
        fresh.is_some(),
        stale.is_some()
    );

    Ok(SlotRead { fresh, stale })
}

/// Writes the same value into both slots of the pair.
pub async fn write_pair(
    store: &dyn CacheStore,
    keys: &SlotKeys,
    value: String,
    fresh_expiry: Duration,
    stale_expiry: Duration,
) -> Result<()> {
    tokio::try_join!(
        store.put(&keys.fresh, value.clone(), fresh_expiry),
        store.put(&keys.stale, value, stale_expiry),
    )?;

    debug!(
        "Wrote slots for '{}' (fresh {:?}, stale {:?})",
        keys.fresh, fresh_expiry, stale_expiry
    );

    Ok(())
}

/// Waits for a detached task and flattens its result.
pub async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .await
        .map_err(|e| Error::Internal(format!("background task failed: {e}")))?
}
