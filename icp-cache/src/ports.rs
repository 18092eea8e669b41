use crate::domain::{CacheEntry, RecordValue, Token};
use async_trait::async_trait;
use shared::{Result, UpstreamError};
use std::time::Duration;

// Ports are the pluggable extension points for the cache backend and the upstream service

/// Port for key/value storage with per-entry write expiry.
///
/// No transactional guarantees are expected across keys or across a
/// get-then-put sequence. Implementations report unavailability as
/// `Error::StoreUnavailable` and never retry internally.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Read a key. `read_ttl` allows a client-side layer to keep the value
    /// locally for that long; backing stores ignore it.
    async fn get(&self, key: &str, read_ttl: Option<Duration>) -> Result<Option<CacheEntry>>;

    /// Write a key that the store expires after `expiry`.
    async fn put(&self, key: &str, value: String, expiry: Duration) -> Result<()>;
}

/// Port for the authenticated upstream record service.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    async fn acquire_token(&self) -> std::result::Result<Token, UpstreamError>;

    async fn query(
        &self,
        token: &Token,
        subject: &str,
    ) -> std::result::Result<RecordValue, UpstreamError>;
}
