pub mod moka_cache;
pub mod read_through;

pub use moka_cache::MokaCache;
pub use read_through::ReadThroughCache;

use icp_cache::ports::CacheStore;
use std::sync::Arc;
use tracing::info;

/// Upper bound on keys kept by the client-side read layer.
const LOCAL_READ_ENTRIES: u64 = 10_000;

/// Builds the production store: a bounded moka backing store behind a
/// client-side read cache.
pub fn build_store(max_entries: u64) -> Arc<dyn CacheStore> {
    info!(
        "Creating moka store (max {} entries) with local read cache",
        max_entries
    );
    Arc::new(ReadThroughCache::new(
        MokaCache::new_bounded(max_entries),
        LOCAL_READ_ENTRIES.min(max_entries),
    ))
}
