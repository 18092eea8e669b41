use crate::classifier;
use crate::domain::{CacheEntry, QueryOutcome, QueryPolicy, Token};
use crate::ports::{CacheStore, Upstream};
use crate::slots::{self, SlotKeys};
use crate::token::TokenManager;
use shared::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Stale-while-revalidate lookup of one subject.
///
/// Mirrors [`TokenManager`] for query results: a fresh slot answers directly,
/// a stale slot answers while the upstream query runs detached, and a cold
/// miss waits for upstream. Settled outcomes, including cachable errors, are
/// written back to both slots without blocking the caller.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn CacheStore>,
    upstream: Arc<dyn Upstream>,
    tokens: TokenManager,
    tasks: TaskTracker,
    policy: QueryPolicy,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn CacheStore>,
        upstream: Arc<dyn Upstream>,
        tokens: TokenManager,
        tasks: TaskTracker,
        policy: QueryPolicy,
    ) -> Self {
        Self {
            store,
            upstream,
            tokens,
            tasks,
            policy,
        }
    }

    pub async fn lookup(&self, subject: &str) -> Result<QueryOutcome> {
        // Token resolution overlaps with the cache reads below.
        let tokens = self.tokens.clone();
        let token = self.tasks.spawn(async move { tokens.token().await });

        let keys = SlotKeys::query(subject);
        let read = slots::read_pair(self.store.as_ref(), &keys, self.policy.read_ttl).await?;

        if let Some(outcome) = read.fresh.and_then(|e| decode_entry(&keys.fresh, e)) {
            debug!("Fresh hit for '{}'", subject);
            return Ok(outcome);
        }

        let refresh = self.spawn_refresh(subject.to_owned(), keys.clone(), token);

        if let Some(outcome) = read.stale.and_then(|e| decode_entry(&keys.stale, e)) {
            debug!("Serving stale result for '{}' while revalidating", subject);
            return Ok(outcome);
        }

        debug!("Cold miss for '{}', waiting for upstream", subject);
        slots::join(refresh).await
    }

    fn spawn_refresh(
        &self,
        subject: String,
        keys: SlotKeys,
        token: JoinHandle<Result<Token>>,
    ) -> JoinHandle<Result<QueryOutcome>> {
        let this = self.clone();

        self.tasks.spawn(async move {
            let token = slots::join(token).await?;
            let outcome = classifier::into_outcome(this.upstream.query(&token, &subject).await)
                .inspect_err(|e| warn!("Upstream query for '{}' failed: {}", subject, e))?;

            let writer = this.clone();
            let persisted = outcome.clone();
            this.tasks.spawn(async move { writer.persist(&keys, &persisted).await });

            Ok(outcome)
        })
    }

    async fn persist(&self, keys: &SlotKeys, outcome: &QueryOutcome) {
        let payload = match outcome.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode outcome for '{}': {}", keys.fresh, e);
                return;
            }
        };

        if let Err(e) = slots::write_pair(
            self.store.as_ref(),
            keys,
            payload,
            self.policy.fresh_expiry_for(outcome),
            self.policy.stale_expiry,
        )
        .await
        {
            warn!("Failed to persist outcome for '{}': {}", keys.fresh, e);
        }
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("tokens", &self.tokens)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Undecodable payloads are treated as absent so the next refresh overwrites them.
fn decode_entry(key: &str, entry: CacheEntry) -> Option<QueryOutcome> {
    QueryOutcome::decode(&entry.value)
        .inspect_err(|e| warn!("Ignoring undecodable cache entry '{}': {}", key, e))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokenPolicy;
    use crate::memory::MemoryStore;
    use crate::testing::{ScriptedUpstream, UnavailableStore, settle};
    use serde_json::json;
    use shared::{Error, UpstreamError};
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        upstream: Arc<ScriptedUpstream>,
        tasks: TaskTracker,
        engine: QueryEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let upstream = Arc::new(ScriptedUpstream::new());
        let tasks = TaskTracker::new();
        let tokens = TokenManager::new(
            store.clone(),
            upstream.clone(),
            tasks.clone(),
            TokenPolicy::default(),
        );
        let engine = QueryEngine::new(
            store.clone(),
            upstream.clone(),
            tokens,
            tasks.clone(),
            QueryPolicy::default(),
        );
        Fixture {
            store,
            upstream,
            tasks,
            engine,
        }
    }

    async fn cached(store: &MemoryStore, key: &str) -> Option<(QueryOutcome, Duration)> {
        store.get(key, None).await.unwrap().map(|entry| {
            (
                QueryOutcome::decode(&entry.value).unwrap(),
                entry.expires_in.unwrap(),
            )
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_miss_returns_upstream_result_and_populates_slots() {
        let f = fixture();

        let outcome = f.engine.lookup("example.com").await.unwrap();
        assert_eq!(
            outcome,
            QueryOutcome::Result(ScriptedUpstream::record_for("example.com"))
        );
        assert_eq!(f.upstream.query_calls(), 1);

        settle(&f.tasks).await;

        let (fresh, fresh_ttl) = cached(&f.store, "queryIcp:example.com").await.unwrap();
        let (stale, stale_ttl) = cached(&f.store, "stale:queryIcp:example.com").await.unwrap();
        assert_eq!(fresh, outcome);
        assert_eq!(stale, outcome);
        assert_eq!(fresh_ttl, Duration::from_secs(3600));
        assert_eq!(stale_ttl, Duration::from_secs(86400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_hit_skips_upstream_query() {
        let f = fixture();
        f.engine.lookup("example.com").await.unwrap();
        settle(&f.tasks).await;

        for _ in 0..5 {
            f.engine.lookup("example.com").await.unwrap();
        }
        settle(&f.tasks).await;

        assert_eq!(f.upstream.query_calls(), 1);
        assert_eq!(f.upstream.token_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_served_then_overwritten_by_one_refresh() {
        let f = fixture();
        f.store
            .put(
                "stale:queryIcp:example.com",
                json!({"result": {"unit": "Old Ltd"}}).to_string(),
                Duration::from_secs(86400),
            )
            .await
            .unwrap();
        f.upstream.set_delay(Duration::from_secs(3));

        let outcome = f.engine.lookup("example.com").await.unwrap();
        assert_eq!(outcome, QueryOutcome::Result(json!({"unit": "Old Ltd"})));

        settle(&f.tasks).await;
        assert_eq!(f.upstream.query_calls(), 1);

        let expected = QueryOutcome::Result(ScriptedUpstream::record_for("example.com"));
        let (fresh, _) = cached(&f.store, "queryIcp:example.com").await.unwrap();
        let (stale, _) = cached(&f.store, "stale:queryIcp:example.com").await.unwrap();
        assert_eq!(fresh, expected);
        assert_eq!(stale, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_survives_failed_background_refresh() {
        let f = fixture();
        let old = json!({"result": {"unit": "Old Ltd"}}).to_string();
        f.store
            .put(
                "stale:queryIcp:example.com",
                old.clone(),
                Duration::from_secs(86400),
            )
            .await
            .unwrap();
        f.upstream.fail_subject(
            "example.com",
            UpstreamError::new(Some(502), None, "bad gateway"),
        );

        let outcome = f.engine.lookup("example.com").await.unwrap();
        assert_eq!(outcome, QueryOutcome::Result(json!({"unit": "Old Ltd"})));

        settle(&f.tasks).await;
        assert_eq!(f.upstream.query_calls(), 1);

        assert!(cached(&f.store, "queryIcp:example.com").await.is_none());
        let stale = f
            .store
            .get("stale:queryIcp:example.com", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stale.value, old);
        assert_eq!(stale.expires_in, Some(Duration::from_secs(86400)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cachable_error_is_persisted_with_short_expiry() {
        let f = fixture();
        let not_found = UpstreamError::new(Some(404), None, "domain not found").cachable(true);
        f.upstream.fail_subject("bad.example", not_found.clone());

        let outcome = f.engine.lookup("bad.example").await.unwrap();
        assert_eq!(outcome, QueryOutcome::CachableError(not_found.clone()));
        settle(&f.tasks).await;

        let (fresh, fresh_ttl) = cached(&f.store, "queryIcp:bad.example").await.unwrap();
        assert_eq!(fresh, QueryOutcome::CachableError(not_found.clone()));
        assert_eq!(fresh_ttl, Duration::from_secs(600));

        // Replayed from cache even though upstream would now succeed.
        f.upstream.clear_failure("bad.example");
        tokio::time::advance(Duration::from_secs(300)).await;
        let outcome = f.engine.lookup("bad.example").await.unwrap();
        assert_eq!(outcome, QueryOutcome::CachableError(not_found));
        assert_eq!(f.upstream.query_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_cachable_error_is_never_written() {
        let f = fixture();
        f.upstream
            .fail_subject("flaky.example", UpstreamError::new(Some(503), None, "unavailable"));

        let result = f.engine.lookup("flaky.example").await;
        assert!(matches!(result, Err(Error::UpstreamNonCachable(_))));
        settle(&f.tasks).await;

        assert!(cached(&f.store, "queryIcp:flaky.example").await.is_none());
        assert!(cached(&f.store, "stale:queryIcp:flaky.example").await.is_none());

        let result = f.engine.lookup("flaky.example").await;
        assert!(matches!(result, Err(Error::UpstreamNonCachable(_))));
        assert_eq!(f.upstream.query_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_failure_propagates_on_cold_miss() {
        let f = fixture();
        f.upstream
            .fail_tokens(Some(UpstreamError::new(Some(404), None, "no such client")));

        let result = f.engine.lookup("example.com").await;
        assert!(matches!(result, Err(Error::UpstreamNonCachable(_))));
        assert_eq!(f.upstream.query_calls(), 0);

        settle(&f.tasks).await;
        assert!(f.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_fresh_entry_is_treated_as_miss() {
        let f = fixture();
        f.store
            .put("queryIcp:example.com", "{not json".into(), Duration::from_secs(60))
            .await
            .unwrap();

        let outcome = f.engine.lookup("example.com").await.unwrap();
        assert_eq!(
            outcome,
            QueryOutcome::Result(ScriptedUpstream::record_for("example.com"))
        );
        assert_eq!(f.upstream.query_calls(), 1);

        settle(&f.tasks).await;
        let (fresh, _) = cached(&f.store, "queryIcp:example.com").await.unwrap();
        assert_eq!(fresh, outcome);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cold_misses_may_duplicate_upstream_calls() {
        let f = fixture();
        f.upstream.set_delay(Duration::from_secs(1));

        let (a, b) = tokio::join!(
            f.engine.lookup("example.com"),
            f.engine.lookup("example.com")
        );
        assert_eq!(a.unwrap(), b.unwrap());

        settle(&f.tasks).await;
        assert!((1..=2).contains(&f.upstream.query_calls()));
        assert!(cached(&f.store, "queryIcp:example.com").await.is_some());
    }

    #[tokio::test]
    async fn test_store_unavailable_is_fatal() {
        let upstream = Arc::new(ScriptedUpstream::new());
        let tasks = TaskTracker::new();
        let store: Arc<dyn CacheStore> = Arc::new(UnavailableStore);
        let tokens = TokenManager::new(
            store.clone(),
            upstream.clone(),
            tasks.clone(),
            TokenPolicy::default(),
        );
        let engine = QueryEngine::new(
            store,
            upstream.clone(),
            tokens,
            tasks.clone(),
            QueryPolicy::default(),
        );

        assert!(matches!(
            engine.lookup("example.com").await,
            Err(Error::StoreUnavailable(_))
        ));
        settle(&tasks).await;
        assert_eq!(upstream.query_calls(), 0);
    }
}
