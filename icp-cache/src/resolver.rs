use crate::deadline::DeadlineGuard;
use crate::domain::{QueryPolicy, RecordValue, Token, TokenPolicy};
use crate::ports::{CacheStore, Upstream};
use crate::revalidate::QueryEngine;
use crate::token::TokenManager;
use shared::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::info;

/// Entry point used by the request handlers and the token warmer.
///
/// Owns the tracked set of detached tasks; hosts call [`IcpResolver::shutdown`]
/// so background refreshes and cache writes finish before the process exits.
#[derive(Clone, Debug)]
pub struct IcpResolver {
    tokens: TokenManager,
    engine: QueryEngine,
    tasks: TaskTracker,
}

impl IcpResolver {
    pub fn new(store: Arc<dyn CacheStore>, upstream: Arc<dyn Upstream>) -> Self {
        Self::with_policies(store, upstream, TokenPolicy::default(), QueryPolicy::default())
    }

    pub fn with_policies(
        store: Arc<dyn CacheStore>,
        upstream: Arc<dyn Upstream>,
        token_policy: TokenPolicy,
        query_policy: QueryPolicy,
    ) -> Self {
        let tasks = TaskTracker::new();
        let tokens = TokenManager::new(
            store.clone(),
            upstream.clone(),
            tasks.clone(),
            token_policy,
        );
        let engine = QueryEngine::new(
            store,
            upstream,
            tokens.clone(),
            tasks.clone(),
            query_policy,
        );

        Self {
            tokens,
            engine,
            tasks,
        }
    }

    /// Resolves a subject within `budget`.
    ///
    /// Cachable upstream errors, whether live or replayed from cache, surface
    /// as `Error::UpstreamCachable`.
    pub async fn resolve(&self, subject: &str, budget: Duration) -> Result<RecordValue> {
        let engine = self.engine.clone();
        let subject = subject.to_owned();

        DeadlineGuard::new(self.tasks.clone(), budget)
            .run(async move { engine.lookup(&subject).await })
            .await?
            .into_result()
    }

    /// Token-only mode: makes sure a token is cached without querying anything.
    pub async fn warm(&self) -> Result<Token> {
        self.tokens.token().await
    }

    /// Number of detached tasks still running.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Closes the task set and waits for detached work to drain.
    pub async fn shutdown(&self) {
        self.tasks.close();
        info!("Waiting for {} background task(s) to finish", self.tasks.len());
        self.tasks.wait().await;
    }
}
