use crate::domain::{Token, TokenPolicy};
use crate::ports::{CacheStore, Upstream};
use crate::slots::{self, SlotKeys};
use shared::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Hands out upstream tokens from the cache, refreshing them in the background.
///
/// A fresh token is returned without touching upstream. When only the stale
/// slot is populated it is returned right away and a refresh runs detached;
/// with both slots empty the caller waits for the upstream acquisition.
/// Each call starts at most one acquisition; concurrent callers are not
/// de-duplicated.
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn CacheStore>,
    upstream: Arc<dyn Upstream>,
    tasks: TaskTracker,
    policy: TokenPolicy,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn CacheStore>,
        upstream: Arc<dyn Upstream>,
        tasks: TaskTracker,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            store,
            upstream,
            tasks,
            policy,
        }
    }

    pub async fn token(&self) -> Result<Token> {
        let keys = SlotKeys::token();
        let read = slots::read_pair(self.store.as_ref(), &keys, self.policy.read_ttl).await?;

        if let Some(fresh) = read.fresh {
            return Ok(Token::new(fresh.value));
        }

        let refresh = self.spawn_refresh(keys);

        match read.stale {
            Some(stale) => {
                debug!("Serving stale token while refreshing in background");
                Ok(Token::new(stale.value))
            }
            None => {
                debug!("No cached token, waiting for upstream");
                slots::join(refresh).await
            }
        }
    }

    fn spawn_refresh(&self, keys: SlotKeys) -> JoinHandle<Result<Token>> {
        let this = self.clone();

        self.tasks.spawn(async move {
            let token = this.upstream.acquire_token().await.map_err(|err| {
                warn!("Token acquisition failed: {}", err);
                // Authentication failures are never replayed from cache.
                Error::UpstreamNonCachable(err)
            })?;

            let writer = this.clone();
            let value = token.as_str().to_owned();
            this.tasks.spawn(async move {
                if let Err(e) = slots::write_pair(
                    writer.store.as_ref(),
                    &keys,
                    value,
                    writer.policy.fresh_expiry,
                    writer.policy.stale_expiry,
                )
                .await
                {
                    warn!("Failed to persist refreshed token: {}", e);
                }
            });

            Ok(token)
        })
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("policy", &self.policy)
            .finish()
    }
}
