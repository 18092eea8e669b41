use icp_cache::IcpResolver;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodically refreshes the upstream token so lookups rarely wait on it.
///
/// The first tick fires immediately. Failures are logged and the loop keeps
/// going until `shutdown` is cancelled.
pub fn spawn_token_warmer(
    resolver: IcpResolver,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Token warmer running every {:?}", every);

        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match resolver.warm().await {
                    Ok(_) => debug!("Token warm"),
                    Err(e) => warn!("Token warm-up failed: {}", e),
                },
            }
        }

        info!("Token warmer stopped");
    })
}
