use icp_cache::IcpResolver;
use std::time::Duration;

/// Server state shared across handlers
#[derive(Clone, Debug)]
pub struct AppState {
    pub resolver: IcpResolver,
    /// Latency budget handed to every lookup.
    pub deadline: Duration,
}

impl AppState {
    pub fn new(resolver: IcpResolver, deadline: Duration) -> Self {
        Self { resolver, deadline }
    }
}
