use serde::{Deserialize, Serialize};
use shared::{Error, Result, UpstreamError};
use std::fmt;
use std::time::Duration;

/// Opaque record returned by the upstream lookup.
pub type RecordValue = serde_json::Value;

/// Upstream authentication token.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens end up in logs through `{:?}` on containing types.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&"<redacted>").finish()
    }
}

/// Result of one upstream lookup as it is persisted in the cache.
///
/// Serialized as `{"result": ...}` or `{"error": ...}`. Only cachable
/// upstream errors are ever represented here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum QueryOutcome {
    #[serde(rename = "result")]
    Result(RecordValue),
    #[serde(rename = "error")]
    CachableError(UpstreamError),
}

impl QueryOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, QueryOutcome::CachableError(_))
    }

    /// Re-raises a persisted cachable error as a failure for the caller.
    pub fn into_result(self) -> Result<RecordValue> {
        match self {
            QueryOutcome::Result(record) => Ok(record),
            QueryOutcome::CachableError(err) => Err(Error::UpstreamCachable(err)),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// A value read back from a cache store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: String,
    /// Remaining lifetime in the store, `None` when the store does not expire it.
    pub expires_in: Option<Duration>,
}

impl CacheEntry {
    pub fn new(value: impl Into<String>, expires_in: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            expires_in,
        }
    }
}

/// Expiry settings for the token slots.
#[derive(Clone, Copy, Debug)]
pub struct TokenPolicy {
    pub read_ttl: Option<Duration>,
    pub fresh_expiry: Duration,
    pub stale_expiry: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            read_ttl: Some(Duration::from_secs(60)),
            fresh_expiry: Duration::from_secs(120),
            stale_expiry: Duration::from_secs(240),
        }
    }
}

/// Expiry settings for the query result slots.
#[derive(Clone, Copy, Debug)]
pub struct QueryPolicy {
    pub read_ttl: Option<Duration>,
    pub fresh_expiry: Duration,
    /// Fresh expiry used when the outcome is a cachable error.
    pub error_expiry: Duration,
    pub stale_expiry: Duration,
}

impl QueryPolicy {
    pub fn fresh_expiry_for(&self, outcome: &QueryOutcome) -> Duration {
        if outcome.is_error() {
            self.error_expiry
        } else {
            self.fresh_expiry
        }
    }
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            read_ttl: Some(Duration::from_secs(60)),
            fresh_expiry: Duration::from_secs(3600),
            error_expiry: Duration::from_secs(600),
            stale_expiry: Duration::from_secs(24 * 3600),
        }
    }
}
