// shared/src/lib.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("not found")]
    NotFound,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream failure: {0}")]
    UpstreamNonCachable(UpstreamError),
    #[error("upstream rejected lookup: {0}")]
    UpstreamCachable(UpstreamError),
    #[error("cache store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by the upstream record service.
///
/// Cachable failures are persisted next to successful results and replayed to
/// later callers, so this type round-trips through the cache payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub cachable: bool,
}

impl UpstreamError {
    /// Transport-level failure (connection refused, reset, client timeout).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            cachable: false,
        }
    }

    pub fn new(status: Option<u16>, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            cachable: false,
        }
    }

    pub fn cachable(mut self, cachable: bool) -> Self {
        self.cachable = cachable;
        self
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "[{status} {code}] {}", self.message),
            (Some(status), None) => write!(f, "[{status}] {}", self.message),
            (None, Some(code)) => write!(f, "[{code}] {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

pub mod config;
