//! Test doubles shared by this crate's tests and, through the `test-util`
//! feature, by the server tests.

use crate::domain::{CacheEntry, RecordValue, Token};
use crate::ports::{CacheStore, Upstream};
use async_trait::async_trait;
use serde_json::json;
use shared::{Error, Result, UpstreamError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::task::TaskTracker;

/// Upstream fake that counts calls and answers from a script.
#[derive(Default)]
pub struct ScriptedUpstream {
    token_calls: AtomicUsize,
    query_calls: AtomicUsize,
    token_serial: AtomicUsize,
    token_failure: Mutex<Option<UpstreamError>>,
    failures: Mutex<HashMap<String, UpstreamError>>,
    delay: Mutex<Duration>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Every upstream call sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_tokens(&self, err: Option<UpstreamError>) {
        *self.token_failure.lock().unwrap() = err;
    }

    pub fn fail_subject(&self, subject: &str, err: UpstreamError) {
        self.failures.lock().unwrap().insert(subject.to_string(), err);
    }

    pub fn clear_failure(&self, subject: &str) {
        self.failures.lock().unwrap().remove(subject);
    }

    pub fn record_for(subject: &str) -> RecordValue {
        json!({"domain": subject, "unit": "Example Ltd", "licence": "ICP-000001"})
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn acquire_token(&self) -> std::result::Result<Token, UpstreamError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(err) = self.token_failure.lock().unwrap().clone() {
            return Err(err);
        }
        let serial = self.token_serial.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Token::new(format!("token-{serial}")))
    }

    async fn query(
        &self,
        token: &Token,
        subject: &str,
    ) -> std::result::Result<RecordValue, UpstreamError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        assert!(token.as_str().starts_with("token-"));
        self.pause().await;

        if let Some(err) = self.failures.lock().unwrap().get(subject).cloned() {
            return Err(err);
        }
        Ok(Self::record_for(subject))
    }
}

/// Store that is always down.
pub struct UnavailableStore;

#[async_trait]
impl CacheStore for UnavailableStore {
    async fn get(&self, _key: &str, _read_ttl: Option<Duration>) -> Result<Option<CacheEntry>> {
        Err(Error::StoreUnavailable("connection refused".into()))
    }

    async fn put(&self, _key: &str, _value: String, _expiry: Duration) -> Result<()> {
        Err(Error::StoreUnavailable("connection refused".into()))
    }
}

/// Waits until every detached task spawned so far has finished.
pub async fn settle(tasks: &TaskTracker) {
    tasks.close();
    tasks.wait().await;
    tasks.reopen();
}
