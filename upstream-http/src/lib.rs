//! HTTP client for the upstream ICP record service.
//!
//! Every response is wrapped in an envelope:
//!
//! ```json
//! {"ok": true, "data": {...}}
//! {"ok": false, "code": "DOMAIN_NOT_FOUND", "msg": "..."}
//! ```
//!
//! Failures are turned into [`UpstreamError`]s whose cachability is decided
//! by the configured [`ErrorClassifier`].

use async_trait::async_trait;
use icp_cache::domain::{RecordValue, Token};
use icp_cache::ports::Upstream;
use icp_cache::ErrorClassifier;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::config::UpstreamConfig;
use shared::{Error, Result, UpstreamError};
use tracing::debug;

#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Deserialize)]
struct TokenData {
    token: String,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    domain: &'a str,
}

pub struct HttpUpstream {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    classifier: ErrorClassifier,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig, classifier: ErrorClassifier) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            classifier,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, UpstreamError> {
        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::transport(e.to_string()))?;

        let envelope = serde_json::from_slice::<Envelope>(&body).ok();
        debug!("Upstream answered {} ({} bytes)", status, body.len());

        if !status.is_success() {
            let (code, msg) = envelope.map(|e| (e.code, e.msg)).unwrap_or_default();
            let message = msg.unwrap_or_else(|| status.to_string());
            return Err(self
                .classifier
                .classify(UpstreamError::new(Some(status.as_u16()), code, message)));
        }

        let malformed = |what: &str| {
            UpstreamError::new(
                Some(status.as_u16()),
                None,
                format!("malformed upstream response: {what}"),
            )
        };

        let envelope = envelope.ok_or_else(|| malformed("not an envelope"))?;

        if !envelope.ok {
            let message = envelope
                .msg
                .unwrap_or_else(|| "upstream reported failure".to_string());
            return Err(self.classifier.classify(UpstreamError::new(
                Some(status.as_u16()),
                envelope.code,
                message,
            )));
        }

        let data = envelope.data.ok_or_else(|| malformed("missing data"))?;
        serde_json::from_value(data).map_err(|e| malformed(&e.to_string()))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn acquire_token(&self) -> std::result::Result<Token, UpstreamError> {
        let request = self.client.post(self.url("/auth/token")).json(&TokenRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
        });

        let data: TokenData = self.call(request).await?;
        Ok(Token::new(data.token))
    }

    async fn query(
        &self,
        token: &Token,
        subject: &str,
    ) -> std::result::Result<RecordValue, UpstreamError> {
        let request = self
            .client
            .post(self.url("/query"))
            .bearer_auth(token.as_str())
            .json(&QueryRequest { domain: subject });

        self.call(request).await
    }
}

impl std::fmt::Debug for HttpUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUpstream")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .finish()
    }
}
