//! HTTP token negotiation
//!
//! Fetches a hub endpoint and short-lived access token from the
//! application backend before every connection attempt.

use crate::traits::*;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Negotiation response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegotiateResponse {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// `TokenNegotiator` backed by an HTTP endpoint
///
/// Sends `POST {url}` (with `?userId=...` when an identity is known) and
/// expects `{"url": "...", "accessToken": "..."}` back.
pub struct HttpNegotiator {
    client: Client,
    url: String,
    access_key: Option<String>,
    identity: Arc<dyn IdentitySource>,
}

impl HttpNegotiator {
    /// Create a negotiator for `url`
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| HubError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            access_key: None,
            identity: Arc::new(NoIdentity),
        })
    }

    /// Send `Authorization: Bearer <key>` to the negotiation endpoint
    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }

    /// Pass the current identity as the `userId` query parameter
    pub fn with_identity(mut self, identity: Arc<dyn IdentitySource>) -> Self {
        self.identity = identity;
        self
    }
}

#[async_trait]
impl TokenNegotiator for HttpNegotiator {
    async fn negotiate(&self) -> Result<Credential> {
        let mut request = self.client.post(&self.url);
        if let Some(identity) = self.identity.identity() {
            request = request.query(&[("userId", identity)]);
        }
        if let Some(ref key) = self.access_key {
            request = request.bearer_auth(key);
        }

        debug!("[Negotiate] POST {}", self.url);

        let response = request
            .send()
            .await
            .map_err(|e| HubError::Negotiation(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HubError::Negotiation(format!("failed to read body: {}", e)))?;

        parse_negotiate_response(status, &body)
    }
}

/// Turn a negotiation response into a credential
pub fn parse_negotiate_response(status: StatusCode, body: &str) -> Result<Credential> {
    if !status.is_success() {
        warn!("[Negotiate] Endpoint returned {}", status);
        return Err(HubError::Negotiation(format!("HTTP {}: {}", status, body.trim())));
    }

    let response: NegotiateResponse = serde_json::from_str(body)
        .map_err(|e| HubError::Negotiation(format!("invalid response: {}", e)))?;

    let url = response
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| HubError::Negotiation("response is missing url".into()))?;
    let token = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| HubError::Negotiation("response is missing accessToken".into()))?;

    Ok(Credential::new(url, token))
}
