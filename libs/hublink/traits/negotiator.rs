use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Short-lived connection credential returned by a negotiation call
///
/// Fetched fresh on every connect and reconnect attempt and never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub endpoint_url: String,
    pub access_token: String,
}

impl Credential {
    pub fn new(endpoint_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            access_token: access_token.into(),
        }
    }
}

// Keep tokens out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("endpoint_url", &self.endpoint_url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Trait for obtaining connection credentials
///
/// Implement this trait to define how the manager exchanges its
/// identity for a hub URL and access token. It is called on every
/// connection attempt, including every retry, since tokens expire.
///
/// # Example
/// ```ignore
/// struct FixedNegotiator;
///
/// #[async_trait::async_trait]
/// impl TokenNegotiator for FixedNegotiator {
///     async fn negotiate(&self) -> Result<Credential> {
///         Ok(Credential::new("wss://hub.example.com/client/hubs/chat", "token"))
///     }
/// }
/// ```
#[async_trait]
pub trait TokenNegotiator: Send + Sync {
    /// Fetch a fresh credential
    ///
    /// # Returns
    /// * `Ok(credential)` - Endpoint URL and access token
    /// * `Err(HubError::Negotiation)` - Non-success status or malformed body
    async fn negotiate(&self) -> Result<Credential>;
}

/// A negotiator that always returns the same credential
///
/// Useful for hubs that accept a long-lived token, and for tests.
pub struct StaticCredential(Credential);

impl StaticCredential {
    pub fn new(credential: Credential) -> Self {
        Self(credential)
    }
}

#[async_trait]
impl TokenNegotiator for StaticCredential {
    async fn negotiate(&self) -> Result<Credential> {
        Ok(self.0.clone())
    }
}
