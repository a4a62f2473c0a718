//! Transport Abstraction
//!
//! The manager talks to the hub through two traits:
//!
//! - **Transport**: opens a connection with a negotiated credential
//! - **HubConnection**: the live handle used for invocations and close
//!
//! Everything the connection observes afterwards arrives on the
//! `events` channel returned by `open`, in delivery order:
//!
//! ```text
//! Transport::open(credential)
//!        │
//!        ├─> HubConnection ──invoke()/close()──> hub
//!        │
//!        └─> events: Invocation, Invocation, Reconnecting, Reconnected, ..., Closed
//! ```
//!
//! `Closed` is always the last event of a connection. `Reconnecting` and
//! `Reconnected` report the transport's own built-in recovery; a transport
//! without one simply never sends them.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A server-to-client method call
#[derive(Debug, Clone, PartialEq)]
pub struct HubInvocation {
    /// Hub method name, e.g. `ReceiveMessage`
    pub target: String,
    /// Positional arguments
    pub arguments: Vec<Value>,
}

impl HubInvocation {
    pub fn new(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            arguments,
        }
    }
}

/// Events emitted by a live connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Inbound hub invocation
    Invocation(HubInvocation),
    /// Connection dropped; the transport is retrying on its own
    Reconnecting(Option<String>),
    /// The transport's own retry succeeded
    Reconnected,
    /// Terminal close with an optional reason
    Closed(Option<String>),
}

/// Receiving end of a connection's event stream
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// A freshly opened connection and its event stream
pub struct OpenedConnection {
    pub connection: Arc<dyn HubConnection>,
    pub events: TransportEvents,
}

/// Live connection handle
///
/// The manager calls `close()` on disconnect and, when a tokio runtime
/// is available, after the manager itself is dropped. Without a runtime
/// the handle is only dropped, so implementations should also release
/// the connection when the last handle goes away.
#[async_trait]
pub trait HubConnection: Send + Sync {
    /// Invoke a hub method and wait for its completion
    ///
    /// # Returns
    /// * `Ok(())` - The hub completed the invocation without error
    /// * `Err(HubError::InvocationFailed)` - The hub rejected it
    /// * `Err(HubError::Transport)` - Network fault
    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<()>;

    /// Close the connection
    ///
    /// Closing is idempotent. After close the event stream ends with
    /// `Closed`.
    async fn close(&self) -> Result<()>;
}

/// Factory for hub connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `credential.endpoint_url` authenticated with
    /// `credential.access_token`
    async fn open(&self, credential: &crate::Credential) -> Result<OpenedConnection>;
}
