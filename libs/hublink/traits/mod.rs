//! # HubLink Traits
//!
//! Core traits and types for the HubLink connection manager.
//!
//! - **TokenNegotiator**: Fetch a short-lived URL + access token
//! - **Transport / HubConnection**: Open and drive a hub connection
//! - **ReconnectionStrategy**: Decide when to retry
//! - **IdentitySource**: Supply the identity channel to join
//!
//! ## Example
//!
//! ```rust,ignore
//! use hublink::traits::*;
//!
//! struct MyNegotiator;
//!
//! #[async_trait]
//! impl TokenNegotiator for MyNegotiator {
//!     async fn negotiate(&self) -> Result<Credential> {
//!         // Call your backend here
//!     }
//! }
//! ```

pub mod error;
pub mod identity;
pub mod negotiator;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use error::{HubError, Result};
pub use identity::{IdentitySource, NoIdentity, SharedIdentity, StaticIdentity};
pub use negotiator::{Credential, StaticCredential, TokenNegotiator};
pub use reconnect::{
    DelayTable, ExponentialBackoff, NeverReconnect, ReconnectionStrategy, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_DELAYS,
};
pub use transport::{
    HubConnection, HubInvocation, OpenedConnection, Transport, TransportEvent, TransportEvents,
};
