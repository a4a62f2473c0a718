//! Identity channel membership
//!
//! After every (re)connect the manager joins the channel named after the
//! signed-in user so the hub can address them directly. Joining is best
//! effort: a failure is logged and never tears down the connection.

use crate::traits::{HubConnection, IdentitySource};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct GroupMembership {
    identity: Arc<dyn IdentitySource>,
    join_method: String,
}

impl GroupMembership {
    pub fn new(identity: Arc<dyn IdentitySource>, join_method: impl Into<String>) -> Self {
        Self {
            identity,
            join_method: join_method.into(),
        }
    }

    /// Join the channel for whatever identity is current right now
    pub async fn join_current(&self, connection: &dyn HubConnection) -> bool {
        match self.identity.identity() {
            Some(identity) => self.join_identity_channel(connection, &identity).await,
            None => {
                debug!("[Groups] No identity, skipping group join");
                false
            }
        }
    }

    /// Ask the hub to add this connection to `identity`'s channel
    ///
    /// Returns false for an empty identity or when the hub rejects the call.
    pub async fn join_identity_channel(&self, connection: &dyn HubConnection, identity: &str) -> bool {
        if identity.trim().is_empty() {
            debug!("[Groups] Empty identity, skipping group join");
            return false;
        }

        match connection
            .invoke(&self.join_method, vec![json!(identity)])
            .await
        {
            Ok(()) => {
                info!("[Groups] Joined identity channel");
                true
            }
            Err(e) => {
                warn!("[Groups] Failed to join identity channel: {}", e);
                false
            }
        }
    }
}
