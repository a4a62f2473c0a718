use parking_lot::RwLock;
use std::sync::Arc;

/// Trait for supplying the signed-in user's identity
///
/// The identity is read at the moment the manager joins its identity
/// channel (after every successful connect or reconnect), so an
/// implementation can reflect sign-in and sign-out without rebuilding
/// the manager. The manager neither owns nor validates the value.
pub trait IdentitySource: Send + Sync {
    /// Current identity (an email or user id), or `None` when signed out
    fn identity(&self) -> Option<String>;
}

/// No signed-in user; group membership is skipped
pub struct NoIdentity;

impl IdentitySource for NoIdentity {
    fn identity(&self) -> Option<String> {
        None
    }
}

/// A fixed identity string
pub struct StaticIdentity(String);

impl StaticIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }
}

impl IdentitySource for StaticIdentity {
    fn identity(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Identity that the application updates on sign-in/sign-out
#[derive(Clone, Default)]
pub struct SharedIdentity {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, identity: Option<String>) {
        *self.inner.write() = identity;
    }
}

impl IdentitySource for SharedIdentity {
    fn identity(&self) -> Option<String> {
        self.inner.read().clone()
    }
}
