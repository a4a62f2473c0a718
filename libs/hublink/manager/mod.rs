//! # HubLink Manager
//!
//! The connection lifecycle controller plus the pieces it drives:
//! inbound dispatch, identity channel membership and outbound invocations.

pub mod dispatcher;
pub mod groups;
pub mod invoker;
pub mod lifecycle;

pub use dispatcher::{EventDispatcher, EventHandlers, Handler};
pub use groups::GroupMembership;
pub use lifecycle::ConnectionManager;
