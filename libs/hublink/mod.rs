//! # HubLink
//!
//! Client-side connection manager for a real-time chat hub.
//!
//! ## Features
//!
//! - **Single logical connection**: one manager owns at most one live hub
//!   connection and exposes its state as immutable snapshots
//! - **Fresh credentials per attempt**: a `TokenNegotiator` is called on
//!   every connect and every retry
//! - **Two-tier recovery**: the transport's own quick reconnect, then a
//!   capped outer retry schedule once the transport gives up
//! - **Typed events**: hub invocations are decoded into DTOs and routed to
//!   registered handlers
//! - **Type-state builder**: negotiator and transport are enforced at compile time

pub mod traits;
pub mod core;
pub mod manager;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    builder, config, events, heartbeat, negotiator, protocol, state, websocket,
    builder::{states, HubClientBuilder},
    config::{HubMethods, ManagerConfig, RetryPolicy, TransportConfig},
    events::{ChatMessage, EventKind, InboundEvent, ReadReceipt, TypingEvent},
    negotiator::HttpNegotiator,
    state::{ConnectionState, Phase},
    websocket::{WebSocketConnection, WebSocketTransport},
};

// Re-export manager
pub use manager::{ConnectionManager, EventDispatcher, EventHandlers, GroupMembership};
