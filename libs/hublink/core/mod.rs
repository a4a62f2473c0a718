//! # HubLink Core
//!
//! Building blocks of the connection manager: protocol codec, WebSocket
//! transport, HTTP negotiation, keep-alive, configuration, state
//! snapshots, inbound event DTOs and the type-state builder.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hublink::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = hublink::builder()
//!         .negotiator(HttpNegotiator::new("https://api.example.com/realtime/negotiate")?)
//!         .identity(StaticIdentity::new("user@example.com"))
//!         .handlers(
//!             EventHandlers::new()
//!                 .on_message_received(|message| println!("{}: {}", message.sender_id, message.content))
//!                 .on_connection_change(|state| println!("connected={}", state.is_connected)),
//!         )
//!         .websocket()
//!         .build()?;
//!
//!     manager.connect().await;
//!     manager.send_typing_indicator("conv-1", true).await;
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod events;
pub mod heartbeat;
pub mod negotiator;
pub mod protocol;
pub mod state;
pub mod websocket;

// Re-export main types
pub use builder::{states, HubClientBuilder};
pub use config::{HubMethods, ManagerConfig, RetryPolicy, TransportConfig};
pub use events::{ChatMessage, EventKind, InboundEvent, ReadReceipt, TypingEvent};
pub use heartbeat::{KeepAlive, KeepAliveTick};
pub use negotiator::HttpNegotiator;
pub use protocol::HubMessage;
pub use state::{ConnectionState, Phase};
pub use websocket::{WebSocketConnection, WebSocketTransport};

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new connection manager builder
pub fn builder() -> HubClientBuilder<builder::states::NoNegotiator, builder::states::NoTransport> {
    HubClientBuilder::new()
}
