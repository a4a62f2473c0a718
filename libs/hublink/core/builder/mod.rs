pub mod states;

use crate::config::ManagerConfig;
use crate::manager::{ConnectionManager, EventHandlers};
use crate::traits::*;
use crate::websocket::WebSocketTransport;
use states::*;
use std::sync::Arc;

enum TransportSlot {
    Unset,
    WebSocket,
    Custom(Arc<dyn Transport>),
}

/// Type-state builder for `ConnectionManager`
///
/// The negotiator and the transport are required; `build()` is only
/// available once both are set. Everything else has a default:
/// no identity, no handlers, `ManagerConfig::default()`, and the retry
/// strategy described by `config.retry`.
pub struct HubClientBuilder<N, T>
where
    N: NegotiatorState,
    T: TransportState,
{
    _state: TypeState<N, T>,
    negotiator: Option<Arc<dyn TokenNegotiator>>,
    transport: TransportSlot,
    identity: Arc<dyn IdentitySource>,
    handlers: EventHandlers,
    config: ManagerConfig,
    retry_strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl HubClientBuilder<NoNegotiator, NoTransport> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            negotiator: None,
            transport: TransportSlot::Unset,
            identity: Arc::new(NoIdentity),
            handlers: EventHandlers::default(),
            config: ManagerConfig::default(),
            retry_strategy: None,
        }
    }
}

impl Default for HubClientBuilder<NoNegotiator, NoTransport> {
    fn default() -> Self {
        Self::new()
    }
}

// Negotiator setting
impl<T> HubClientBuilder<NoNegotiator, T>
where
    T: TransportState,
{
    pub fn negotiator(
        self,
        negotiator: impl TokenNegotiator + 'static,
    ) -> HubClientBuilder<HasNegotiator, T> {
        self.shared_negotiator(Arc::new(negotiator))
    }

    /// Use a negotiator that is shared with other code
    pub fn shared_negotiator(
        self,
        negotiator: Arc<dyn TokenNegotiator>,
    ) -> HubClientBuilder<HasNegotiator, T> {
        HubClientBuilder {
            _state: TypeState::new(),
            negotiator: Some(negotiator),
            transport: self.transport,
            identity: self.identity,
            handlers: self.handlers,
            config: self.config,
            retry_strategy: self.retry_strategy,
        }
    }
}

// Transport setting
impl<N> HubClientBuilder<N, NoTransport>
where
    N: NegotiatorState,
{
    pub fn transport(self, transport: impl Transport + 'static) -> HubClientBuilder<N, HasTransport> {
        self.with_transport(TransportSlot::Custom(Arc::new(transport)))
    }

    /// Use the WebSocket transport configured by `config.transport`
    pub fn websocket(self) -> HubClientBuilder<N, HasTransport> {
        self.with_transport(TransportSlot::WebSocket)
    }

    fn with_transport(self, transport: TransportSlot) -> HubClientBuilder<N, HasTransport> {
        HubClientBuilder {
            _state: TypeState::new(),
            negotiator: self.negotiator,
            transport,
            identity: self.identity,
            handlers: self.handlers,
            config: self.config,
            retry_strategy: self.retry_strategy,
        }
    }
}

// Optional settings, available in any state
impl<N, T> HubClientBuilder<N, T>
where
    N: NegotiatorState,
    T: TransportState,
{
    pub fn identity(mut self, identity: impl IdentitySource + 'static) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    /// Use an identity source that is shared with other code
    pub fn shared_identity(mut self, identity: Arc<dyn IdentitySource>) -> Self {
        self.identity = identity;
        self
    }

    pub fn handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the retry strategy from `config.retry`
    pub fn retry_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.retry_strategy = Some(Box::new(strategy));
        self
    }
}

impl HubClientBuilder<HasNegotiator, HasTransport> {
    /// Build the connection manager
    ///
    /// The manager starts idle; call `connect()` to open the connection.
    pub fn build(self) -> Result<ConnectionManager> {
        let negotiator = self
            .negotiator
            .ok_or_else(|| HubError::Configuration("negotiator is required".into()))?;

        let transport: Arc<dyn Transport> = match self.transport {
            TransportSlot::WebSocket => {
                self.config.transport.validate()?;
                Arc::new(
                    WebSocketTransport::new(self.config.transport.clone())
                        .with_negotiator(Arc::clone(&negotiator)),
                )
            }
            TransportSlot::Custom(transport) => transport,
            TransportSlot::Unset => {
                return Err(HubError::Configuration("transport is required".into()))
            }
        };

        let strategy = self
            .retry_strategy
            .unwrap_or_else(|| self.config.retry.strategy());

        Ok(ConnectionManager::new(
            negotiator,
            transport,
            strategy,
            self.handlers,
            self.identity,
            self.config.methods,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;

    #[tokio::test]
    async fn test_build_with_websocket_validates_transport_config() {
        let config = ManagerConfig {
            transport: TransportConfig {
                keep_alive_interval_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        let result = HubClientBuilder::new()
            .negotiator(StaticCredential::new(Credential::new("ws://localhost:1", "t")))
            .config(config)
            .websocket()
            .build();

        assert!(matches!(result, Err(HubError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_built_manager_starts_idle() {
        let manager = HubClientBuilder::new()
            .websocket()
            .negotiator(StaticCredential::new(Credential::new("ws://localhost:1", "t")))
            .build()
            .unwrap();

        let state = manager.state();
        assert!(!state.is_connected);
        assert!(!state.is_connecting);
        assert_eq!(state.error, None);
    }
}
