/// Type-state markers for the builder pattern
///
/// These types track which required parts (negotiator, transport) have
/// been supplied, so `build()` only exists once both are set.

use std::marker::PhantomData;

/// Marker trait for negotiator state
pub trait NegotiatorState {}

/// Negotiator has not been set
pub struct NoNegotiator;
impl NegotiatorState for NoNegotiator {}

/// Negotiator has been set
pub struct HasNegotiator;
impl NegotiatorState for HasNegotiator {}

/// Marker trait for transport state
pub trait TransportState {}

/// Transport has not been set
pub struct NoTransport;
impl TransportState for NoTransport {}

/// Transport has been set
pub struct HasTransport;
impl TransportState for HasTransport {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<N, T> {
    _negotiator: PhantomData<N>,
    _transport: PhantomData<T>,
}

impl<N, T> TypeState<N, T> {
    pub(crate) fn new() -> Self {
        Self {
            _negotiator: PhantomData,
            _transport: PhantomData,
        }
    }
}

impl<N, T> Default for TypeState<N, T> {
    fn default() -> Self {
        Self::new()
    }
}
