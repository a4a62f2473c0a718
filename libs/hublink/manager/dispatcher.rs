//! Event handler registry and dispatch
//!
//! Handlers are plain callbacks; they run on the connection's event task
//! in delivery order and must not block. A panicking handler is logged and
//! does not stop delivery of later events.

use crate::config::HubMethods;
use crate::events::{ChatMessage, InboundEvent, ReadReceipt, TypingEvent};
use crate::state::ConnectionState;
use crate::traits::HubInvocation;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared callback
pub type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Optional handlers supplied by the caller
///
/// Every slot may be left empty; an event with no handler is dropped.
///
/// # Example
/// ```ignore
/// let handlers = EventHandlers::new()
///     .on_message_received(|message| println!("{}", message.content))
///     .on_user_typing(|typing| println!("{} is typing", typing.user_id));
/// ```
#[derive(Clone, Default)]
pub struct EventHandlers {
    message_received: Option<Handler<ChatMessage>>,
    user_typing: Option<Handler<TypingEvent>>,
    user_stopped_typing: Option<Handler<TypingEvent>>,
    message_read: Option<Handler<ReadReceipt>>,
    connection_change: Option<Handler<ConnectionState>>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message_received(mut self, handler: impl Fn(ChatMessage) + Send + Sync + 'static) -> Self {
        self.message_received = Some(Arc::new(handler));
        self
    }

    pub fn on_user_typing(mut self, handler: impl Fn(TypingEvent) + Send + Sync + 'static) -> Self {
        self.user_typing = Some(Arc::new(handler));
        self
    }

    pub fn on_user_stopped_typing(
        mut self,
        handler: impl Fn(TypingEvent) + Send + Sync + 'static,
    ) -> Self {
        self.user_stopped_typing = Some(Arc::new(handler));
        self
    }

    pub fn on_message_read(mut self, handler: impl Fn(ReadReceipt) + Send + Sync + 'static) -> Self {
        self.message_read = Some(Arc::new(handler));
        self
    }

    /// Called with every new `ConnectionState` snapshot
    pub fn on_connection_change(
        mut self,
        handler: impl Fn(ConnectionState) + Send + Sync + 'static,
    ) -> Self {
        self.connection_change = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("message_received", &self.message_received.is_some())
            .field("user_typing", &self.user_typing.is_some())
            .field("user_stopped_typing", &self.user_stopped_typing.is_some())
            .field("message_read", &self.message_read.is_some())
            .field("connection_change", &self.connection_change.is_some())
            .finish()
    }
}

/// Routes decoded hub events to the registered handlers
///
/// Once closed, no handler is ever invoked again.
pub struct EventDispatcher {
    handlers: EventHandlers,
    methods: HubMethods,
    closed: AtomicBool,
}

impl EventDispatcher {
    pub fn new(handlers: EventHandlers, methods: HubMethods) -> Self {
        Self {
            handlers,
            methods,
            closed: AtomicBool::new(false),
        }
    }

    /// Decode and dispatch a raw invocation
    ///
    /// Returns true when a handler ran. Unknown targets and malformed
    /// arguments are logged and dropped.
    pub fn dispatch_invocation(&self, invocation: &HubInvocation) -> bool {
        match InboundEvent::from_invocation(&self.methods, invocation) {
            Ok(Some(event)) => self.dispatch(event),
            Ok(None) => {
                debug!("[Dispatch] No route for hub method '{}'", invocation.target);
                false
            }
            Err(e) => {
                warn!("[Dispatch] Dropping '{}': {}", invocation.target, e);
                false
            }
        }
    }

    /// Dispatch a decoded event
    pub fn dispatch(&self, event: InboundEvent) -> bool {
        if self.is_closed() {
            return false;
        }

        let kind = event.kind();
        let handled = match event {
            InboundEvent::MessageReceived(message) => {
                call(kind, &self.handlers.message_received, message)
            }
            InboundEvent::UserTyping(typing) => call(kind, &self.handlers.user_typing, typing),
            InboundEvent::UserStoppedTyping(typing) => {
                call(kind, &self.handlers.user_stopped_typing, typing)
            }
            InboundEvent::MessageRead(receipt) => call(kind, &self.handlers.message_read, receipt),
        };

        if !handled {
            debug!("[Dispatch] No handler registered for {:?}", kind);
        }
        handled
    }

    /// Publish a connection state snapshot
    pub fn notify_connection_change(&self, state: &ConnectionState) -> bool {
        if self.is_closed() {
            return false;
        }
        call("ConnectionChange", &self.handlers.connection_change, state.clone())
    }

    /// Stop invoking handlers
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Run a handler, containing any panic; true when a handler was registered
fn call<T>(label: impl fmt::Debug, handler: &Option<Handler<T>>, value: T) -> bool {
    let Some(handler) = handler else {
        return false;
    };

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(value))) {
        warn!(
            "[Dispatch] {:?} handler panicked: {}",
            label,
            panic_message(payload.as_ref())
        );
    }
    true
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
