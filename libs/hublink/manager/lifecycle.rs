//! Connection lifecycle controller
//!
//! Owns the single logical hub connection: connect, disconnect, the
//! outer retry schedule and the translation of transport events into
//! `ConnectionState` snapshots.
//!
//! # Concurrency
//!
//! All lifecycle fields live behind one `parking_lot::Mutex` that is
//! never held across an `.await`. Every asynchronous continuation
//! (attempt completion, retry timer, transport event) captures the
//! `epoch` it was started under and is discarded if the epoch moved on:
//!
//! ```text
//! epoch += 1 on:  connect()        -> stale timers are dead
//!                 disconnect()     -> in-flight attempt and old events are dead
//!                 successful open  -> events of the new connection are live
//! ```
//!
//! Handlers and connection closes always run after the lock is released.

use crate::config::HubMethods;
use crate::manager::dispatcher::{EventDispatcher, EventHandlers};
use crate::manager::groups::GroupMembership;
use crate::state::{ConnectionState, Phase};
use crate::traits::*;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to the connection manager
///
/// Cheap to clone; all clones drive the same connection. Dropping the
/// last clone tears the connection down.
#[derive(Clone)]
pub struct ConnectionManager {
    pub(super) inner: Arc<Inner>,
}

pub(super) struct Inner {
    negotiator: Arc<dyn TokenNegotiator>,
    transport: Arc<dyn Transport>,
    strategy: Box<dyn ReconnectionStrategy>,
    dispatcher: EventDispatcher,
    groups: GroupMembership,
    pub(super) methods: HubMethods,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<ConnectionState>,
}

struct Lifecycle {
    phase: Phase,
    epoch: u64,
    /// Consecutive outer retries since the last successful open
    retry_attempt: usize,
    error: Option<String>,
    last_retry_attempt: Option<DateTime<Utc>>,
    connection: Option<Arc<dyn HubConnection>>,
    retry_timer: Option<JoinHandle<()>>,
    event_pump: Option<JoinHandle<()>>,
    shut_down: bool,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            epoch: 0,
            retry_attempt: 0,
            error: None,
            last_retry_attempt: None,
            connection: None,
            retry_timer: None,
            event_pump: None,
            shut_down: false,
        }
    }

    fn is_live(&self, epoch: u64) -> bool {
        !self.shut_down && self.epoch == epoch
    }

    fn cancel_retry_timer(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }

    fn stop_event_pump(&mut self) {
        if let Some(pump) = self.event_pump.take() {
            pump.abort();
        }
    }
}

enum AttemptOutcome {
    Stale(Option<Arc<dyn HubConnection>>),
    Connected(ConnectionState, Arc<dyn HubConnection>),
    Failed(ConnectionState),
}

impl ConnectionManager {
    pub(crate) fn new(
        negotiator: Arc<dyn TokenNegotiator>,
        transport: Arc<dyn Transport>,
        strategy: Box<dyn ReconnectionStrategy>,
        handlers: EventHandlers,
        identity: Arc<dyn IdentitySource>,
        methods: HubMethods,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::idle());

        Self {
            inner: Arc::new(Inner {
                negotiator,
                transport,
                strategy,
                dispatcher: EventDispatcher::new(handlers, methods.clone()),
                groups: GroupMembership::new(identity, methods.join_group.clone()),
                methods,
                lifecycle: Mutex::new(Lifecycle::new()),
                state_tx,
            }),
        }
    }

    /// Open the connection
    ///
    /// No-op while already connected or connecting. Otherwise cancels
    /// any pending retry, resets the retry budget and makes one attempt
    /// (negotiate, then open). Resolves once that attempt has completed;
    /// a failure is reflected in the returned state and schedules a retry.
    pub async fn connect(&self) -> ConnectionState {
        let (epoch, state) = {
            let mut lc = self.inner.lifecycle.lock();
            if lc.shut_down {
                warn!("[HubLink] connect() called after shutdown, ignoring");
                return self.state();
            }
            if lc.phase.is_connected() || lc.phase.is_connecting() {
                debug!("[HubLink] connect() ignored, already {:?}", lc.phase);
                return self.state();
            }

            lc.cancel_retry_timer();
            lc.retry_attempt = 0;
            lc.epoch += 1;
            let state = self.inner.transition(&mut lc, Phase::Connecting, None);
            (lc.epoch, state)
        };

        info!("[HubLink] Connecting");
        self.inner.dispatcher.notify_connection_change(&state);

        // Run the attempt on its own task so dropping this future cannot
        // strand the lifecycle in Connecting
        let inner = Arc::clone(&self.inner);
        if let Err(e) = tokio::spawn(async move { inner.attempt(epoch).await }).await {
            warn!("[HubLink] Connection attempt task failed: {}", e);
        }

        self.state()
    }

    /// Close the connection and cancel any pending retry
    ///
    /// Always ends in the idle state with no error, from any state.
    pub async fn disconnect(&self) {
        let (connection, state) = {
            let mut lc = self.inner.lifecycle.lock();
            lc.epoch += 1;
            lc.cancel_retry_timer();
            lc.stop_event_pump();
            lc.retry_attempt = 0;

            let connection = lc.connection.take();
            let changed = lc.phase != Phase::Idle || lc.error.is_some();
            let state = self.inner.transition(&mut lc, Phase::Idle, None);
            (connection, changed.then_some(state))
        };

        if let Some(state) = state {
            info!("[HubLink] Disconnected");
            self.inner.dispatcher.notify_connection_change(&state);
        }

        if let Some(connection) = connection {
            if let Err(e) = connection.close().await {
                warn!("[HubLink] Error while closing connection: {}", e);
            }
        }
    }

    /// Disconnect for good
    ///
    /// After this returns no handler is invoked again and `connect()` is
    /// ignored.
    pub async fn shutdown(&self) {
        self.inner.lifecycle.lock().shut_down = true;
        self.inner.dispatcher.close();
        self.disconnect().await;
        info!("[HubLink] Shut down");
    }

    /// Current state snapshot
    pub fn state(&self) -> ConnectionState {
        self.inner.state_tx.borrow().clone()
    }

    /// Watch state snapshots as they change
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Internal lifecycle phase
    pub fn phase(&self) -> Phase {
        self.inner.lifecycle.lock().phase
    }

    /// Consecutive outer retries scheduled since the last successful open
    pub fn retry_attempt(&self) -> usize {
        self.inner.lifecycle.lock().retry_attempt
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lifecycle.lock().shut_down
    }
}

impl Inner {
    /// The live connection, if the phase allows invocations
    pub(super) fn live_connection(&self) -> Result<Arc<dyn HubConnection>> {
        let lc = self.lifecycle.lock();
        match &lc.connection {
            Some(connection) if lc.phase.is_connected() => Ok(Arc::clone(connection)),
            _ => Err(HubError::NotConnected),
        }
    }

    fn transition(&self, lc: &mut Lifecycle, phase: Phase, error: Option<String>) -> ConnectionState {
        if lc.phase != phase {
            debug!("[HubLink] {:?} -> {:?}", lc.phase, phase);
        }
        lc.phase = phase;
        lc.error = error;

        let state = ConnectionState::from_phase(phase, lc.error.clone(), lc.last_retry_attempt);
        self.state_tx.send_replace(state.clone());
        state
    }

    async fn open(&self) -> Result<OpenedConnection> {
        let credential = self.negotiator.negotiate().await?;
        debug!("[HubLink] Negotiated endpoint {}", credential.endpoint_url);
        self.transport.open(&credential).await
    }

    /// One negotiate-and-open attempt started under `epoch`
    async fn attempt(self: &Arc<Self>, epoch: u64) {
        let result = self.open().await;

        let outcome = {
            let mut lc = self.lifecycle.lock();
            if !lc.is_live(epoch) || lc.phase != Phase::Connecting {
                AttemptOutcome::Stale(result.ok().map(|opened| opened.connection))
            } else {
                match result {
                    Ok(opened) => {
                        lc.epoch += 1;
                        lc.retry_attempt = 0;
                        lc.stop_event_pump();
                        lc.connection = Some(Arc::clone(&opened.connection));
                        lc.event_pump = Some(self.spawn_event_pump(opened.events, lc.epoch));
                        let state = self.transition(&mut lc, Phase::Connected, None);
                        AttemptOutcome::Connected(state, opened.connection)
                    }
                    Err(e) => {
                        warn!("[HubLink] Connection attempt failed: {}", e);
                        AttemptOutcome::Failed(self.schedule_retry(&mut lc, e.to_string()))
                    }
                }
            }
        };

        match outcome {
            AttemptOutcome::Stale(connection) => {
                debug!("[HubLink] Discarding stale connection attempt");
                if let Some(connection) = connection {
                    let _ = connection.close().await;
                }
            }
            AttemptOutcome::Connected(state, connection) => {
                info!("[HubLink] Connected");
                self.dispatcher.notify_connection_change(&state);
                self.groups.join_current(connection.as_ref()).await;
            }
            AttemptOutcome::Failed(state) => {
                self.dispatcher.notify_connection_change(&state);
            }
        }
    }

    /// Consult the strategy: arm a retry timer or give up
    fn schedule_retry(self: &Arc<Self>, lc: &mut Lifecycle, error: String) -> ConnectionState {
        lc.last_retry_attempt = Some(Utc::now());
        lc.cancel_retry_timer();

        match self.strategy.next_delay(lc.retry_attempt) {
            Some(delay) => {
                lc.retry_attempt += 1;
                info!(
                    "[HubLink] Retrying in {:?} (attempt {}): {}",
                    delay, lc.retry_attempt, error
                );

                let weak = Arc::downgrade(self);
                let epoch = lc.epoch;
                lc.retry_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.on_retry_timer(epoch).await;
                    }
                }));

                self.transition(lc, Phase::RetryPending, Some(error))
            }
            None => {
                warn!(
                    "[HubLink] Giving up after {} retries: {}",
                    lc.retry_attempt, error
                );
                self.transition(lc, Phase::Failed, Some(error))
            }
        }
    }

    async fn on_retry_timer(self: Arc<Self>, epoch: u64) {
        let state = {
            let mut lc = self.lifecycle.lock();
            if !lc.is_live(epoch) || lc.phase != Phase::RetryPending {
                debug!("[HubLink] Ignoring stale retry timer");
                return;
            }
            // Detach rather than abort: this task is the timer
            lc.retry_timer = None;
            let error = lc.error.clone();
            self.transition(&mut lc, Phase::Connecting, error)
        };

        self.dispatcher.notify_connection_change(&state);
        self.attempt(epoch).await;
    }

    fn spawn_event_pump(self: &Arc<Self>, events: TransportEvents, epoch: u64) -> JoinHandle<()> {
        tokio::spawn(Self::pump(Arc::downgrade(self), events, epoch))
    }

    async fn pump(weak: Weak<Inner>, mut events: TransportEvents, epoch: u64) {
        loop {
            let event = events.recv().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };

            // A stream that ends without Closed still ends the connection
            let event = event.unwrap_or_else(|| {
                warn!("[HubLink] Transport event stream ended without a close");
                TransportEvent::Closed(Some("event stream ended".to_string()))
            });
            if !inner.handle_transport_event(event, epoch).await {
                break;
            }
        }
        debug!("[HubLink] Event pump for epoch {} finished", epoch);
    }

    /// Apply one transport event; false once the stream is finished or stale
    async fn handle_transport_event(self: &Arc<Self>, event: TransportEvent, epoch: u64) -> bool {
        match event {
            TransportEvent::Invocation(invocation) => {
                if !self.lifecycle.lock().is_live(epoch) {
                    return false;
                }
                self.dispatcher.dispatch_invocation(&invocation);
                true
            }

            TransportEvent::Reconnecting(reason) => {
                let state = {
                    let mut lc = self.lifecycle.lock();
                    if !lc.is_live(epoch) {
                        return false;
                    }
                    if lc.phase != Phase::Connected {
                        return true;
                    }
                    self.transition(&mut lc, Phase::Reconnecting, reason)
                };

                warn!("[HubLink] Connection interrupted, transport is reconnecting");
                self.dispatcher.notify_connection_change(&state);
                true
            }

            TransportEvent::Reconnected => {
                let (state, connection) = {
                    let mut lc = self.lifecycle.lock();
                    if !lc.is_live(epoch) {
                        return false;
                    }
                    lc.retry_attempt = 0;
                    let state = self.transition(&mut lc, Phase::Connected, None);
                    (state, lc.connection.clone())
                };

                info!("[HubLink] Transport reconnected");
                self.dispatcher.notify_connection_change(&state);
                if let Some(connection) = connection {
                    self.groups.join_current(connection.as_ref()).await;
                }
                true
            }

            TransportEvent::Closed(reason) => {
                let state = {
                    let mut lc = self.lifecycle.lock();
                    if !lc.is_live(epoch) {
                        return false;
                    }
                    lc.connection = None;
                    // This task is the pump; let it finish on its own
                    lc.event_pump = None;
                    let error = reason.unwrap_or_else(|| "Connection closed".to_string());
                    warn!("[HubLink] Connection closed: {}", error);
                    self.schedule_retry(&mut lc, error)
                };

                self.dispatcher.notify_connection_change(&state);
                false
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.dispatcher.close();
        let lc = self.lifecycle.get_mut();
        lc.cancel_retry_timer();
        lc.stop_event_pump();
        let Some(connection) = lc.connection.take() else {
            return;
        };

        debug!("[HubLink] Manager dropped with a live connection, closing it");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = connection.close().await {
                        debug!("[HubLink] Error closing dropped connection: {}", e);
                    }
                });
            }
            Err(_) => warn!("[HubLink] No runtime to close the dropped connection on"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct UnreachableHub;

    #[async_trait]
    impl Transport for UnreachableHub {
        async fn open(&self, _credential: &Credential) -> Result<OpenedConnection> {
            Err(HubError::Transport("connection refused".into()))
        }
    }

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(StaticCredential::new(Credential::new("ws://localhost:1", "t"))),
            Arc::new(UnreachableHub),
            Box::new(NeverReconnect),
            EventHandlers::default(),
            Arc::new(NoIdentity),
            HubMethods::default(),
        )
    }

    #[test]
    fn test_idle_manager_reports_not_connected() {
        assert!(matches!(
            manager().inner.live_connection(),
            Err(HubError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_failed_connect_reports_not_connected() {
        let manager = manager();

        let state = manager.connect().await;

        assert!(!state.is_connected);
        assert_eq!(manager.phase(), Phase::Failed);
        assert!(matches!(
            manager.inner.live_connection(),
            Err(HubError::NotConnected)
        ));
    }
}
