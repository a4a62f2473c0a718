//! Common test utilities for HubLink integration tests
//!
//! Scripted negotiators, an in-memory transport whose connections can be
//! driven from the test, and a mock hub speaking the JSON protocol over a
//! real WebSocket.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use hublink::protocol::{self, HubMessage};
use hublink::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Notify, Semaphore};
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub fn test_credential() -> Credential {
    Credential::new("wss://hub.test/client/?hub=chat", "token-1")
}

// ============================================================================
// Negotiators
// ============================================================================

/// Negotiator that replays a script of outcomes, then succeeds forever
#[derive(Clone, Default)]
pub struct ScriptedNegotiator {
    script: Arc<Mutex<VecDeque<std::result::Result<(), String>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `count` failures
    pub fn fail_times(self, count: usize, reason: &str) -> Self {
        {
            let mut script = self.script.lock();
            for _ in 0..count {
                script.push_back(Err(reason.to_string()));
            }
        }
        self
    }

    /// Queue one success
    pub fn succeed(self) -> Self {
        self.script.lock().push_back(Ok(()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenNegotiator for ScriptedNegotiator {
    async fn negotiate(&self) -> Result<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(Err(reason)) => Err(HubError::Negotiation(reason)),
            Some(Ok(())) | None => Ok(test_credential()),
        }
    }
}

/// Negotiator that blocks until the test releases it
#[derive(Clone)]
pub struct GatedNegotiator {
    gate: Arc<Semaphore>,
    calls: Arc<AtomicUsize>,
}

impl GatedNegotiator {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Let one pending negotiation through
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenNegotiator for GatedNegotiator {
    async fn negotiate(&self) -> Result<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| HubError::Negotiation("gate closed".into()))?;
        permit.forget();
        Ok(test_credential())
    }
}

/// Negotiator handing out `token-1`, `token-2`, ... for a fixed URL
#[derive(Clone)]
pub struct RotatingNegotiator {
    url: String,
    calls: Arc<AtomicUsize>,
}

impl RotatingNegotiator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenNegotiator for RotatingNegotiator {
    async fn negotiate(&self) -> Result<Credential> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Credential::new(self.url.clone(), format!("token-{}", call)))
    }
}

// ============================================================================
// In-memory transport
// ============================================================================

/// A connection handed out by `RecordingTransport`
pub struct FakeConnection {
    invocations: Mutex<Vec<HubInvocation>>,
    rejected: HashSet<String>,
    closed: AtomicBool,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
}

impl FakeConnection {
    /// Push an event as if the transport observed it
    pub fn emit(&self, event: TransportEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(event);
        }
    }

    /// End the event stream without a `Closed`, as a crashed transport would
    pub fn end_stream(&self) {
        self.events.lock().take();
    }

    /// Push a server-to-client invocation
    pub fn push(&self, target: &str, arguments: Vec<Value>) {
        self.emit(TransportEvent::Invocation(HubInvocation::new(target, arguments)));
    }

    pub fn invocations(&self) -> Vec<HubInvocation> {
        self.invocations.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HubConnection for FakeConnection {
    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<()> {
        if self.is_closed() {
            return Err(HubError::ConnectionClosed("closed".into()));
        }
        self.invocations
            .lock()
            .push(HubInvocation::new(target, arguments));

        if self.rejected.contains(target) {
            return Err(HubError::InvocationFailed {
                target: target.to_string(),
                reason: "rejected by test".to_string(),
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.emit(TransportEvent::Closed(None));
        }
        Ok(())
    }
}

/// Transport that records every open and hands out `FakeConnection`s
#[derive(Clone, Default)]
pub struct RecordingTransport {
    connections: Arc<Mutex<Vec<Arc<FakeConnection>>>>,
    rejected: Arc<Mutex<HashSet<String>>>,
    fail_next_opens: Arc<AtomicUsize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the hub reject invocations of `target` on new connections
    pub fn reject(self, target: &str) -> Self {
        self.rejected.lock().insert(target.to_string());
        self
    }

    /// Make the next `count` opens fail
    pub fn fail_opens(&self, count: usize) {
        self.fail_next_opens.store(count, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn connection(&self, index: usize) -> Arc<FakeConnection> {
        Arc::clone(&self.connections.lock()[index])
    }

    pub fn last_connection(&self) -> Arc<FakeConnection> {
        let connections = self.connections.lock();
        Arc::clone(connections.last().expect("no connection opened"))
    }

    /// Invocations of `target` across every connection, in order
    pub fn invocations_of(&self, target: &str) -> Vec<HubInvocation> {
        self.connections
            .lock()
            .iter()
            .flat_map(|c| c.invocations())
            .filter(|i| i.target == target)
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn open(&self, _credential: &Credential) -> Result<OpenedConnection> {
        let remaining = self.fail_next_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(HubError::Transport("connection refused".into()));
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        let connection = Arc::new(FakeConnection {
            invocations: Mutex::new(Vec::new()),
            rejected: self.rejected.lock().clone(),
            closed: AtomicBool::new(false),
            events: Mutex::new(Some(events_tx)),
        });
        self.connections.lock().push(Arc::clone(&connection));

        Ok(OpenedConnection {
            connection,
            events,
        })
    }
}

/// Collects every connection state snapshot handed to the handler
#[derive(Clone, Default)]
pub struct StateLog {
    states: Arc<Mutex<Vec<ConnectionState>>>,
}

impl StateLog {
    pub fn handlers(&self) -> EventHandlers {
        let states = Arc::clone(&self.states);
        EventHandlers::new().on_connection_change(move |state| states.lock().push(state))
    }

    pub fn snapshot(&self) -> Vec<ConnectionState> {
        self.states.lock().clone()
    }
}

/// Yield to other tasks until `condition` holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

// ============================================================================
// Mock hub over WebSocket
// ============================================================================

/// A mock hub speaking the JSON protocol
///
/// Completes every invocation that carries an id (with an error for
/// targets registered via `reject`), records them, and can push
/// invocations or drop every connection on demand.
pub struct MockHubServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<HubInvocation>>>,
    authorizations: Arc<Mutex<Vec<String>>>,
    push_tx: broadcast::Sender<String>,
    drop_all: Arc<Notify>,
    accepted: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
}

#[derive(Clone)]
struct HubBehavior {
    handshake_error: Option<String>,
    rejected: HashSet<String>,
}

impl MockHubServer {
    /// Create and start a mock hub
    pub async fn start() -> Self {
        Self::start_with(None, &[]).await
    }

    /// Start a hub that rejects the handshake
    pub async fn start_rejecting_handshake(reason: &str) -> Self {
        Self::start_with(Some(reason.to_string()), &[]).await
    }

    /// Start a hub that fails invocations of the given targets
    pub async fn start_rejecting(targets: &[&str]) -> Self {
        Self::start_with(None, targets).await
    }

    async fn start_with(handshake_error: Option<String>, rejected: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let behavior = HubBehavior {
            handshake_error,
            rejected: rejected.iter().map(|t| t.to_string()).collect(),
        };
        let received = Arc::new(Mutex::new(Vec::new()));
        let authorizations = Arc::new(Mutex::new(Vec::new()));
        let (push_tx, _) = broadcast::channel(64);
        let drop_all = Arc::new(Notify::new());
        let accepted = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(Notify::new());

        let server = Self {
            addr,
            received: Arc::clone(&received),
            authorizations: Arc::clone(&authorizations),
            push_tx: push_tx.clone(),
            drop_all: Arc::clone(&drop_all),
            accepted: Arc::clone(&accepted),
            shutdown: Arc::clone(&shutdown),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                accepted.fetch_add(1, Ordering::SeqCst);
                                tokio::spawn(Self::handle_connection(
                                    stream,
                                    behavior.clone(),
                                    Arc::clone(&received),
                                    Arc::clone(&authorizations),
                                    push_tx.subscribe(),
                                    Arc::clone(&drop_all),
                                ));
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });

        server
    }

    pub fn url(&self) -> String {
        format!("ws://{}/client/?hub=chat", self.addr)
    }

    pub fn credential(&self, token: &str) -> Credential {
        Credential::new(self.url(), token)
    }

    /// Push an invocation to every connected client
    pub fn push(&self, target: &str, arguments: Vec<Value>) {
        let frame = protocol::encode(&HubMessage::Invocation {
            invocation_id: None,
            target: target.to_string(),
            arguments,
        })
        .unwrap();
        let _ = self.push_tx.send(frame);
    }

    /// Send a Close frame to every connected client
    pub fn close_clients(&self, allow_reconnect: bool) {
        let frame = protocol::encode(&HubMessage::Close {
            error: Some("Server is shutting down".to_string()),
            allow_reconnect,
        })
        .unwrap();
        let _ = self.push_tx.send(frame);
    }

    /// Abruptly drop every open socket
    pub fn drop_connections(&self) {
        self.drop_all.notify_waiters();
    }

    pub fn received(&self) -> Vec<HubInvocation> {
        self.received.lock().clone()
    }

    pub fn authorizations(&self) -> Vec<String> {
        self.authorizations.lock().clone()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    async fn handle_connection(
        stream: TcpStream,
        behavior: HubBehavior,
        received: Arc<Mutex<Vec<HubInvocation>>>,
        authorizations: Arc<Mutex<Vec<String>>>,
        mut pushes: broadcast::Receiver<String>,
        drop_all: Arc<Notify>,
    ) {
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

        let callback = |request: &Request, response: Response| {
            if let Some(value) = request.headers().get("authorization") {
                authorizations
                    .lock()
                    .push(value.to_str().unwrap_or_default().to_string());
            }
            Ok::<Response, ErrorResponse>(response)
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };
        let (mut write, mut read) = ws_stream.split();

        // Protocol handshake
        match read.next().await {
            Some(Ok(Message::Text(_))) => {
                let response = match behavior.handshake_error {
                    Some(ref error) => json!({ "error": error }),
                    None => json!({}),
                };
                let frame = format!("{}{}", response, protocol::RECORD_SEPARATOR);
                if write.send(Message::Text(frame)).await.is_err() {
                    return;
                }
                if behavior.handshake_error.is_some() {
                    let _ = write.close().await;
                    return;
                }
            }
            _ => return,
        }

        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => continue,
                    };

                    for frame in protocol::split_frames(&text) {
                        let Ok(HubMessage::Invocation { invocation_id, target, arguments }) =
                            protocol::decode(frame)
                        else {
                            continue;
                        };

                        received.lock().push(HubInvocation::new(target.clone(), arguments));

                        if let Some(invocation_id) = invocation_id {
                            let error = behavior
                                .rejected
                                .contains(&target)
                                .then(|| format!("'{}' is not allowed", target));
                            let completion = protocol::encode(&HubMessage::Completion {
                                invocation_id,
                                result: None,
                                error,
                            })
                            .unwrap();
                            if write.send(Message::Text(completion)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                push = pushes.recv() => {
                    let Ok(frame) = push else { break };
                    if write.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                _ = drop_all.notified() => {
                    // Drop without a close frame
                    return;
                }
            }
        }
    }
}

impl Drop for MockHubServer {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

/// Receive the next transport event, failing the test after a timeout
pub async fn next_event(events: &mut TransportEvents) -> TransportEvent {
    tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event stream ended")
}
