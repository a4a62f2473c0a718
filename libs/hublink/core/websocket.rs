//! WebSocket transport
//!
//! Speaks the JSON hub protocol over tokio-tungstenite. Each open
//! connection is driven by one background task:
//!
//! ```text
//!   WebSocketConnection ──Command──> connection task ──frames──> hub
//!         invoke() <──oneshot── completions                  │
//!                                     │ <──────frames───────┘
//!                                     └──TransportEvent──> events
//! ```
//!
//! When the socket drops unexpectedly the task retries on its own using
//! `TransportConfig::reconnect_delays_ms`, reporting `Reconnecting` and
//! `Reconnected`. Each retry negotiates a fresh credential when the
//! transport has a negotiator. When those attempts run out, or the hub closes without
//! allowing reconnect, the stream ends with `Closed`.

use crate::config::TransportConfig;
use crate::heartbeat::{KeepAlive, KeepAliveTick};
use crate::protocol::{self, HubMessage};
use crate::traits::*;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands from connection handles to the connection task
enum Command {
    Invoke { id: String, frame: String },
    Close,
}

struct Pending {
    target: String,
    reply: oneshot::Sender<Result<()>>,
}

/// State shared between handles and the connection task
#[derive(Default)]
struct Shared {
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, Pending>>,
    closed: AtomicBool,
}

impl Shared {
    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn register(&self, id: &str, target: &str) -> oneshot::Receiver<Result<()>> {
        let (reply, rx) = oneshot::channel();
        self.pending.lock().insert(
            id.to_string(),
            Pending {
                target: target.to_string(),
                reply,
            },
        );
        rx
    }

    fn forget(&self, id: &str) {
        self.pending.lock().remove(id);
    }

    fn complete(&self, id: &str, error: Option<String>) {
        let Some(pending) = self.pending.lock().remove(id) else {
            debug!("[Transport] Completion for unknown invocation {}", id);
            return;
        };

        let outcome = match error {
            None => Ok(()),
            Some(reason) => Err(HubError::InvocationFailed {
                target: pending.target,
                reason,
            }),
        };
        let _ = pending.reply.send(outcome);
    }

    fn fail(&self, id: &str, reason: &str) {
        if let Some(pending) = self.pending.lock().remove(id) {
            let _ = pending
                .reply
                .send(Err(HubError::ConnectionClosed(reason.to_string())));
        }
    }

    fn fail_all(&self, reason: &str) {
        let drained: Vec<Pending> = self.pending.lock().drain().map(|(_, p)| p).collect();
        if !drained.is_empty() {
            debug!("[Transport] Failing {} pending invocation(s): {}", drained.len(), reason);
        }
        for pending in drained {
            let _ = pending
                .reply
                .send(Err(HubError::ConnectionClosed(reason.to_string())));
        }
    }
}

/// Handle to a live WebSocket hub connection
///
/// Dropping every handle closes the connection.
pub struct WebSocketConnection {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

#[async_trait]
impl HubConnection for WebSocketConnection {
    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(HubError::ConnectionClosed("connection is closed".into()));
        }

        let id = self.shared.next_id();
        let frame = protocol::encode(&HubMessage::Invocation {
            invocation_id: Some(id.clone()),
            target: target.to_string(),
            arguments,
        })?;

        let reply = self.shared.register(&id, target);
        if self
            .commands
            .send(Command::Invoke {
                id: id.clone(),
                frame,
            })
            .is_err()
        {
            self.shared.forget(&id);
            return Err(HubError::ConnectionClosed("connection task has exited".into()));
        }

        reply.await.unwrap_or_else(|_| {
            Err(HubError::ConnectionClosed(
                "connection dropped before completion".into(),
            ))
        })
    }

    async fn close(&self) -> Result<()> {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!("[Transport] Closing connection");
            let _ = self.commands.send(Command::Close);
        }
        Ok(())
    }
}

/// `Transport` over WebSocket with the JSON hub protocol
#[derive(Clone, Default)]
pub struct WebSocketTransport {
    config: TransportConfig,
    negotiator: Option<Arc<dyn TokenNegotiator>>,
}

impl WebSocketTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            negotiator: None,
        }
    }

    /// Negotiate a fresh credential before every built-in reconnect
    ///
    /// Without a negotiator, reconnects reuse the credential passed to
    /// `open`.
    pub fn with_negotiator(mut self, negotiator: Arc<dyn TokenNegotiator>) -> Self {
        self.negotiator = Some(negotiator);
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("config", &self.config)
            .field("negotiator", &self.negotiator.is_some())
            .finish()
    }
}

/// Where reconnect attempts get their credential
enum CredentialSource {
    Negotiate(Arc<dyn TokenNegotiator>),
    Reuse(Credential),
}

impl CredentialSource {
    async fn credential(&self) -> Result<Credential> {
        match self {
            CredentialSource::Negotiate(negotiator) => negotiator.negotiate().await,
            CredentialSource::Reuse(credential) => Ok(credential.clone()),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, credential: &Credential) -> Result<OpenedConnection> {
        self.config.validate()?;
        let session = connect(credential, &self.config).await?;
        info!("[Transport] Connected to {}", credential.endpoint_url);

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let source = match &self.negotiator {
            Some(negotiator) => CredentialSource::Negotiate(Arc::clone(negotiator)),
            None => CredentialSource::Reuse(credential.clone()),
        };

        tokio::spawn(run_connection(
            session,
            source,
            self.config.clone(),
            command_rx,
            event_tx,
            Arc::clone(&shared),
        ));

        Ok(OpenedConnection {
            connection: Arc::new(WebSocketConnection { commands, shared }),
            events,
        })
    }
}

/// An open, handshaken socket plus any frames that arrived with the
/// handshake response
struct Session {
    stream: WsStream,
    backlog: Vec<HubMessage>,
}

enum SessionEnd {
    ClosedByClient,
    ClosedByServer {
        error: Option<String>,
        allow_reconnect: bool,
    },
    Lost(String),
}

enum Reconnect {
    Connected(Session),
    Exhausted(String),
    Cancelled,
}

/// Connect, authenticate and complete the protocol handshake
async fn connect(credential: &Credential, config: &TransportConfig) -> Result<Session> {
    let mut request = credential
        .endpoint_url
        .as_str()
        .into_client_request()
        .map_err(|e| {
            HubError::Configuration(format!("invalid hub URL '{}': {}", credential.endpoint_url, e))
        })?;

    let bearer = HeaderValue::from_str(&format!("Bearer {}", credential.access_token))
        .map_err(|_| HubError::Configuration("access token is not a valid header value".into()))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    debug!("[Transport] Connecting to {}", credential.endpoint_url);
    let (mut stream, _) = connect_async(request)
        .await
        .map_err(|e| HubError::Transport(format!("failed to connect: {}", e)))?;

    stream
        .send(Message::Text(protocol::handshake_request()))
        .await?;

    let handshake_timeout = config.handshake_timeout();
    match tokio::time::timeout(handshake_timeout, read_handshake(&mut stream)).await {
        Ok(Ok(backlog)) => Ok(Session { stream, backlog }),
        Ok(Err(e)) => {
            let _ = stream.close(None).await;
            Err(e)
        }
        Err(_) => {
            let _ = stream.close(None).await;
            Err(HubError::Timeout(format!(
                "no handshake response within {:?}",
                handshake_timeout
            )))
        }
    }
}

async fn read_handshake(stream: &mut WsStream) -> Result<Vec<HubMessage>> {
    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(text) => {
                let mut frames = protocol::split_frames(&text);
                let Some(first) = frames.next() else {
                    continue;
                };
                protocol::parse_handshake_response(first)?;

                let backlog = frames
                    .filter_map(|frame| match protocol::decode(frame) {
                        Ok(message) => Some(message),
                        Err(e) => {
                            warn!("[Transport] Dropping malformed frame: {}", e);
                            None
                        }
                    })
                    .collect();
                return Ok(backlog);
            }
            Message::Close(frame) => {
                return Err(HubError::Handshake(format!(
                    "closed during handshake: {}",
                    close_reason(frame)
                )))
            }
            _ => continue,
        }
    }

    Err(HubError::Handshake("stream ended during handshake".into()))
}

async fn run_connection(
    mut session: Session,
    source: CredentialSource,
    config: TransportConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
    shared: Arc<Shared>,
) {
    let delays = config.reconnect_delays();

    let closed_reason = loop {
        let end = drive(session, &config, &mut commands, &events, &shared).await;
        shared.fail_all("connection lost");

        let reason = match end {
            SessionEnd::ClosedByClient => break None,
            SessionEnd::ClosedByServer {
                error,
                allow_reconnect: false,
            } => {
                info!("[Transport] Hub closed the connection: {:?}", error);
                break error;
            }
            SessionEnd::ClosedByServer {
                error,
                allow_reconnect: true,
            } => error.unwrap_or_else(|| "hub closed the connection".to_string()),
            SessionEnd::Lost(reason) => reason,
        };

        if delays.is_empty() {
            break Some(reason);
        }

        warn!("[Transport] Connection lost: {}", reason);
        let _ = events.send(TransportEvent::Reconnecting(Some(reason.clone())));

        match reconnect(&source, &config, &delays, &mut commands, &shared).await {
            Reconnect::Connected(next) => {
                info!("[Transport] Reconnected");
                let _ = events.send(TransportEvent::Reconnected);
                session = next;
            }
            Reconnect::Exhausted(last_error) => {
                break Some(format!("{}; reconnect failed: {}", reason, last_error));
            }
            Reconnect::Cancelled => break None,
        }
    };

    // Close the queue before failing leftovers so no invocation can slip in after
    commands.close();
    shared.closed.store(true, Ordering::Release);
    shared.fail_all("connection closed");

    let _ = events.send(TransportEvent::Closed(closed_reason));
    info!("[Transport] Connection task exiting");
}

/// Drive one socket until it closes or is lost
async fn drive(
    session: Session,
    config: &TransportConfig,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::UnboundedSender<TransportEvent>,
    shared: &Shared,
) -> SessionEnd {
    let Session { stream, backlog } = session;
    let (mut write, mut read) = stream.split();
    let mut keep_alive = KeepAlive::new(config.keep_alive_interval(), config.server_timeout());

    let ping_frame = match protocol::encode(&HubMessage::Ping) {
        Ok(frame) => frame,
        Err(e) => return SessionEnd::Lost(e.to_string()),
    };

    for message in backlog {
        if let Some(end) = handle_message(message, events, shared) {
            let _ = write.close().await;
            return end;
        }
    }

    loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    keep_alive.record_received();
                    for frame in protocol::split_frames(&text) {
                        match protocol::decode(frame) {
                            Ok(message) => {
                                if let Some(end) = handle_message(message, events, shared) {
                                    let _ = write.close().await;
                                    return end;
                                }
                            }
                            Err(e) => warn!("[Transport] Dropping malformed frame: {}", e),
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return SessionEnd::Lost(format!("socket closed: {}", close_reason(frame)));
                }
                Some(Ok(_)) => keep_alive.record_received(),
                Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                None => return SessionEnd::Lost("stream ended".to_string()),
            },

            command = commands.recv() => match command {
                Some(Command::Invoke { id, frame }) => {
                    if let Err(e) = write.send(Message::Text(frame)).await {
                        shared.fail(&id, "send failed");
                        return SessionEnd::Lost(e.to_string());
                    }
                }
                Some(Command::Close) | None => {
                    let _ = write.close().await;
                    return SessionEnd::ClosedByClient;
                }
            },

            tick = keep_alive.next() => match tick {
                KeepAliveTick::SendPing => {
                    if let Err(e) = write.send(Message::Text(ping_frame.clone())).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
                KeepAliveTick::TimedOut => {
                    return SessionEnd::Lost(format!(
                        "no message from the hub within {:?}",
                        config.server_timeout()
                    ));
                }
            },
        }
    }
}

/// Apply one decoded frame; returns `Some` when the hub closed the session
fn handle_message(
    message: HubMessage,
    events: &mpsc::UnboundedSender<TransportEvent>,
    shared: &Shared,
) -> Option<SessionEnd> {
    match message {
        HubMessage::Invocation {
            invocation_id,
            target,
            arguments,
        } => {
            if invocation_id.is_some() {
                debug!("[Transport] Hub expects a result for '{}'; not supported", target);
            }
            let _ = events.send(TransportEvent::Invocation(HubInvocation::new(target, arguments)));
            None
        }
        HubMessage::Completion {
            invocation_id,
            error,
            ..
        } => {
            shared.complete(&invocation_id, error);
            None
        }
        HubMessage::Ping => None,
        HubMessage::Close {
            error,
            allow_reconnect,
        } => Some(SessionEnd::ClosedByServer {
            error,
            allow_reconnect,
        }),
        HubMessage::Unsupported(kind) => {
            debug!("[Transport] Ignoring message type {}", kind);
            None
        }
    }
}

/// Wait out the reconnect delays, trying to connect after each
async fn reconnect(
    source: &CredentialSource,
    config: &TransportConfig,
    delays: &[Duration],
    commands: &mut mpsc::UnboundedReceiver<Command>,
    shared: &Shared,
) -> Reconnect {
    let mut last_error = String::from("no attempt made");

    for (attempt, delay) in delays.iter().enumerate() {
        info!(
            "[Transport] Reconnecting in {:?} (attempt {}/{})",
            delay,
            attempt + 1,
            delays.len()
        );

        let wait = tokio::time::sleep(*delay);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                command = commands.recv() => match command {
                    Some(Command::Invoke { id, .. }) => shared.fail(&id, "connection is reconnecting"),
                    Some(Command::Close) | None => return Reconnect::Cancelled,
                },
            }
        }

        let attempt_result = match source.credential().await {
            Ok(credential) => connect(&credential, config).await,
            Err(e) => Err(e),
        };
        match attempt_result {
            Ok(session) => return Reconnect::Connected(session),
            Err(e) => {
                warn!("[Transport] Reconnect attempt {} failed: {}", attempt + 1, e);
                last_error = e.to_string();
            }
        }
    }

    Reconnect::Exhausted(last_error)
}

fn close_reason(frame: Option<CloseFrame<'_>>) -> String {
    match frame {
        Some(frame) if !frame.reason.is_empty() => format!("{} ({})", frame.reason, frame.code),
        Some(frame) => frame.code.to_string(),
        None => "no close frame".to_string(),
    }
}
