//! One client session: phase tracking, dispatch and lifecycle signals.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, OnceLock};

use futures_util::stream::{BoxStream, StreamExt};
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use super::channel::{EventId, Peer, ServerEvent, SessionChannel, StreamKey};
use super::{ManagedTransport, SessionId, TransportError};
use crate::mcp::McpServer;
use crate::models::{ErrorData, JsonRpcMessage, JsonRpcRequest, RequestId, SERVER_ERROR};

/// Stream of server events for one SSE response
pub type EventStream = BoxStream<'static, ServerEvent>;

/// Lifecycle of a session transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Active,
    Closed,
}

/// How the caller wants the answer to a request framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Json,
    Stream,
}

/// Outcome of handing one message to a transport
pub enum Incoming {
    /// A client notification or response; nothing to send back
    Accepted,
    /// The final result as a single message
    Json(JsonRpcMessage),
    /// Notifications followed by the final result
    Stream(EventStream),
}

impl std::fmt::Debug for Incoming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Incoming::Accepted => f.write_str("Accepted"),
            Incoming::Json(msg) => f.debug_tuple("Json").field(msg).finish(),
            Incoming::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Single-assignment signals owned by whoever created the transport
#[derive(Debug)]
pub struct SessionSignals {
    /// Fires with the new token once the initialize handshake succeeds
    pub initialized: oneshot::Receiver<SessionId>,
    /// Fires with the token when the transport closes
    pub closed: oneshot::Receiver<SessionId>,
}

/// Protocol state for one client
pub struct SessionTransport {
    server: Arc<McpServer>,
    channel: Arc<SessionChannel>,
    session_id: OnceLock<SessionId>,
    phase: Mutex<SessionPhase>,
    initialized_tx: Mutex<Option<oneshot::Sender<SessionId>>>,
    closed_tx: Mutex<Option<oneshot::Sender<SessionId>>>,
}

impl std::fmt::Debug for SessionTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTransport")
            .field("session_id", &self.session_id.get())
            .field("phase", &self.phase())
            .finish()
    }
}

impl SessionTransport {
    pub fn new(server: Arc<McpServer>, history_capacity: usize) -> (Arc<Self>, SessionSignals) {
        let (initialized_tx, initialized) = oneshot::channel();
        let (closed_tx, closed) = oneshot::channel();
        let transport = Arc::new(Self {
            server,
            channel: Arc::new(SessionChannel::new(history_capacity)),
            session_id: OnceLock::new(),
            phase: Mutex::new(SessionPhase::Uninitialized),
            initialized_tx: Mutex::new(Some(initialized_tx)),
            closed_tx: Mutex::new(Some(closed_tx)),
        });
        (transport, SessionSignals { initialized, closed })
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id.get().cloned()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decode-level entry point: dispatch one message from the client
    pub async fn handle_incoming(
        self: &Arc<Self>,
        message: JsonRpcMessage,
        mode: ResponseMode,
    ) -> Result<Incoming, TransportError> {
        let phase = self.phase();
        if phase == SessionPhase::Closed {
            return Err(TransportError::Closed);
        }

        match message {
            JsonRpcMessage::Request(request) => {
                let id = request.id.clone();

                if request.method == "initialize" {
                    if phase != SessionPhase::Uninitialized {
                        return Ok(Incoming::Json(JsonRpcMessage::error(
                            Some(id),
                            ErrorData::invalid_request("Invalid Request: Server already initialized"),
                        )));
                    }
                    let peer = Peer::new(self.channel.clone(), StreamKey::Request(id));
                    let response = self.dispatch(request, &peer).await;
                    if matches!(response, JsonRpcMessage::Response(_)) {
                        self.activate()?;
                    }
                    return Ok(Incoming::Json(response));
                }

                if phase == SessionPhase::Uninitialized && request.method != "ping" {
                    return Ok(Incoming::Json(JsonRpcMessage::error(
                        Some(id),
                        ErrorData::new(SERVER_ERROR, "Bad Request: Server not initialized"),
                    )));
                }

                let peer = Peer::new(self.channel.clone(), StreamKey::Request(id.clone()));
                match mode {
                    ResponseMode::Json => {
                        let response = self.dispatch(request, &peer).await;
                        Ok(Incoming::Json(response))
                    }
                    ResponseMode::Stream => {
                        let rx = match self.channel.open_request_stream(id.clone()) {
                            Ok(rx) => rx,
                            Err(TransportError::DuplicateRequestId(dup)) => {
                                return Ok(Incoming::Json(JsonRpcMessage::error(
                                    Some(id),
                                    ErrorData::invalid_request(format!(
                                        "Invalid Request: request id '{}' is already in flight",
                                        dup
                                    )),
                                )));
                            }
                            Err(e) => return Err(e),
                        };

                        let this = Arc::clone(self);
                        tokio::spawn(async move {
                            let response = this.dispatch(request, &peer).await;
                            if let Err(e) = this.deliver_final(&id, response) {
                                tracing::debug!("Dropping response to request {}: {}", id, e);
                            }
                        });

                        Ok(Incoming::Stream(self.wrap(rx)))
                    }
                }
            }
            JsonRpcMessage::Notification(notification) => {
                let peer = Peer::new(self.channel.clone(), StreamKey::Standalone);
                self.server.handle_notification(notification, &peer).await;
                Ok(Incoming::Accepted)
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => {
                tracing::debug!("Ignoring client response: no outstanding server requests");
                Ok(Incoming::Accepted)
            }
        }
    }

    /// Run the request handler; a panic becomes an internal error response
    async fn dispatch(&self, request: JsonRpcRequest, peer: &Peer) -> JsonRpcMessage {
        let id = request.id.clone();
        let method = request.method.clone();
        match FutureExt::catch_unwind(AssertUnwindSafe(self.server.handle_request(request, peer))).await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!(id = %id, method = %method, "Request handler panicked");
                JsonRpcMessage::error(Some(id), ErrorData::internal_error("Internal error"))
            }
        }
    }

    fn deliver_final(&self, id: &RequestId, response: JsonRpcMessage) -> Result<EventId, TransportError> {
        let result = self.channel.deliver(&StreamKey::Request(id.clone()), response);
        self.channel.finish_request_stream(id);
        result
    }

    /// Open or resume the standalone push stream
    pub fn open_stream(&self, last_event_id: Option<&str>) -> Result<EventStream, TransportError> {
        match self.phase() {
            SessionPhase::Closed => return Err(TransportError::Closed),
            SessionPhase::Uninitialized => return Err(TransportError::NotInitialized),
            SessionPhase::Active => {}
        }

        let marker = last_event_id.and_then(|raw| raw.parse::<EventId>().ok());
        let (rx, replayed) = self.channel.attach_standalone(marker)?;
        match (last_event_id, replayed) {
            (Some(raw), None) => {
                tracing::debug!("Unknown Last-Event-ID '{}', starting a fresh stream", raw)
            }
            (_, Some(count)) => tracing::debug!("Replayed {} events", count),
            _ => {}
        }
        Ok(self.wrap(rx))
    }

    /// Receiver for everything sent outside a request stream; used by stdio
    pub fn push_channel(&self) -> Result<mpsc::UnboundedReceiver<ServerEvent>, TransportError> {
        self.channel.attach_standalone(None).map(|(rx, _)| rx)
    }

    /// Send a message on the standalone stream
    pub fn send(&self, message: JsonRpcMessage) -> Result<EventId, TransportError> {
        self.channel.deliver(&StreamKey::Standalone, message)
    }

    fn wrap(&self, rx: mpsc::UnboundedReceiver<ServerEvent>) -> EventStream {
        let closed = self.channel.closed_token().clone();
        UnboundedReceiverStream::new(rx)
            .take_until(closed.cancelled_owned())
            .boxed()
    }

    fn activate(&self) -> Result<SessionId, TransportError> {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        match *phase {
            SessionPhase::Closed => return Err(TransportError::Closed),
            SessionPhase::Active => {
                return Err(TransportError::Internal("session already active".to_string()))
            }
            SessionPhase::Uninitialized => {}
        }

        let id: SessionId = Arc::from(Uuid::new_v4().to_string());
        self.session_id
            .set(id.clone())
            .map_err(|_| TransportError::Internal("session id already assigned".to_string()))?;
        *phase = SessionPhase::Active;
        drop(phase);

        let tx = self
            .initialized_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(tx) = tx {
            // Nobody listening is fine: stdio never registers
            let _ = tx.send(id.clone());
        }
        tracing::debug!(session_id = %id, "Session activated");
        Ok(id)
    }

    /// Close the session. The first call wins; later calls are no-ops.
    pub async fn close(&self) -> Result<(), TransportError> {
        let tx = self
            .closed_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(tx) = tx else {
            return Ok(());
        };

        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = SessionPhase::Closed;
        self.channel.close();

        match self.session_id() {
            Some(id) => {
                tracing::info!(session_id = %id, "Transport closed");
                tx.send(id.clone())
                    .map_err(|_| TransportError::CloseSignalDropped(id))
            }
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ManagedTransport for SessionTransport {
    fn session_id(&self) -> Option<SessionId> {
        SessionTransport::session_id(self)
    }

    async fn close(&self) -> Result<(), TransportError> {
        SessionTransport::close(self).await
    }
}
