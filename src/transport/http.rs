//! Streamable HTTP front end: request routing over the session registry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::StreamExt;
use ::http::header::{ACCEPT, CONTENT_TYPE};
use ::http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use super::registry::SessionRegistry;
use super::session::{EventStream, Incoming, ResponseMode, SessionTransport};
use super::shutdown::{ShutdownCoordinator, ShutdownReport};
use super::{SessionId, TransportError, HEADER_LAST_EVENT_ID, HEADER_SESSION_ID};
use crate::mcp::McpServer;
use crate::models::{ErrorData, JsonRpcMessage, INTERNAL_ERROR, SERVER_ERROR};

const INVALID_SESSION_TEXT: &str = "Invalid or missing session ID";
const TERMINATION_ERROR_TEXT: &str = "Error processing session termination";
const EVENT_STREAM: &str = "text/event-stream";

/// HTTP transport settings
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Endpoint path, e.g. `/mcp`
    pub path: String,
    /// Interval between SSE keep-alive comments
    pub sse_keep_alive: Duration,
    /// Events kept per session for `last-event-id` replay
    pub history_capacity: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            path: "/mcp".to_string(),
            sse_keep_alive: Duration::from_secs(15),
            history_capacity: 1024,
        }
    }
}

#[derive(Clone)]
struct AppState {
    server: Arc<McpServer>,
    registry: Arc<SessionRegistry>,
    config: Arc<HttpTransportConfig>,
}

/// Streamable HTTP service exposing one endpoint for POST, GET and DELETE
#[derive(Clone)]
pub struct StreamableHttpService {
    state: AppState,
}

impl std::fmt::Debug for StreamableHttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpService")
            .field("config", &self.state.config)
            .field("registry", &self.state.registry)
            .finish()
    }
}

impl StreamableHttpService {
    pub fn new(server: Arc<McpServer>, config: HttpTransportConfig) -> Self {
        Self {
            state: AppState {
                server,
                registry: Arc::new(SessionRegistry::new()),
                config: Arc::new(config),
            },
        }
    }

    /// The live session registry
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.state.registry)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(
                &self.state.config.path,
                post(handle_post).get(handle_get).delete(handle_delete),
            )
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves, then drain every session.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<ShutdownReport>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (report_tx, report_rx) = oneshot::channel();
        let coordinator = ShutdownCoordinator::new(self.registry());
        let signal = async move {
            shutdown.await;
            info!("Shutting down server...");
            // Closing the transports ends their SSE streams, which lets the
            // graceful shutdown finish.
            let report = coordinator.drain().await;
            let _ = report_tx.send(report);
        };

        if let Ok(addr) = listener.local_addr() {
            info!(
                "MCP Streamable HTTP Server listening on {}{}",
                addr, self.state.config.path
            );
        }
        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await?;

        Ok(report_rx.await.unwrap_or_default())
    }
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains(EVENT_STREAM))
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(HEADER_SESSION_ID)
        .and_then(|value| value.to_str().ok())
}

fn json_error(status: StatusCode, error: ErrorData) -> Response {
    (status, Json(JsonRpcMessage::error(None, error))).into_response()
}

fn invalid_session_response() -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        ErrorData::new(SERVER_ERROR, "Bad Request: No valid session ID provided"),
    )
}

fn internal_error_response() -> Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorData::new(INTERNAL_ERROR, "Internal server error"),
    )
}

fn sse_response(stream: EventStream, keep_alive: Duration) -> Response {
    let events = stream.map(|event| {
        let mut sse = Event::default().event("message");
        if let Some(id) = event.event_id {
            sse = sse.id(id.to_string());
        }
        sse.json_data(&event.message)
    });
    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(keep_alive))
        .into_response()
}

fn incoming_response(incoming: Incoming, config: &HttpTransportConfig) -> Response {
    match incoming {
        Incoming::Accepted => StatusCode::ACCEPTED.into_response(),
        Incoming::Json(message) => (StatusCode::OK, Json(message)).into_response(),
        Incoming::Stream(stream) => sse_response(stream, config.sse_keep_alive),
    }
}

async fn handle_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            debug!("Rejecting unparseable body: {}", e);
            return json_error(
                StatusCode::BAD_REQUEST,
                ErrorData::parse_error(format!("Parse error: {}", e)),
            );
        }
    };
    if value.is_array() {
        return json_error(
            StatusCode::BAD_REQUEST,
            ErrorData::invalid_request("Invalid Request: batch requests are not supported"),
        );
    }
    let message: JsonRpcMessage = match serde_json::from_value(value) {
        Ok(message) => message,
        Err(e) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                ErrorData::invalid_request(format!("Invalid Request: {}", e)),
            );
        }
    };

    let mode = if accepts_event_stream(&headers) {
        ResponseMode::Stream
    } else {
        ResponseMode::Json
    };

    match route_post(&state, session_header(&headers), message, mode).await {
        Ok(response) => response,
        Err(e) => {
            error!("Error handling MCP request: {}", e);
            internal_error_response()
        }
    }
}

async fn route_post(
    state: &AppState,
    session_id: Option<&str>,
    message: JsonRpcMessage,
    mode: ResponseMode,
) -> Result<Response, TransportError> {
    if let Some(id) = session_id {
        let Some(transport) = state.registry.get(id) else {
            debug!("Unknown session id {}", id);
            return Ok(invalid_session_response());
        };
        debug!(session_id = %id, method = ?message.method(), "Routing to existing session");
        return match transport.handle_incoming(message, mode).await {
            Ok(incoming) => Ok(incoming_response(incoming, &state.config)),
            Err(TransportError::Closed) => Ok(invalid_session_response()),
            Err(e) => Err(e),
        };
    }

    if !message.is_initialize_request() {
        debug!("Rejecting sessionless non-initialize message");
        return Ok(invalid_session_response());
    }

    let (transport, mut signals) =
        SessionTransport::new(Arc::clone(&state.server), state.config.history_capacity);
    // initialize is always answered with a plain JSON body
    let incoming = transport.handle_incoming(message, ResponseMode::Json).await?;
    let mut response = incoming_response(incoming, &state.config);

    let Ok(id) = signals.initialized.try_recv() else {
        debug!("Initialize failed; no session created");
        return Ok(response);
    };

    let header = HeaderValue::from_str(&id).map_err(|e| TransportError::Internal(e.to_string()))?;
    if !state.registry.insert_if_absent(id.clone(), Arc::clone(&transport)) {
        let _ = transport.close().await;
        return Err(TransportError::DuplicateSession(id));
    }
    watch_close(Arc::clone(&state.registry), signals.closed);

    response.headers_mut().insert(HEADER_SESSION_ID, header);
    info!("Session initialized with ID: {}", id);
    Ok(response)
}

/// Remove the session from the registry once its transport reports closed
fn watch_close(registry: Arc<SessionRegistry>, closed: oneshot::Receiver<SessionId>) {
    tokio::spawn(async move {
        if let Ok(id) = closed.await {
            if registry.remove(&id).is_some() {
                info!("Transport closed for session {}, removed from registry", id);
            }
        }
    });
}

async fn handle_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some((id, transport)) =
        session_header(&headers).and_then(|id| state.registry.get(id).map(|t| (id, t)))
    else {
        return (StatusCode::BAD_REQUEST, INVALID_SESSION_TEXT).into_response();
    };

    if !accepts_event_stream(&headers) {
        return (
            StatusCode::NOT_ACCEPTABLE,
            "Not Acceptable: Client must accept text/event-stream",
        )
            .into_response();
    }

    let last_event_id = headers
        .get(HEADER_LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok());
    match last_event_id {
        Some(marker) => info!("Client reconnecting with Last-Event-ID: {}", marker),
        None => info!("Establishing new SSE stream for session {}", id),
    }

    match transport.open_stream(last_event_id) {
        Ok(stream) => sse_response(stream, state.config.sse_keep_alive),
        Err(TransportError::Closed) => {
            (StatusCode::BAD_REQUEST, INVALID_SESSION_TEXT).into_response()
        }
        Err(e) => {
            error!("Error opening SSE stream for session {}: {}", id, e);
            internal_error_response()
        }
    }
}

async fn handle_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some((id, transport)) =
        session_header(&headers).and_then(|id| state.registry.get(id).map(|t| (id, t)))
    else {
        return (StatusCode::BAD_REQUEST, INVALID_SESSION_TEXT).into_response();
    };

    info!("Received session termination request for session {}", id);
    let result = transport.close().await;
    state.registry.remove(id);

    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            error!("Error handling session termination: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                TERMINATION_ERROR_TEXT,
            )
                .into_response()
        }
    }
}
