//! Session-oriented transports.
//!
//! A [`SessionTransport`] owns one client's protocol state. The streamable
//! HTTP front end keeps many of them in a [`SessionRegistry`] keyed by the
//! `mcp-session-id` header; the stdio front end drives exactly one.

mod channel;
mod http;
mod registry;
mod session;
mod shutdown;
mod stdio;

use std::sync::Arc;

use thiserror::Error;

pub use channel::{EventId, Peer, ServerEvent, SessionChannel, StreamKey};
pub use http::{HttpTransportConfig, StreamableHttpService};
pub use registry::SessionRegistry;
pub use session::{EventStream, Incoming, ResponseMode, SessionPhase, SessionSignals, SessionTransport};
pub use shutdown::{shutdown_signal, ShutdownCoordinator, ShutdownReport};
pub use stdio::StdioTransport;

/// Opaque session token handed to HTTP clients
pub type SessionId = Arc<str>;

/// Header carrying the session token
pub const HEADER_SESSION_ID: &str = "mcp-session-id";

/// Header carrying the resume marker on GET
pub const HEADER_LAST_EVENT_ID: &str = "last-event-id";

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Session is not initialized")]
    NotInitialized,

    #[error("Session '{0}' is already registered")]
    DuplicateSession(SessionId),

    #[error("Request id '{0}' already has an open stream")]
    DuplicateRequestId(String),

    #[error("Close signal receiver was dropped for session '{0}'")]
    CloseSignalDropped(SessionId),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Something the shutdown coordinator can close.
#[async_trait::async_trait]
pub trait ManagedTransport: Send + Sync {
    /// The session token, once assigned
    fn session_id(&self) -> Option<SessionId>;

    /// Close the transport. Idempotent.
    async fn close(&self) -> Result<(), TransportError>;
}
