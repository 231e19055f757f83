//! Newline-delimited JSON-RPC over stdin/stdout.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::channel::ServerEvent;
use super::session::{Incoming, ResponseMode, SessionTransport};
use super::shutdown::shutdown_signal;
use super::TransportError;
use crate::mcp::McpServer;
use crate::models::{ErrorData, JsonRpcMessage};

/// A single implicit session bound to a byte stream pair
#[derive(Debug)]
pub struct StdioTransport {
    server: Arc<McpServer>,
    history_capacity: usize,
}

impl StdioTransport {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self {
            server,
            history_capacity: 256,
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Serve on the process's stdin and stdout until EOF or a termination signal
    pub async fn run(self) -> Result<(), TransportError> {
        self.run_with(tokio::io::stdin(), tokio::io::stdout(), shutdown_signal())
            .await
    }

    /// Serve on arbitrary streams.
    ///
    /// Every outbound message goes through one writer task so lines never
    /// interleave. On EOF in-flight requests finish before the session closes;
    /// on `shutdown` the session closes immediately. A read error ends the
    /// session like EOF and is returned once the writer has finished.
    pub async fn run_with<R, W, F>(self, reader: R, writer: W, shutdown: F) -> Result<(), TransportError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let (transport, signals) = SessionTransport::new(self.server, self.history_capacity);
        let outbound = transport.push_channel()?;
        let writer_task = tokio::spawn(write_loop(writer, outbound));

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        let stop = loop {
            buf.clear();
            let read = tokio::select! {
                _ = &mut shutdown => break Stop::Signal,
                read = reader.read_until(b'\n', &mut buf) => read,
            };
            match read {
                Ok(0) => {
                    debug!("stdin closed");
                    break Stop::Eof;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break Stop::Failed(e);
                }
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!("Rejecting input that is not UTF-8: {}", e);
                    let error = ErrorData::parse_error(format!("Parse error: invalid UTF-8: {}", e));
                    send(&transport, JsonRpcMessage::error(None, error));
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let message = match parse_line(line) {
                Ok(message) => message,
                Err(error) => {
                    warn!("Rejecting malformed input: {}", error.message);
                    send(&transport, JsonRpcMessage::error(None, error));
                    continue;
                }
            };

            // initialize must complete before anything after it is dispatched
            if message.is_initialize_request() {
                respond(&transport, message).await;
            } else {
                let transport = Arc::clone(&transport);
                tasks.spawn(async move { respond(&transport, message).await });
            }
            while tasks.try_join_next().is_some() {}
        };

        if let Stop::Signal = stop {
            info!("Shutdown signal received");
        } else {
            tokio::select! {
                _ = async { while tasks.join_next().await.is_some() {} } => {},
                _ = &mut shutdown => info!("Shutdown signal received"),
            }
        }

        let _ = transport.close().await;
        tasks.shutdown().await;
        drop(signals);

        let written = match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(TransportError::Internal(format!("writer task failed: {}", e))),
        };
        match stop {
            Stop::Failed(e) => Err(e.into()),
            Stop::Eof | Stop::Signal => written,
        }
    }
}

/// Why the read loop ended
enum Stop {
    Eof,
    Signal,
    Failed(std::io::Error),
}

fn parse_line(line: &str) -> Result<JsonRpcMessage, ErrorData> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| ErrorData::parse_error(format!("Parse error: {}", e)))?;
    if value.is_array() {
        return Err(ErrorData::invalid_request(
            "Invalid Request: batch requests are not supported",
        ));
    }
    serde_json::from_value(value).map_err(|e| ErrorData::invalid_request(format!("Invalid Request: {}", e)))
}

fn send(transport: &SessionTransport, message: JsonRpcMessage) {
    if let Err(e) = transport.send(message) {
        debug!("Dropping outbound message: {}", e);
    }
}

async fn respond(transport: &Arc<SessionTransport>, message: JsonRpcMessage) {
    match transport.handle_incoming(message, ResponseMode::Json).await {
        Ok(Incoming::Json(response)) => send(transport, response),
        Ok(Incoming::Accepted) => {}
        Ok(Incoming::Stream(_)) => warn!("Unexpected stream response on stdio"),
        Err(e) => debug!("Message not handled: {}", e),
    }
}

async fn write_loop<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<ServerEvent>) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = outbound.recv().await {
        let mut line = serde_json::to_vec(&event.message)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}
