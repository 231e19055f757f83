//! Per-session outbound delivery with a bounded replay history.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::TransportError;
use crate::models::{JsonRpcMessage, LoggingLevel, LoggingMessageParams, RequestId};

/// Sequence marker attached to every delivered server event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(EventId)
    }
}

/// Which stream an event belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKey {
    /// The long-lived GET stream
    Standalone,
    /// The SSE response of one POSTed request
    Request(RequestId),
}

/// A message leaving the server, tagged with its marker
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    pub event_id: Option<EventId>,
    pub message: JsonRpcMessage,
}

#[derive(Debug)]
struct RecordedEvent {
    id: EventId,
    stream: StreamKey,
    message: JsonRpcMessage,
}

#[derive(Debug)]
struct Outbound {
    next_id: u64,
    history: VecDeque<RecordedEvent>,
    capacity: usize,
    standalone: Option<mpsc::UnboundedSender<ServerEvent>>,
    /// In-flight request streams; `None` once the client dropped the stream
    request_streams: HashMap<RequestId, Option<mpsc::UnboundedSender<ServerEvent>>>,
    min_level: LoggingLevel,
}

impl Outbound {
    fn record(&mut self, stream: StreamKey, message: &JsonRpcMessage) -> EventId {
        self.next_id += 1;
        let id = EventId(self.next_id);
        if self.capacity > 0 {
            if self.history.len() == self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(RecordedEvent {
                id,
                stream,
                message: message.clone(),
            });
        }
        id
    }

    fn send_standalone(&mut self, event: ServerEvent) {
        if let Some(standalone) = &self.standalone {
            if standalone.send(event).is_err() {
                self.standalone = None;
            }
        }
    }
}

/// Outbound side of one session.
///
/// Recording an event and handing it to a stream happen under the same lock,
/// so a resuming stream never misses or duplicates an event.
#[derive(Debug)]
pub struct SessionChannel {
    outbound: Mutex<Outbound>,
    closed: CancellationToken,
}

impl SessionChannel {
    /// Create a channel keeping at most `history_capacity` events for replay
    pub fn new(history_capacity: usize) -> Self {
        Self {
            outbound: Mutex::new(Outbound {
                next_id: 0,
                history: VecDeque::with_capacity(history_capacity.min(1024)),
                capacity: history_capacity,
                standalone: None,
                request_streams: HashMap::new(),
                min_level: LoggingLevel::default(),
            }),
            closed: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Outbound> {
        self.outbound.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver a message on `stream`, falling back to the standalone stream.
    ///
    /// With no attached receiver the event is only recorded.
    pub fn deliver(
        &self,
        stream: &StreamKey,
        message: JsonRpcMessage,
    ) -> Result<EventId, TransportError> {
        let mut outbound = self.lock();
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }

        if let StreamKey::Request(request_id) = stream {
            if let Some(slot) = outbound.request_streams.get(request_id).cloned() {
                let id = outbound.record(stream.clone(), &message);
                let event = ServerEvent {
                    event_id: Some(id),
                    message,
                };
                let undelivered = match slot {
                    Some(sender) => match sender.send(event) {
                        Ok(()) => return Ok(id),
                        Err(mpsc::error::SendError(event)) => {
                            outbound.request_streams.insert(request_id.clone(), None);
                            event
                        }
                    },
                    None => event,
                };
                // The client went away mid-request. The rest goes to the GET
                // stream and stays recorded under the request for resumption.
                outbound.send_standalone(undelivered);
                return Ok(id);
            }
        }

        let id = outbound.record(StreamKey::Standalone, &message);
        outbound.send_standalone(ServerEvent {
            event_id: Some(id),
            message,
        });
        Ok(id)
    }

    /// Open the response stream of a POSTed request
    pub fn open_request_stream(
        &self,
        request_id: RequestId,
    ) -> Result<mpsc::UnboundedReceiver<ServerEvent>, TransportError> {
        let mut outbound = self.lock();
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if outbound.request_streams.contains_key(&request_id) {
            return Err(TransportError::DuplicateRequestId(request_id.to_string()));
        }
        // A reused id starts a new stream; markers from the earlier one are forgotten
        let key = StreamKey::Request(request_id.clone());
        outbound.history.retain(|event| event.stream != key);

        let (tx, rx) = mpsc::unbounded_channel();
        outbound.request_streams.insert(request_id, Some(tx));
        Ok(rx)
    }

    /// Drop the sender of a request stream so the client sees it end
    pub fn finish_request_stream(&self, request_id: &RequestId) {
        self.lock().request_streams.remove(request_id);
    }

    /// Attach a new standalone receiver, replacing any previous one.
    ///
    /// When `after` names a recorded event, later events of the same stream
    /// are replayed first. Returns the receiver and the number of replayed
    /// events, or `None` replays when the marker is unknown.
    pub fn attach_standalone(
        &self,
        after: Option<EventId>,
    ) -> Result<(mpsc::UnboundedReceiver<ServerEvent>, Option<usize>), TransportError> {
        let mut outbound = self.lock();
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut replayed = None;

        if let Some(marker) = after {
            let stream = outbound
                .history
                .iter()
                .find(|event| event.id == marker)
                .map(|event| event.stream.clone());

            if let Some(stream) = stream {
                let mut count = 0;
                for event in outbound
                    .history
                    .iter()
                    .filter(|event| event.id > marker && event.stream == stream)
                {
                    // rx is held right here, so this cannot fail
                    let _ = tx.send(ServerEvent {
                        event_id: Some(event.id),
                        message: event.message.clone(),
                    });
                    count += 1;
                }
                replayed = Some(count);
            }
        }

        outbound.standalone = Some(tx);
        Ok((rx, replayed))
    }

    pub fn min_level(&self) -> LoggingLevel {
        self.lock().min_level
    }

    pub fn set_min_level(&self, level: LoggingLevel) {
        self.lock().min_level = level;
    }

    /// Number of events currently held for replay
    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the session closes
    pub fn closed_token(&self) -> &CancellationToken {
        &self.closed
    }

    /// Cancel the close token and drop every attached sender
    pub fn close(&self) {
        self.closed.cancel();
        let mut outbound = self.lock();
        outbound.standalone = None;
        outbound.request_streams.clear();
    }
}

/// Handle a request handler uses to push messages into its session
#[derive(Debug, Clone)]
pub struct Peer {
    channel: Arc<SessionChannel>,
    stream: StreamKey,
}

impl Peer {
    pub fn new(channel: Arc<SessionChannel>, stream: StreamKey) -> Self {
        Self { channel, stream }
    }

    /// Send a notification on this request's stream
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        self.channel
            .deliver(&self.stream, JsonRpcMessage::notification(method, params))
            .map(|_| ())
    }

    /// Send a `notifications/message` log entry.
    ///
    /// Entries below the session's level are dropped silently.
    pub fn log(&self, level: LoggingLevel, data: impl Into<Value>) -> Result<(), TransportError> {
        if level < self.channel.min_level() {
            return Ok(());
        }
        let params = LoggingMessageParams {
            level,
            logger: None,
            data: data.into(),
        };
        self.notify("notifications/message", Some(serde_json::to_value(params)?))
    }

    pub fn set_min_level(&self, level: LoggingLevel) {
        self.channel.set_min_level(level);
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Resolves once the session is closed
    pub async fn closed(&self) {
        self.channel.closed_token().cancelled().await
    }
}
