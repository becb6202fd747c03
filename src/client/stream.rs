//! Client-side stream handle.
//!
//! A [`StreamCall`] moves through three states:
//!
//! ```text
//! not-started --start()--> active --end() / inbound end / inbound error--> ended
//! ```
//!
//! `write()` and `end()` are only legal while active. Inbound events are
//! delivered to listeners registered with [`StreamCall::on`], in
//! registration order, from the channel's receive loop.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;

use super::correlator::{Correlator, Disposition};
use crate::protocol::{Message, RemoteError};
use crate::{log_debug, log_warn, ChannelPtr, CorrelationId, MethodAddress, Result, RpcError};

/// Lifecycle of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    NotStarted,
    Active,
    Ended,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamState::NotStarted => "not-started",
            StreamState::Active => "active",
            StreamState::Ended => "ended",
        })
    }
}

/// Names listeners can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Data,
    Error,
    Status,
    End,
    Response,
}

/// An event delivered to stream listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Data(Value),
    Status(Value),
    Response(Value),
    Error(RemoteError),
    End,
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Data(_) => EventKind::Data,
            StreamEvent::Status(_) => EventKind::Status,
            StreamEvent::Response(_) => EventKind::Response,
            StreamEvent::Error(_) => EventKind::Error,
            StreamEvent::End => EventKind::End,
        }
    }
}

type Listener = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle to one bidirectional call.
///
/// Cheap to clone; clones share state and listeners.
#[derive(Clone)]
pub struct StreamCall {
    shared: Arc<Shared>,
}

struct Shared {
    address: MethodAddress,
    body: Value,
    correlation_id: CorrelationId,
    state: Mutex<StreamState>,
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
    channel: ChannelPtr,
    /// Weak so a registered stream does not keep its client alive.
    correlator: Weak<Correlator>,
}

impl StreamCall {
    pub(crate) fn new(
        address: MethodAddress,
        body: Value,
        channel: ChannelPtr,
        correlator: &Arc<Correlator>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                address,
                body,
                correlation_id: CorrelationId::generate(),
                state: Mutex::new(StreamState::NotStarted),
                listeners: Mutex::new(HashMap::new()),
                channel,
                correlator: Arc::downgrade(correlator),
            }),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.shared.correlation_id
    }

    pub fn address(&self) -> &MethodAddress {
        &self.shared.address
    }

    pub fn state(&self) -> StreamState {
        *lock_ignore_poison(&self.shared.state)
    }

    /// Register a listener for one event kind.
    ///
    /// Listeners run on the channel's receive loop and must not block.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> &Self
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        lock_ignore_poison(&self.shared.listeners)
            .entry(kind)
            .or_default()
            .push(Arc::new(listener));
        self
    }

    /// Open the stream by posting `stream-request`.
    ///
    /// # Errors
    ///
    /// - `RpcError::StreamAlreadyStarted` if the stream left not-started
    /// - `RpcError::ChannelClosed` if the owning client is gone, or posting
    ///   fails; the stream is then ended
    pub async fn start(&self) -> Result<()> {
        // ---
        {
            let mut state = lock_ignore_poison(&self.shared.state);
            if *state != StreamState::NotStarted {
                return Err(RpcError::StreamAlreadyStarted);
            }
            *state = StreamState::Active;
        }

        let Some(correlator) = self.shared.correlator.upgrade() else {
            *lock_ignore_poison(&self.shared.state) = StreamState::Ended;
            return Err(RpcError::ChannelClosed(format!(
                "client of stream {} was dropped",
                self.shared.correlation_id
            )));
        };

        let shared = self.shared.clone();
        correlator.register(
            self.shared.correlation_id.clone(),
            Box::new(move |message| shared.on_inbound(message)),
        );

        let message = Message::StreamRequest {
            address: self.shared.address.to_string(),
            body: self.shared.body.clone(),
            correlation_id: self.shared.correlation_id.clone(),
        };

        if let Err(err) = self.shared.post(message).await {
            self.shared.finish();
            return Err(err);
        }
        Ok(())
    }

    /// Send one message on the open stream.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::StreamNotActive` unless the stream is active; no
    /// message is posted in that case.
    pub async fn write(&self, body: Value) -> Result<()> {
        // ---
        self.shared.ensure_active()?;

        self.shared
            .post(Message::Write {
                body,
                correlation_id: self.shared.correlation_id.clone(),
            })
            .await
    }

    /// Close the stream from the client side by posting `client-end`.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::StreamNotActive` unless the stream is active, so a
    /// second `end()` fails.
    pub async fn end(&self) -> Result<()> {
        // ---
        {
            let mut state = lock_ignore_poison(&self.shared.state);
            if *state != StreamState::Active {
                return Err(RpcError::StreamNotActive(*state));
            }
            *state = StreamState::Ended;
        }
        self.shared.deregister();

        self.shared
            .post(Message::ClientEnd {
                correlation_id: self.shared.correlation_id.clone(),
            })
            .await
    }
}

impl Shared {
    fn ensure_active(&self) -> Result<()> {
        match *lock_ignore_poison(&self.state) {
            StreamState::Active => Ok(()),
            other => Err(RpcError::StreamNotActive(other)),
        }
    }

    async fn post(&self, message: Message) -> Result<()> {
        self.channel.post(message.encode()?).await
    }

    fn deregister(&self) {
        if let Some(correlator) = self.correlator.upgrade() {
            correlator.deregister(&self.correlation_id);
        }
    }

    /// Move to ended and drop the correlation entry.
    fn finish(&self) {
        *lock_ignore_poison(&self.state) = StreamState::Ended;
        self.deregister();
    }

    /// Invoke every listener for the event's kind, in registration order.
    fn emit(&self, event: StreamEvent) {
        // Snapshot so listeners can call `on()` without deadlocking.
        let listeners: Vec<Listener> = lock_ignore_poison(&self.listeners)
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();

        for listener in listeners {
            listener(&event);
        }
    }

    /// Emit a terminal event, then release every listener.
    fn terminate(&self, event: StreamEvent) -> Disposition {
        *lock_ignore_poison(&self.state) = StreamState::Ended;
        self.emit(event);
        lock_ignore_poison(&self.listeners).clear();
        Disposition::Done
    }

    fn on_inbound(&self, message: Message) -> Disposition {
        // ---
        match message {
            Message::Data { response, .. } => {
                self.emit(StreamEvent::Data(response));
                Disposition::Keep
            }
            Message::Status { response, .. } => {
                self.emit(StreamEvent::Status(response));
                Disposition::Keep
            }
            Message::Response { response, .. } => {
                self.emit(StreamEvent::Response(response));
                Disposition::Keep
            }
            Message::Error { err, .. } => self.terminate(StreamEvent::Error(err)),
            Message::End { .. } => {
                log_debug!("stream {} ended by host", self.correlation_id);
                self.terminate(StreamEvent::End)
            }
            // Our own request came back: nothing on the other side consumed it.
            Message::StreamRequest { .. } => {
                log_warn!("stream {}: stream-request was not delivered", self.correlation_id);
                let err = RpcError::NotDelivered("stream-request".into());
                self.terminate(StreamEvent::Error(RemoteError::from(&err)))
            }
            other => {
                let err = RpcError::ProtocolViolation(format!(
                    "'{}' has no stream event",
                    other.command()
                ));
                log_warn!("stream {}: {err}", self.correlation_id);
                self.terminate(StreamEvent::Error(RemoteError::from(&err)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::MemoryChannel;
    use crate::RpcConfig;
    use serde_json::json;

    struct Fixture {
        stream: StreamCall,
        correlator: Arc<Correlator>,
        // Keeps the peer endpoint alive so posts succeed.
        _host: ChannelPtr,
    }

    fn fixture() -> Fixture {
        // ---
        let (host, client) = MemoryChannel::pair(&RpcConfig::new("stream-test"));
        let correlator = Arc::new(Correlator::new());
        let address = MethodAddress::parse("chat.ChatService.talk").unwrap();
        let stream = StreamCall::new(address, json!({}), client, &correlator);

        Fixture {
            stream,
            correlator,
            _host: host,
        }
    }

    fn data(stream: &StreamCall, n: i64) -> Message {
        Message::Data {
            response: json!(n),
            correlation_id: stream.correlation_id().clone(),
        }
    }

    fn listener_count(stream: &StreamCall) -> usize {
        lock_ignore_poison(&stream.shared.listeners)
            .values()
            .map(Vec::len)
            .sum()
    }

    #[tokio::test]
    async fn test_listeners_run_in_registration_order() {
        // ---
        let f = fixture();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let calls = calls.clone();
            f.stream.on(EventKind::Data, move |event| {
                if let StreamEvent::Data(n) = event {
                    lock_ignore_poison(&calls).push(format!("{name}:{n}"));
                }
            });
        }

        f.stream.start().await.unwrap();
        assert!(f.correlator.route(data(&f.stream, 1)));
        assert!(f.correlator.route(data(&f.stream, 2)));

        assert_eq!(
            *lock_ignore_poison(&calls),
            ["first:1", "second:1", "third:1", "first:2", "second:2", "third:2"]
        );
    }

    #[tokio::test]
    async fn test_end_clears_listeners_and_registration() {
        // ---
        let f = fixture();
        let ends = Arc::new(Mutex::new(0));

        f.stream.on(EventKind::Data, |_| {});
        for _ in 0..2 {
            let ends = ends.clone();
            f.stream.on(EventKind::End, move |_| {
                *lock_ignore_poison(&ends) += 1;
            });
        }

        f.stream.start().await.unwrap();
        assert_eq!(listener_count(&f.stream), 3);

        f.correlator.route(Message::End {
            correlation_id: f.stream.correlation_id().clone(),
        });

        assert_eq!(*lock_ignore_poison(&ends), 2);
        assert_eq!(f.stream.state(), StreamState::Ended);
        assert_eq!(listener_count(&f.stream), 0);
        assert!(!f.correlator.is_registered(f.stream.correlation_id()));

        // Late events for the finished stream are dropped.
        assert!(!f.correlator.route(data(&f.stream, 3)));
    }

    #[tokio::test]
    async fn test_unexpected_command_fails_stream() {
        // ---
        let f = fixture();
        let errors = Arc::new(Mutex::new(Vec::new()));
        {
            let errors = errors.clone();
            f.stream.on(EventKind::Error, move |event| {
                if let StreamEvent::Error(err) = event {
                    lock_ignore_poison(&errors).push(err.message.clone());
                }
            });
        }

        f.stream.start().await.unwrap();
        f.correlator.route(Message::Callback {
            response: json!(true),
            correlation_id: f.stream.correlation_id().clone(),
        });

        let errors = lock_ignore_poison(&errors).clone();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("protocol violation"), "{}", errors[0]);
        assert_eq!(f.stream.state(), StreamState::Ended);
        assert!(f.correlator.is_empty());
    }

    #[tokio::test]
    async fn test_stream_does_not_keep_correlator_alive() {
        // ---
        let f = fixture();
        f.stream.start().await.unwrap();

        let weak = Arc::downgrade(&f.correlator);
        let Fixture {
            stream,
            correlator,
            _host,
        } = f;
        drop(correlator);

        assert!(weak.upgrade().is_none());
        // Ending still succeeds locally once the table is gone.
        stream.end().await.unwrap();
        assert_eq!(stream.state(), StreamState::Ended);
    }
}
