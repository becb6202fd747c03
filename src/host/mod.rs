// src/host/mod.rs
//! Host-side dispatcher.
//!
//! The [`HostDispatcher`] owns the remote-procedure capability and serves
//! any number of sessions, each attached through its own channel endpoint.
//! For every inbound message it either invokes the remote-procedure client
//! or a local command handler, and relays every result back over the same
//! channel tagged with the originating correlation ID.
//!
//! # Ordering
//!
//! `stream-request`, `write` and `client-end` are handled inline on the
//! session's receive loop, so a stream is registered before its first write
//! is looked up. Unary `request`s and `command`s run on spawned tasks and
//! may complete in any order.
//!
//! # Cleanup
//!
//! Open streams are stored with the session that opened them. When a
//! session closes (explicitly, or because its channel went away) every one
//! of its streams is force-ended and removed.

mod handler;
mod local;
mod streams;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{correlation_hint, Message};
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    CallEvent,
    CallSink,
    ChannelPtr,
    CorrelationId,
    Frame,
    InvokerPtr,
    MethodAddress,
    Result,
    RpcConfig,
    RpcError,
    SessionId,
};

pub(crate) use handler::{wrap_command, CommandHandler};
pub use handler::CommandContext;
pub use local::{LocalServices, StreamIo};

use streams::{OpenStream, StreamTable};

/// Host-side dispatcher shared by all sessions.
///
/// Cheap to clone (internally `Arc`-backed). Build one with
/// [`HostDispatcherBuilder`](crate::HostDispatcherBuilder).
#[derive(Clone)]
pub struct HostDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    invoker: InvokerPtr,
    /// Populated by the builder, read-only afterwards.
    commands: HashMap<String, CommandHandler>,
    streams: StreamTable,
    config: RpcConfig,
}

impl HostDispatcher {
    pub(crate) fn new(
        invoker: InvokerPtr,
        commands: HashMap<String, CommandHandler>,
        config: RpcConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                invoker,
                commands,
                streams: StreamTable::default(),
                config,
            }),
        }
    }

    /// Serve `session` over `channel`.
    ///
    /// Attaches the dispatcher as the endpoint's single listener and spawns
    /// its receive loop. When the channel ends the session is closed and its
    /// streams are terminated.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::ListenerAlreadyAttached` if the endpoint already
    /// has a listener.
    pub async fn attach(&self, session: SessionId, channel: ChannelPtr) -> Result<JoinHandle<()>> {
        // ---
        let mut listener = channel.subscribe().await?;
        let this = self.clone();

        log_info!(
            "{}: session {session} attached on {}",
            self.inner.config.endpoint_id,
            channel.endpoint_id()
        );

        Ok(tokio::spawn(async move {
            // ---
            while let Some(frame) = listener.inbox.recv().await {
                this.handle_frame(&session, &channel, frame).await;
            }

            let _closed = this.close_session(&session).await;
            log_info!("session {session} detached, {_closed} stream(s) terminated");
        }))
    }

    /// Number of open streams across all sessions.
    pub fn open_streams(&self) -> usize {
        self.inner.streams.len()
    }

    /// Number of open streams owned by `session`.
    pub fn session_streams(&self, session: &SessionId) -> usize {
        self.inner.streams.count_for(session)
    }

    /// Force-end and remove every stream owned by `session`.
    ///
    /// Returns how many streams were terminated.
    pub async fn close_session(&self, session: &SessionId) -> usize {
        // ---
        let drained = self.inner.streams.drain_session(session);
        let count = drained.len();

        for (id, stream) in drained {
            if let Some(relay) = stream.relay {
                relay.abort();
            }
            end_sink(&id, &stream.sink).await;
        }

        if count > 0 {
            log_debug!("session {session}: terminated {count} stream(s)");
        }
        count
    }

    async fn handle_frame(&self, session: &SessionId, channel: &ChannelPtr, frame: Frame) {
        // ---
        let message = match Message::decode(&frame) {
            Ok(message) => message,
            Err(err) => {
                match correlation_hint(&frame) {
                    Some(id) => relay_error(channel, id, &err).await,
                    None => log_warn!("session {session}: discarding inbound frame: {err}"),
                }
                return;
            }
        };

        let id = message.correlation_id().clone();
        let _command = message.command();

        if let Err(err) = self.dispatch(session, channel, message).await {
            log_warn!("session {session}: '{_command}' for {id} failed: {err}");
            relay_error(channel, id, &err).await;
        }
    }

    /// Dispatch one decoded message from `session`.
    ///
    /// # Errors
    ///
    /// - `RpcError::AddressFormat` for malformed call addresses
    /// - `RpcError::RemoteInvocation` when opening or writing a stream fails
    /// - `RpcError::UnknownCorrelation` for `write` / `client-end` without a
    ///   live stream owned by `session`
    /// - `RpcError::ProtocolViolation` for host-to-client commands
    pub async fn dispatch(
        &self,
        session: &SessionId,
        channel: &ChannelPtr,
        message: Message,
    ) -> Result<()> {
        // ---
        match message {
            Message::Request {
                address,
                body,
                correlation_id,
            } => {
                let method = MethodAddress::parse(&address)?.resolved();
                let inner = self.inner.clone();
                let channel = channel.clone();

                tokio::spawn(async move {
                    let reply = match inner.invoker.unary(&method, body).await {
                        Ok(response) => Message::Response {
                            response,
                            correlation_id,
                        },
                        Err(err) => Message::Error {
                            err,
                            correlation_id,
                        },
                    };
                    post_or_log(&channel, reply).await;
                });
                Ok(())
            }

            Message::StreamRequest {
                address,
                body,
                correlation_id,
            } => {
                let method = MethodAddress::parse(&address)?.resolved();
                self.open_stream(session, channel, method, body, correlation_id)
                    .await
            }

            Message::Write {
                body,
                correlation_id,
            } => {
                let sink = self.inner.streams.sink(session, &correlation_id)?;
                sink.write(body).await.map_err(RpcError::RemoteInvocation)
            }

            Message::ClientEnd { correlation_id } => {
                let stream = self.inner.streams.take(session, &correlation_id)?;
                log_debug!("session {session}: client ended stream {correlation_id}");
                stream.sink.end().await.map_err(RpcError::RemoteInvocation)
            }

            Message::Command {
                address,
                body,
                correlation_id,
            } => {
                let Some(handler) = self.inner.commands.get(&address).cloned() else {
                    log_debug!("session {session}: no command handler for '{address}'");
                    return Ok(());
                };

                let ctx = CommandContext {
                    session: session.clone(),
                    correlation_id: correlation_id.clone(),
                    address,
                };
                let channel = channel.clone();

                tokio::spawn(async move {
                    let reply = match handler.call(ctx, body).await {
                        Ok(response) => Message::Callback {
                            response,
                            correlation_id,
                        },
                        Err(err) => Message::error(correlation_id, &err),
                    };
                    post_or_log(&channel, reply).await;
                });
                Ok(())
            }

            other => Err(RpcError::ProtocolViolation(format!(
                "'{}' is not a client-to-host command",
                other.command()
            ))),
        }
    }

    async fn open_stream(
        &self,
        session: &SessionId,
        channel: &ChannelPtr,
        method: MethodAddress,
        body: serde_json::Value,
        correlation_id: CorrelationId,
    ) -> Result<()> {
        // ---
        if self.inner.streams.contains(&correlation_id) {
            return Err(duplicate_stream(&correlation_id));
        }

        let remote = self
            .inner
            .invoker
            .open_stream(&method, body)
            .await
            .map_err(RpcError::RemoteInvocation)?;

        let sink = remote.sink;
        let inserted = self.inner.streams.insert(
            correlation_id.clone(),
            OpenStream {
                session: session.clone(),
                sink: sink.clone(),
                relay: None,
            },
        );

        // Another session claimed the identifier while the call was opening.
        if let Err(rejected) = inserted {
            end_sink(&correlation_id, &rejected.sink).await;
            return Err(duplicate_stream(&correlation_id));
        }

        log_debug!("session {session}: opened stream {correlation_id} to {method}");

        let relay = tokio::spawn(relay_events(
            self.inner.clone(),
            channel.clone(),
            correlation_id.clone(),
            remote.events,
            sink.clone(),
        ));
        self.inner.streams.set_relay(&correlation_id, &sink, relay);
        Ok(())
    }
}

/// Forward a remote stream's events until it terminates.
///
/// The relay only ever removes its own table entry. If the client side can
/// no longer be reached, the remote call is ended here since no session
/// teardown will find it afterwards.
async fn relay_events(
    inner: Arc<Inner>,
    channel: ChannelPtr,
    correlation_id: CorrelationId,
    mut events: mpsc::Receiver<CallEvent>,
    sink: Arc<dyn CallSink>,
) {
    // ---
    let mut terminated = false;

    while let Some(event) = events.recv().await {
        terminated = event.is_terminal();
        let id = correlation_id.clone();

        let message = match event {
            CallEvent::Data(response) => Message::Data {
                response,
                correlation_id: id,
            },
            CallEvent::Status(response) => Message::Status {
                response,
                correlation_id: id,
            },
            CallEvent::Error(err) => Message::Error {
                err,
                correlation_id: id,
            },
            CallEvent::End => Message::End { correlation_id: id },
        };

        if let Err(_err) = post(&channel, message).await {
            log_warn!("stream {correlation_id}: relay stopped: {_err}");
            if inner.streams.remove_own(&correlation_id, &sink).is_some() {
                end_sink(&correlation_id, &sink).await;
            }
            return;
        }
        if terminated {
            break;
        }
    }

    // A source that closes without a terminal event still ends the call.
    if !terminated {
        post_or_log(
            &channel,
            Message::End {
                correlation_id: correlation_id.clone(),
            },
        )
        .await;
    }

    inner.streams.remove_own(&correlation_id, &sink);
}

async fn end_sink(correlation_id: &CorrelationId, sink: &Arc<dyn CallSink>) {
    if let Err(_err) = sink.end().await {
        log_warn!("stream {correlation_id}: ending remote call failed: {_err}");
    }
}

fn duplicate_stream(correlation_id: &CorrelationId) -> RpcError {
    RpcError::ProtocolViolation(format!(
        "correlation id {correlation_id} already has a live stream"
    ))
}

async fn post(channel: &ChannelPtr, message: Message) -> Result<()> {
    channel.post(message.encode()?).await
}

async fn post_or_log(channel: &ChannelPtr, message: Message) {
    if let Err(_err) = post(channel, message).await {
        log_error!("{}: failed to post reply: {_err}", channel.endpoint_id());
    }
}

async fn relay_error(channel: &ChannelPtr, correlation_id: CorrelationId, err: &RpcError) {
    post_or_log(channel, Message::error(correlation_id, err)).await;
}
