// src/client/mod.rs
//! Client-side facades.
//!
//! This module contains [`RpcClient`], which issues calls from the client
//! context over a channel whose only primitives are "post a frame" and
//! "receive a frame".
//!
//! # Architecture
//!
//! The client owns a [`Correlator`]: a dispatch table from correlation ID to
//! inbound handler. On construction it attaches the correlator as the
//! channel's single listener, so every inbound message is routed by its
//! `correlationId` to the handler of the call it belongs to, or dropped when
//! that call is already gone.
//!
//! Each call generates a fresh correlation ID, registers a handler, then
//! posts its request. Unary calls and commands settle exactly once through a
//! oneshot channel; streams stay registered until they reach `ended`.

mod correlator;
mod stream;
mod unary;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;

use crate::protocol::Message;
use crate::{
    // ---
    log_debug,
    ChannelPtr,
    CorrelationId,
    MethodAddress,
    Result,
    RpcConfig,
    RpcError,
};

pub use correlator::{Correlator, Disposition, InboundHandler};
pub use stream::{EventKind, StreamCall, StreamEvent, StreamState};

/// Running client instance.
///
/// Cheap to clone (internally `Arc`-backed).
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    channel: ChannelPtr,
    correlator: Arc<Correlator>,
    config: RpcConfig,

    /// Receive loop; it stops by itself when the channel closes.
    _rx_task: JoinHandle<()>,
}

impl RpcClient {
    // ---
    /// Create a client on an explicitly provided channel endpoint.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::ListenerAlreadyAttached` if something else already
    /// listens on `channel`.
    pub async fn with_channel(channel: ChannelPtr, config: RpcConfig) -> Result<Self> {
        // ---
        let correlator = Arc::new(Correlator::new());
        let rx_task = correlator.attach(&channel).await?;

        log_debug!("{}: client attached", channel.endpoint_id());

        Ok(Self {
            inner: Arc::new(Inner {
                channel,
                correlator,
                config,
                _rx_task: rx_task,
            }),
        })
    }

    /// The dispatch table behind this client.
    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.inner.correlator
    }

    /// Perform a single-shot call.
    ///
    /// # Errors
    ///
    /// - `RpcError::AddressFormat` before anything is posted, unless
    ///   `address` is `package.Service.method`
    /// - `RpcError::RemoteInvocation` when the host relays an `error`
    /// - `RpcError::Rejected` when the reply lacks the success code
    /// - `RpcError::NotDelivered` when no host consumed the request
    /// - `RpcError::Timeout` when `request_timeout` is configured and expires
    pub async fn call(&self, address: &str, body: Value) -> Result<Value> {
        // ---
        let address = MethodAddress::parse(address)?;
        let success_code = self.inner.config.success_code;

        self.settle_once(
            |correlation_id| Message::Request {
                address: address.to_string(),
                body,
                correlation_id,
            },
            move |message| unary::settle_unary(message, success_code),
        )
        .await
    }

    /// Typed wrapper around [`call`](Self::call).
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use relay_rpc::RpcClient;
    /// # use serde::{Deserialize, Serialize};
    /// #[derive(Serialize)]
    /// struct GetDevice { id: u32 }
    /// #[derive(Deserialize)]
    /// struct DeviceReply { code: i64, name: String }
    ///
    /// # async fn example(client: RpcClient) -> relay_rpc::Result<()> {
    /// let reply: DeviceReply = client
    ///     .call_typed("thing.DeviceService.getDevice", &GetDevice { id: 7 })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call_typed<TReq, TResp>(&self, address: &str, req: &TReq) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        let body = serde_json::to_value(req)?;
        let reply = self.call(address, body).await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Create a stream handle in the not-started state.
    ///
    /// Nothing is posted until [`StreamCall::start`].
    ///
    /// # Errors
    ///
    /// Returns `RpcError::AddressFormat` for malformed addresses.
    pub fn stream(&self, address: &str, body: Value) -> Result<StreamCall> {
        // ---
        let address = MethodAddress::parse(address)?;

        Ok(StreamCall::new(
            address,
            body,
            self.inner.channel.clone(),
            &self.inner.correlator,
        ))
    }

    /// Invoke a host-local command and wait for its `callback`.
    ///
    /// Command addresses are free-form keys of the host's command table.
    pub async fn command(&self, address: &str, body: Value) -> Result<Value> {
        // ---
        let address = address.to_string();

        self.settle_once(
            |correlation_id| Message::Command {
                address,
                body,
                correlation_id,
            },
            unary::settle_command,
        )
        .await
    }

    /// Register a one-shot handler, post the request, wait for settlement.
    async fn settle_once<B, S>(&self, build: B, settle: S) -> Result<Value>
    where
        B: FnOnce(CorrelationId) -> Message,
        S: FnOnce(Message) -> Result<Value> + Send + 'static,
    {
        // ---
        let correlation_id = CorrelationId::generate();
        let request = build(correlation_id.clone());
        let frame = request.encode()?;

        let (tx, rx) = oneshot::channel();
        let mut pending = Some((tx, settle));

        self.inner.correlator.register(
            correlation_id.clone(),
            Box::new(move |message| {
                if let Some((tx, settle)) = pending.take() {
                    // Receiver gone means the caller timed out or gave up.
                    let _ = tx.send(settle(message));
                }
                Disposition::Done
            }),
        );

        if let Err(err) = self.inner.channel.post(frame).await {
            self.inner.correlator.deregister(&correlation_id);
            return Err(err);
        }

        let settled = match self.inner.config.request_timeout {
            Some(timeout) => match time::timeout(timeout, rx).await {
                Ok(settled) => settled,
                Err(_) => {
                    self.inner.correlator.deregister(&correlation_id);
                    return Err(RpcError::Timeout);
                }
            },
            None => rx.await,
        };

        settled.map_err(|_| {
            RpcError::ChannelClosed(format!(
                "call {correlation_id} dropped before settling ({})",
                self.inner.channel.endpoint_id()
            ))
        })?
    }
}
