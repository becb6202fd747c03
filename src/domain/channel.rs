// src/domain/channel.rs

//! Channel domain abstractions.
//!
//! This module defines the message channel connecting a host to one client
//! context. A channel has no notion of calls: it only posts opaque frames in
//! one direction and delivers inbound frames to a single listener.
//!
//! Higher-level semantics such as correlation, stream lifecycle or command
//! dispatch are handled by the client and host layers.
//!
//! Concrete implementations of this interface live under `src/channel/`.
use crate::Result;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// One encoded message as it travels over a channel.
pub type Frame = Bytes;

/// Which side of the channel an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    // ---
    /// Privileged side that owns the remote-procedure client.
    Host,

    /// Sandboxed side that issues calls.
    Client,
}

/// Shared base state for all channel implementations.
///
/// Each concrete channel embeds this as a field named `base`:
///
/// ```ignore
/// struct WebviewChannel {
///     base: ChannelBase,
///     // ... webview specific fields
/// }
///
/// impl Channel for WebviewChannel {
///     fn base(&self) -> &ChannelBase { &self.base }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelBase {
    /// Identifier of this endpoint, used for logging.
    pub endpoint_id: String,
    /// Side of the channel this endpoint sits on.
    pub side: Side,
}

impl ChannelBase {
    pub fn new(endpoint_id: impl Into<String>, side: Side) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            side,
        }
    }
}

/// Handle returned when the listener attaches to a channel endpoint.
///
/// Frames arrive in the order the peer posted them. The handle ends
/// (`recv()` returns `None`) once the peer closes and buffered frames are
/// drained.
pub struct ListenerHandle {
    // ---
    /// Receiver for inbound frames.
    pub inbox: mpsc::Receiver<Frame>,
}

/// Channel abstraction.
///
/// Implementations must ensure that:
/// - Frames posted in one direction are delivered in posting order.
/// - Exactly one listener can be attached per endpoint; a second
///   `subscribe()` fails with `RpcError::ListenerAlreadyAttached`.
/// - Frames posted before the listener attaches are buffered, not dropped.
///
/// The in-memory channel serves as the reference implementation of these
/// semantics.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &ChannelBase;

    /// Returns the endpoint identifier.
    fn endpoint_id(&self) -> &str {
        &self.base().endpoint_id
    }

    /// Returns which side this endpoint belongs to.
    fn side(&self) -> Side {
        self.base().side
    }

    /// Post a frame to the peer (fire-and-forget).
    async fn post(&self, frame: Frame) -> Result<()>;

    /// Attach the one listener of this endpoint.
    async fn subscribe(&self) -> Result<ListenerHandle>;

    /// Close the endpoint; the peer's listener ends after draining.
    async fn close(&self) -> Result<()>;
}

/// Shared channel pointer.
///
/// This is an `Arc<dyn Channel>`: cloning is cheap and every clone posts
/// through the same endpoint.
pub type ChannelPtr = Arc<dyn Channel>;
