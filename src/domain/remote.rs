// src/domain/remote.rs

//! Remote-procedure client boundary.
//!
//! The host dispatcher never touches the concrete remote-procedure library.
//! It depends on [`RemoteInvoker`] to run a unary call or open a stream by
//! address, and on the narrow [`CallSink`] / [`CallEvent`] pair to drive an
//! open stream. Bindings to a real client are supplied by the embedder.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{MethodAddress, RemoteError};

/// Event produced by an open remote stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Data(Value),
    Status(Value),
    /// Terminal failure of the call.
    Error(RemoteError),
    /// Terminal, successful end of the call.
    End,
}

impl CallEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallEvent::Error(_) | CallEvent::End)
    }
}

/// Outbound half of an open remote stream.
#[async_trait::async_trait]
pub trait CallSink: Send + Sync {
    /// Forward one client write to the remote call.
    async fn write(&self, body: Value) -> std::result::Result<(), RemoteError>;

    /// Half-close the call from the client side.
    async fn end(&self) -> std::result::Result<(), RemoteError>;
}

/// A stream returned by [`RemoteInvoker::open_stream`].
pub struct RemoteStream {
    /// Events in the order the remote call produced them.
    pub events: mpsc::Receiver<CallEvent>,
    pub sink: Arc<dyn CallSink>,
}

/// Capability to perform remote calls by address.
///
/// Addresses arrive already resolved (see [`MethodAddress::resolved`]).
#[async_trait::async_trait]
pub trait RemoteInvoker: Send + Sync {
    // ---
    /// Run a single-shot call.
    ///
    /// A binding that folds a server stream into one reply returns the
    /// accumulated messages as a JSON array.
    async fn unary(
        &self,
        method: &MethodAddress,
        body: Value,
    ) -> std::result::Result<Value, RemoteError>;

    /// Open a streaming call.
    async fn open_stream(
        &self,
        method: &MethodAddress,
        body: Value,
    ) -> std::result::Result<RemoteStream, RemoteError>;
}

/// Shared invoker pointer.
pub type InvokerPtr = Arc<dyn RemoteInvoker>;
