use thiserror::Error;

use crate::{CorrelationId, RemoteError, StreamState};

/// Errors that can occur while correlating or relaying calls.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Call address is not exactly `package.Service.method`
    #[error("call address must have the form 'package.Service.method', got '{0}'")]
    AddressFormat(String),

    /// `write()` or `end()` on a stream that is not active
    #[error("stream is {0}, not active")]
    StreamNotActive(StreamState),

    /// `start()` on a stream that already left the not-started state
    #[error("stream was already started")]
    StreamAlreadyStarted,

    /// Host side: no live stream is registered under this correlation ID
    #[error("no live stream for correlation id {0}")]
    UnknownCorrelation(CorrelationId),

    /// The wrapped remote-procedure client failed
    #[error("remote invocation failed: {0}")]
    RemoteInvocation(RemoteError),

    /// A unary reply arrived without the success code
    #[error("call rejected: {0}")]
    Rejected(String),

    /// Inbound message outside the known vocabulary, or in the wrong place
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// An outbound message came back to its sender unconsumed
    #[error("'{0}' was not delivered to a host")]
    NotDelivered(String),

    /// The channel endpoint was closed
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// A second listener was attached to a channel endpoint
    #[error("a listener is already attached to channel endpoint {0}")]
    ListenerAlreadyAttached(String),

    /// The call did not settle within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RpcError>;
