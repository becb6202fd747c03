use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{CorrelationId, Result, RpcError};

/// Error payload relayed in an `error` message (`err: {message, stack}`).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl From<&RpcError> for RemoteError {
    /// A wrapped remote failure is forwarded verbatim; anything else is
    /// described by its display text.
    fn from(err: &RpcError) -> Self {
        match err {
            RpcError::RemoteInvocation(remote) => remote.clone(),
            other => RemoteError::new(other.to_string()),
        }
    }
}

/// Every message that may cross the channel.
///
/// Client-to-host commands are `request`, `stream-request`, `write`,
/// `client-end` and `command`. Host-to-client commands are `response`,
/// `error`, `data`, `status`, `end` and `callback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Message {
    Request {
        address: String,
        #[serde(default)]
        body: Value,
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
    StreamRequest {
        address: String,
        #[serde(default)]
        body: Value,
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
    Write {
        #[serde(default)]
        body: Value,
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
    ClientEnd {
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
    Command {
        address: String,
        #[serde(default)]
        body: Value,
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
    Response {
        #[serde(default)]
        response: Value,
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
    Error {
        err: RemoteError,
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
    Data {
        #[serde(default)]
        response: Value,
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
    Status {
        #[serde(default)]
        response: Value,
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
    End {
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
    Callback {
        #[serde(default)]
        response: Value,
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
}

impl Message {
    /// Build an `error` message for a failure belonging to `correlation_id`.
    pub fn error(correlation_id: CorrelationId, err: &RpcError) -> Self {
        Message::Error {
            err: RemoteError::from(err),
            correlation_id,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            Message::Request { correlation_id, .. }
            | Message::StreamRequest { correlation_id, .. }
            | Message::Write { correlation_id, .. }
            | Message::ClientEnd { correlation_id }
            | Message::Command { correlation_id, .. }
            | Message::Response { correlation_id, .. }
            | Message::Error { correlation_id, .. }
            | Message::Data { correlation_id, .. }
            | Message::Status { correlation_id, .. }
            | Message::End { correlation_id }
            | Message::Callback { correlation_id, .. } => correlation_id,
        }
    }

    /// Wire name of the command.
    pub fn command(&self) -> &'static str {
        match self {
            Message::Request { .. } => "request",
            Message::StreamRequest { .. } => "stream-request",
            Message::Write { .. } => "write",
            Message::ClientEnd { .. } => "client-end",
            Message::Command { .. } => "command",
            Message::Response { .. } => "response",
            Message::Error { .. } => "error",
            Message::Data { .. } => "data",
            Message::Status { .. } => "status",
            Message::End { .. } => "end",
            Message::Callback { .. } => "callback",
        }
    }

    /// True for commands that travel from the client context to the host.
    pub fn is_host_bound(&self) -> bool {
        matches!(
            self,
            Message::Request { .. }
                | Message::StreamRequest { .. }
                | Message::Write { .. }
                | Message::ClientEnd { .. }
                | Message::Command { .. }
        )
    }

    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode a channel frame.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::ProtocolViolation`] for anything outside the
    /// vocabulary: unknown commands, missing fields or non-JSON frames.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        serde_json::from_slice(frame).map_err(|e| RpcError::ProtocolViolation(e.to_string()))
    }
}

/// Best-effort `correlationId` extraction from a frame that failed to decode.
pub fn correlation_hint(frame: &[u8]) -> Option<CorrelationId> {
    let value: Value = serde_json::from_slice(frame).ok()?;
    value
        .get("correlationId")
        .and_then(Value::as_str)
        .map(CorrelationId::from)
}
