//! Settlement rules for single-shot calls.

use serde_json::Value;

use crate::protocol::Message;
use crate::{Result, RpcError};

/// Settle a unary call from the first message carrying its correlation ID.
///
/// - a `response` whose payload is an array settles successfully with the
///   array (the host folded a multi-message reply into one result);
/// - an `error` settles with the relayed remote error;
/// - a `response` whose `code` equals `success_code` settles with the payload;
/// - any other `response` is rejected with its `message` field.
pub(crate) fn settle_unary(message: Message, success_code: i64) -> Result<Value> {
    // ---
    match message {
        Message::Response { response, .. } if response.is_array() => Ok(response),
        Message::Error { err, .. } => Err(RpcError::RemoteInvocation(err)),
        Message::Response { response, .. } => {
            if response.get("code").and_then(Value::as_i64) == Some(success_code) {
                Ok(response)
            } else {
                Err(RpcError::Rejected(rejection_message(&response)))
            }
        }
        Message::Request { .. } => Err(RpcError::NotDelivered("request".into())),
        other => Err(RpcError::ProtocolViolation(format!(
            "'{}' cannot settle a unary call",
            other.command()
        ))),
    }
}

/// Settle a command from its reply.
pub(crate) fn settle_command(message: Message) -> Result<Value> {
    // ---
    match message {
        Message::Callback { response, .. } => Ok(response),
        Message::Error { err, .. } => Err(RpcError::RemoteInvocation(err)),
        Message::Command { .. } => Err(RpcError::NotDelivered("command".into())),
        other => Err(RpcError::ProtocolViolation(format!(
            "undefined command reply '{}'",
            other.command()
        ))),
    }
}

fn rejection_message(response: &Value) -> String {
    match response.get("message") {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => "call rejected without a message".to_string(),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{CorrelationId, RemoteError};
    use serde_json::json;

    fn response(value: Value) -> Message {
        Message::Response {
            response: value,
            correlation_id: CorrelationId::from("u-1"),
        }
    }

    #[test]
    fn test_array_reply_resolves() {
        // ---
        let value = settle_unary(response(json!([{"id": 1}, {"id": 2}])), 1).unwrap();
        assert_eq!(value, json!([{"id": 1}, {"id": 2}]));
    }

    #[test]
    fn test_success_code_resolves() {
        // ---
        let reply = json!({"code": 1, "data": {"name": "lamp"}});
        assert_eq!(settle_unary(response(reply.clone()), 1).unwrap(), reply);
    }

    #[test]
    fn test_custom_success_code() {
        // ---
        let reply = json!({"code": 0, "message": "ok"});
        assert!(settle_unary(response(reply.clone()), 0).is_ok());
        assert!(settle_unary(response(reply), 1).is_err());
    }

    #[test]
    fn test_other_code_rejects_with_message() {
        // ---
        let reply = json!({"code": 3, "message": "device offline"});
        match settle_unary(response(reply), 1) {
            Err(RpcError::Rejected(message)) => assert_eq!(message, "device offline"),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn test_error_rejects_with_remote_error() {
        // ---
        let message = Message::Error {
            err: RemoteError::new("14 UNAVAILABLE").with_stack("Error: 14 UNAVAILABLE"),
            correlation_id: CorrelationId::from("u-1"),
        };
        match settle_unary(message, 1) {
            Err(RpcError::RemoteInvocation(err)) => {
                assert_eq!(err.message, "14 UNAVAILABLE");
                assert_eq!(err.stack.as_deref(), Some("Error: 14 UNAVAILABLE"));
            }
            other => panic!("expected RemoteInvocation, got {other:?}"),
        }
    }

    #[test]
    fn test_echoed_request_not_delivered() {
        // ---
        let message = Message::Request {
            address: "a.B.c".into(),
            body: Value::Null,
            correlation_id: CorrelationId::from("u-1"),
        };
        assert!(matches!(
            settle_unary(message, 1),
            Err(RpcError::NotDelivered(_))
        ));
    }

    #[test]
    fn test_command_settlement() {
        // ---
        let id = CorrelationId::from("c-1");
        let reply = Message::Callback {
            response: json!("opened"),
            correlation_id: id.clone(),
        };
        assert_eq!(settle_command(reply).unwrap(), json!("opened"));

        let stray = Message::End { correlation_id: id };
        assert!(matches!(
            settle_command(stray),
            Err(RpcError::ProtocolViolation(_))
        ));
    }
}
